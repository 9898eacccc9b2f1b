//! HTTP primitives for the soul engine's token endpoint.
//!
//! This crate owns host normalisation and the single `POST /auth/token` exchange
//! that trades a session identity for a short-lived credential. It contains no
//! websocket code and no session state, and it never retries.

pub mod client;
pub mod config;
pub mod error;
pub mod url;

pub use client::SoulEngineApiClient;
pub use config::SoulEngineApiConfig;
pub use error::SoulEngineApiError;
pub use url::{auth_token_url, experience_url, resolve_http_host, trim_trailing_slash};
