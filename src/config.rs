//! Environment configuration and chat parameter resolution.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const WS_URL_ENV_VAR: &str = "SOUL_ENGINE_WS_URL";
pub const LEGACY_WS_URL_ENV_VAR: &str = "HOCUS_POCUS_HOST";
pub const HTTP_URL_ENV_VAR: &str = "SOUL_ENGINE_HTTP_URL";
pub const ORGANIZATION_ENV_VAR: &str = "SOUL_ENGINE_ORGANIZATION";
pub const BLUEPRINT_ENV_VAR: &str = "SOUL_ENGINE_BLUEPRINT";
pub const CHAT_ID_ENV_VAR: &str = "SOUL_ENGINE_CHAT_ID";
pub const STATE_PATH_ENV_VAR: &str = "SOUL_CHAT_STATE_PATH";
pub const LOG_FILE_ENV_VAR: &str = "SOUL_CHAT_LOG_FILE";
pub const HANDSHAKE_TIMEOUT_ENV_VAR: &str = "SOUL_CHAT_HANDSHAKE_TIMEOUT_SECS";

pub const DEFAULT_WS_URL: &str = "ws://localhost:4000";
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub ws_url: String,
    pub http_url: Option<String>,
    pub organization: String,
    pub blueprint: String,
    pub chat_id: Option<String>,
    pub state_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub handshake_timeout: Duration,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            ws_url: env_string_opt(WS_URL_ENV_VAR)
                .or_else(|| env_string_opt(LEGACY_WS_URL_ENV_VAR))
                .unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            http_url: env_string_opt(HTTP_URL_ENV_VAR),
            organization: env_string_opt(ORGANIZATION_ENV_VAR).unwrap_or_default(),
            blueprint: env_string_opt(BLUEPRINT_ENV_VAR).unwrap_or_default(),
            chat_id: env_string_opt(CHAT_ID_ENV_VAR),
            state_path: env_string_opt(STATE_PATH_ENV_VAR).map(PathBuf::from),
            log_file: env_string_opt(LOG_FILE_ENV_VAR).map(PathBuf::from),
            handshake_timeout: Duration::from_secs(
                env_secs_opt(HANDSHAKE_TIMEOUT_ENV_VAR).unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            ),
        }
    }

    /// Chat parameters taken from the environment alone.
    #[must_use]
    pub fn default_params(&self) -> ChatParams {
        ChatParams {
            organization: self.organization.clone(),
            subroutine: self.blueprint.clone(),
            chat_id: self.chat_id.clone(),
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_secs_opt(key: &str) -> Option<u64> {
    env_string_opt(key)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
}

/// Externally supplied parameters for one chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatParams {
    pub organization: String,
    pub subroutine: String,
    pub chat_id: Option<String>,
}

/// Per-run overrides, typically command-line flags. Blank values fall through to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamOverrides {
    pub organization: Option<String>,
    pub subroutine: Option<String>,
    pub chat_id: Option<String>,
}

impl ChatParams {
    #[must_use]
    pub fn new(organization: impl Into<String>, subroutine: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            subroutine: subroutine.into(),
            chat_id: None,
        }
    }

    #[must_use]
    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Each field takes the override when non-empty, else the default.
    ///
    /// Organization and subroutine are trimmed. The chat id is kept verbatim.
    #[must_use]
    pub fn resolve(overrides: &ParamOverrides, defaults: &ChatParams) -> Self {
        let organization = pick(overrides.organization.as_deref(), Some(&defaults.organization));
        let subroutine = pick(overrides.subroutine.as_deref(), Some(&defaults.subroutine));
        let chat_id = pick_verbatim(overrides.chat_id.as_deref(), defaults.chat_id.as_deref());

        Self {
            organization: organization.unwrap_or_default(),
            subroutine: subroutine.unwrap_or_default(),
            chat_id,
        }
    }

    /// True when organization or subroutine is blank.
    #[must_use]
    pub fn missing_identifiers(&self) -> bool {
        self.organization.trim().is_empty() || self.subroutine.trim().is_empty()
    }
}

fn pick(preferred: Option<&str>, fallback: Option<&str>) -> Option<String> {
    pick_verbatim(preferred, fallback).map(|value| value.trim().to_string())
}

fn pick_verbatim(preferred: Option<&str>, fallback: Option<&str>) -> Option<String> {
    [preferred, fallback]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .map(str::to_string)
}
