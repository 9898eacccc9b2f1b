//! Line-oriented terminal client for a soul chat session.
//!
//! ```bash
//! # Connect with env defaults
//! SOUL_ENGINE_ORGANIZATION=acme SOUL_ENGINE_BLUEPRINT=samantha soul-chat
//!
//! # Override parameters per run
//! soul-chat --organization acme --subroutine samantha --chat-id abc
//!
//! # Local echo soul, no network
//! soul-chat --offline --organization local --subroutine echo
//! ```

mod commands;
mod render;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use session_store::{state_file_path, FileStore};
use soul_chat::logging::{self, LogConfig};
use soul_chat::{ChatError, ChatParams, EnvConfig, ParamOverrides, SessionController};
use soul_engine_api::SoulEngineApiConfig;
use soul_transport::{AuthTokenError, SoulConnector, TokenSource};
use soul_transport_mock::MockConnector;
use soul_transport_ws::{EngineTokenSource, WebSocketConnector};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use render::{status_line, Renderer};

/// Chat with a soul over a realtime session.
#[derive(Parser, Debug)]
#[command(name = "soul-chat")]
#[command(version, about, long_about = None)]
struct Args {
    /// Organization slug
    #[arg(long, value_name = "ORG")]
    organization: Option<String>,

    /// Subroutine (blueprint) id
    #[arg(long, value_name = "ID")]
    subroutine: Option<String>,

    /// Explicit chat id; never persisted
    #[arg(long, value_name = "ID")]
    chat_id: Option<String>,

    /// Websocket host
    #[arg(long, value_name = "URL")]
    ws_url: Option<String>,

    /// HTTP host serving /auth/token
    #[arg(long, value_name = "URL")]
    http_url: Option<String>,

    /// Use an in-process echo soul instead of the engine
    #[arg(long)]
    offline: bool,
}

impl Args {
    fn overrides(&self) -> ParamOverrides {
        ParamOverrides {
            organization: self.organization.clone(),
            subroutine: self.subroutine.clone(),
            chat_id: self.chat_id.clone(),
        }
    }
}

struct OfflineTokens;

#[async_trait]
impl TokenSource for OfflineTokens {
    async fn fetch_token(&self, soul_id: &str) -> Result<String, AuthTokenError> {
        Ok(format!("offline-{soul_id}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::from_env();

    let log_config = LogConfig {
        file: env.log_file.clone(),
        ..LogConfig::default()
    };
    logging::init(&log_config).context("Failed to open log file")?;

    let params = ChatParams::resolve(&args.overrides(), &env.default_params());
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    let state_path = env
        .state_path
        .clone()
        .unwrap_or_else(|| state_file_path(&cwd));
    let store = Arc::new(FileStore::new(state_path));

    let (connector, tokens): (Arc<dyn SoulConnector>, Arc<dyn TokenSource>) = if args.offline {
        (Arc::new(MockConnector::echo()), Arc::new(OfflineTokens))
    } else {
        let ws_url = args.ws_url.clone().unwrap_or_else(|| env.ws_url.clone());
        let http_url = args.http_url.clone().or_else(|| env.http_url.clone());
        let api_config = SoulEngineApiConfig::for_hosts(&ws_url, http_url.as_deref());
        let tokens =
            EngineTokenSource::new(api_config).context("Failed to build token client")?;
        info!(ws_url = %ws_url, "using soul engine");
        (
            Arc::new(WebSocketConnector::new(ws_url).with_handshake_timeout(env.handshake_timeout)),
            Arc::new(tokens),
        )
    };

    let controller = Arc::new(SessionController::new(connector, tokens, store));
    let renderer = tokio::spawn(render_loop(Arc::clone(&controller)));

    match controller.start(&params) {
        Ok(_) => {}
        Err(ChatError::MissingChatIdentifiers) => {
            println!(
                "Missing chat identifiers: pass --organization and --subroutine or set \
                 SOUL_ENGINE_ORGANIZATION and SOUL_ENGINE_BLUEPRINT."
            );
        }
        Err(error) => return Err(error.into()),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
    {
        match parse_slash_command(&line) {
            Some(SlashCommand::Quit) => break,
            Some(SlashCommand::Dismiss) => {
                controller.dismiss_error();
            }
            Some(SlashCommand::Status) => {
                let identity = controller.identity().unwrap_or_else(|| "-".to_string());
                println!("{} (chat id {identity})", status_line(&controller.state()));
            }
            Some(SlashCommand::Help) => println!("{HELP_TEXT}"),
            Some(SlashCommand::Unknown(command)) => {
                println!("Unknown command {command}. {HELP_TEXT}");
            }
            None => {
                controller.set_input(line.as_str());
                if controller.submit_input().is_none()
                    && !line.trim().is_empty()
                    && !controller.state().is_connected()
                {
                    println!("Not connected; message not sent.");
                }
            }
        }
    }

    controller.shutdown().await;
    renderer.abort();
    Ok(())
}

async fn render_loop(controller: Arc<SessionController>) {
    let mut changes = controller.subscribe_changes();
    let mut renderer = Renderer::default();
    let mut stdout = tokio::io::stdout();

    loop {
        let text = renderer.diff(&controller.snapshot());
        if !text.is_empty() {
            let _ = stdout.write_all(text.as_bytes()).await;
            let _ = stdout.flush().await;
        }
        if changes.changed().await.is_err() {
            break;
        }
    }
}
