//! agent-chat
//!
//! Runs one streaming exchange against an agent-serving backend and renders
//! the reply in the terminal while it is assembled.

mod render;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{AgentError, AgentMessage, ExchangeOutcome, RunAgentStreamRequest, SessionId};
use agent_runtime::{run_exchange, StreamClient, StreamConfig};

use crate::render::Renderer;

#[derive(Parser, Debug)]
#[command(name = "agent-chat", about = "Stream one reply from a configured agent", version)]
struct Cli {
    /// Agent to run
    #[arg(long, env = "AGENT_ID")]
    agent_id: i64,

    /// API key of the agent
    #[arg(long, env = "AGENT_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Backend base URL
    #[arg(long, env = "AGENT_BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Session to continue; a new one is created when omitted
    #[arg(long, env = "AGENT_SESSION_ID")]
    session: Option<String>,

    /// Delay between `message_end` and closing the connection
    #[arg(long, env = "AGENT_CLOSE_GRACE_MS", default_value_t = 100)]
    close_grace_ms: u64,

    /// Prompt placeholder replacement (repeatable)
    #[arg(long = "replace", value_name = "KEY=VALUE", value_parser = parse_replacement)]
    replacements: Vec<(String, String)>,

    /// Print the reply and the history records as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Message to send
    #[arg(required = true)]
    message: Vec<String>,
}

fn parse_replacement(raw: &str) -> Result<(String, String), AgentError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(AgentError::Config(format!("expected KEY=VALUE, got {raw:?}"))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env first so clap's env fallbacks see it
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = StreamConfig::new(cli.base_url)
        .with_close_grace(Duration::from_millis(cli.close_grace_ms));
    let client = StreamClient::new(config).context("failed to set up the stream client")?;

    let session = cli.session.map_or_else(SessionId::new, SessionId::from_string);
    let user_turn = AgentMessage::user(cli.agent_id, &session, cli.message.join(" "));
    let mut request = RunAgentStreamRequest::new(cli.api_key, user_turn.clone());
    request.prompt_replacement.extend(cli.replacements);

    tracing::info!(agent_id = cli.agent_id, session = %session, "Starting exchange");

    let mut renderer = Renderer::stdout();
    let render_text = !cli.json;
    let outcome = tokio::select! {
        outcome = run_exchange(&client, request, |message| {
            if render_text {
                if let Err(e) = renderer.update(message) {
                    tracing::warn!(error = %e, "Failed to write to stdout");
                }
            }
        }) => outcome,
        _ = tokio::signal::ctrl_c() => {
            // Dropping the exchange cancels the request
            tracing::warn!("Interrupted, closing the exchange");
            anyhow::bail!("interrupted");
        }
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, retryable = e.is_retryable(), "Exchange failed");
            anyhow::bail!(e.user_message());
        }
    };

    match outcome {
        ExchangeOutcome::Completed(reply) => {
            tracing::info!(tools = reply.tools.len(), "Reply complete");
            if cli.json {
                let history = [
                    user_turn,
                    AgentMessage::from_finalized(cli.agent_id, &session, &reply),
                ];
                let document = json!({ "reply": reply, "history": history });
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                renderer.finish(&reply)?;
            }
            Ok(())
        }
        ExchangeOutcome::Failed(failure) => {
            println!();
            tracing::error!(error = %failure.error, "Agent reported an error");
            anyhow::bail!(failure.message());
        }
        ExchangeOutcome::Incomplete(partial) => {
            println!();
            tracing::warn!(
                received = partial.as_ref().map_or(0, |m| m.content.len()),
                "Stream closed before the reply was complete"
            );
            anyhow::bail!("stream closed before the reply was complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_replacement() {
        assert_eq!(parse_replacement("name=Ada").unwrap(), ("name".into(), "Ada".into()));
        assert_eq!(parse_replacement("expr=a=b").unwrap(), ("expr".into(), "a=b".into()));
        assert_eq!(parse_replacement("empty=").unwrap(), ("empty".into(), String::new()));
        assert!(matches!(parse_replacement("novalue"), Err(AgentError::Config(_))));
        assert!(matches!(parse_replacement("=x"), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "agent-chat",
            "--agent-id",
            "7",
            "--api-key",
            "k",
            "--replace",
            "name=Ada",
            "--json",
            "hello",
            "there",
        ])
        .unwrap();
        assert_eq!(cli.agent_id, 7);
        assert_eq!(cli.message.join(" "), "hello there");
        assert_eq!(cli.replacements, [("name".to_string(), "Ada".to_string())]);
        assert!(cli.json);
        assert_eq!(cli.close_grace_ms, 100);
    }
}
