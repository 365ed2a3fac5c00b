//! slackdesk main binary: Slack messages in, helpdesk tickets out.

mod config;
mod gateway;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "slackdesk", version, about = "Slack to OTRS ticket bridge")]
struct Cli {
    /// Config file. Falls back to $SLACKDESK_CONFIG, then ~/.slackdesk/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the configured channels and open tickets (default).
    Serve,
    /// Create one ticket from the given text.
    Create {
        /// Overrides ticket.customer.
        #[arg(long)]
        customer: Option<String>,
        #[arg(long)]
        text: String,
    },
    /// Print recent messages of a channel, oldest first, one line each.
    History {
        #[arg(long)]
        channel: String,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Validate config for every command.
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(anyhow::anyhow!("load .env: {e}"));
        }
    }
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    let config_path = cli.config;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(config_path).await,
        Command::Create { customer, text } => {
            server::create_one_shot(config_path, customer, &text).await
        }
        Command::History { channel, limit } => server::history(config_path, &channel, limit).await,
        Command::Doctor => server::doctor(config_path).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new(
            "info,slackdesk=debug,sd_app=debug,sd_otrs=debug,sd_channels=debug,sd_ticket=debug",
        ),
    };
    let log_format = std::env::var("SLACKDESK_LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported SLACKDESK_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::info!(
        log_format = %log_format,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
