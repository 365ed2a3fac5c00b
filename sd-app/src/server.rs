use crate::config::{Mode, SlackdeskConfig};
use crate::gateway::{AllowList, Gateway};
use anyhow::Result;
use sd_channels::{ChannelAdapter, InboundMessage, SlackAdapter, UserDirectory};
use sd_otrs::{Credentials, FileTokenStore, OtrsClient, RetryPolicy, SessionManager};
use sd_ticket::{PayloadBuilder, PipelineOutcome, TicketContext, TicketPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = SlackdeskConfig::load(config_path).await?;
    let mut ok = true;
    for (mode, label) in [
        (Mode::Serve, "serve"),
        (Mode::CreateTicket, "create"),
        (Mode::History, "history"),
    ] {
        let problems = cfg.problems(mode);
        if problems.is_empty() {
            tracing::info!(mode = label, "config ok");
        } else {
            ok = false;
            for problem in &problems {
                tracing::warn!(mode = label, %problem, "config problem");
            }
        }
    }
    tracing::info!(
        otrs_server = %cfg.otrs.server,
        otrs_webservice = %cfg.otrs.webservice,
        token_file = %cfg.otrs.token_path().display(),
        queue = %cfg.ticket.defaults.queue,
        customer = %cfg.ticket.customer,
        dedup_dynamic_field = ?cfg.ticket.dedup_dynamic_field,
        slack_channels = cfg.slack.channel_ids.len(),
        allowed_bot_ids = cfg.slack.allowed_bot_ids.len(),
        "doctor summary"
    );
    if !ok {
        return Err(anyhow::anyhow!("doctor found config problems"));
    }
    Ok(())
}

/// One-off ticket from text given on the command line.
pub async fn create_one_shot(
    config_path: Option<PathBuf>,
    customer: Option<String>,
    text: &str,
) -> Result<()> {
    let mut cfg = SlackdeskConfig::load(config_path).await?;
    if let Some(customer) = customer.filter(|v| !v.trim().is_empty()) {
        cfg.ticket.customer = customer.trim().to_string();
    }
    cfg.validate(Mode::CreateTicket)?;

    let mut pipeline = build_pipeline(&cfg)?;
    if !cfg.slack.bot_token.is_empty() {
        pipeline = pipeline.with_directory(Arc::new(SlackAdapter::new(&cfg.slack.bot_token)?));
    }
    let context = TicketContext::new(cfg.ticket.customer.clone());
    match pipeline.create_ticket(text, &context, None).await? {
        PipelineOutcome::Created(result) => {
            println!("ticket created: {}", result.ticket_number);
        }
        PipelineOutcome::Duplicate { ticket_id } => {
            println!("open ticket already exists: {ticket_id}");
        }
    }
    Ok(())
}

/// Print recent channel messages, oldest first.
pub async fn history(config_path: Option<PathBuf>, channel: &str, limit: usize) -> Result<()> {
    let cfg = SlackdeskConfig::load(config_path).await?;
    cfg.validate(Mode::History)?;

    let slack = SlackAdapter::new(&cfg.slack.bot_token)?;
    let messages = slack.fetch_channel_history(channel, limit).await?;
    tracing::info!(channel, count = messages.len(), "history fetched");
    for message in messages.iter().rev() {
        println!("{}", history_line(message));
    }
    Ok(())
}

fn history_line(message: &InboundMessage) -> String {
    const MISSING: &str = "N/A";
    format!(
        "[{}] channel={} user={} bot_id={} text={}",
        message.ts(),
        message.channel_id.as_deref().unwrap_or(MISSING),
        message.user_id.as_deref().unwrap_or(MISSING),
        message.bot_id.as_deref().unwrap_or(MISSING),
        message.text.replace('\n', " "),
    )
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = SlackdeskConfig::load(config_path).await?;
    cfg.validate(Mode::Serve)?;

    let slack = Arc::new(
        SlackAdapter::new(&cfg.slack.bot_token)?
            .with_channel_ids(cfg.slack.channel_ids.clone())
            .with_poll_interval(Duration::from_millis(cfg.slack.poll_interval_ms))
            .with_start_from_latest(cfg.slack.start_from_latest)
            .with_history_limit(cfg.slack.history_limit),
    );
    let directory: Arc<dyn UserDirectory> = slack.clone();
    let pipeline = Arc::new(build_pipeline(&cfg)?.with_directory(directory));
    let allowed = AllowList::new(&cfg.slack.allowed_bot_ids);

    tracing::info!(
        otrs_server = %cfg.otrs.server,
        queue = %cfg.ticket.defaults.queue,
        channels = ?cfg.slack.channel_ids,
        allowed_bot_ids = allowed.len(),
        dedup = cfg.ticket.dedup_dynamic_field.is_some(),
        "slackdesk starting"
    );

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(1024);
    let gateway = Arc::new(Gateway::new(pipeline, allowed, inbound_rx));
    let gateway_task = gateway.start();

    let adapter: Arc<dyn ChannelAdapter> = slack;
    adapter.start(inbound_tx).await?;

    run_until_shutdown(gateway_task, tokio::signal::ctrl_c()).await
}

/// The gateway only stops on its own when every listener is gone, which is a failure.
async fn run_until_shutdown(
    gateway_task: tokio::task::JoinHandle<()>,
    shutdown: impl Future<Output = std::io::Result<()>>,
) -> Result<()> {
    tokio::select! {
        res = gateway_task => {
            if let Err(e) = res {
                tracing::error!(%e, "gateway task failed");
            }
            Err(anyhow::anyhow!("inbound listeners stopped; gateway exited"))
        }
        res = shutdown => {
            res?;
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}

fn build_pipeline(cfg: &SlackdeskConfig) -> Result<TicketPipeline> {
    let client = OtrsClient::new(
        &cfg.otrs.server,
        &cfg.otrs.webservice,
        cfg.otrs.request_timeout(),
    )?
    .with_retry_policy(RetryPolicy::new(
        cfg.otrs.max_retries,
        cfg.otrs.retry_backoff(),
    ));
    let store = Arc::new(FileTokenStore::new(cfg.otrs.token_path()));
    let sessions = Arc::new(
        SessionManager::new(
            client,
            Credentials {
                login: cfg.otrs.login.clone(),
                password: cfg.otrs.password.clone(),
            },
            store,
        )
        .with_max_age(cfg.otrs.token_max_age()),
    );
    Ok(TicketPipeline::new(
        sessions,
        PayloadBuilder::new(cfg.ticket.defaults.clone()),
        &cfg.ticket.customer,
    )
    .with_dedup_field(cfg.ticket.dedup_dynamic_field.clone()))
}
