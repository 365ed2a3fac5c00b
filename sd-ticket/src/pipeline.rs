use crate::error::Result;
use crate::fields::parse_key_values;
use crate::mentions::resolve_mentions;
use crate::payload::{PayloadBuilder, TicketContext};
use sd_channels::{InboundMessage, UserDirectory};
use sd_otrs::{DynamicField, SessionManager, SessionToken, TicketResult};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Created(TicketResult),
    /// An open ticket already carries this message's dedup key.
    Duplicate { ticket_id: String },
}

/// Message text in, helpdesk ticket out.
pub struct TicketPipeline {
    sessions: Arc<SessionManager>,
    builder: PayloadBuilder,
    directory: Option<Arc<dyn UserDirectory>>,
    customer: String,
    dedup_field: Option<String>,
}

impl TicketPipeline {
    pub fn new(sessions: Arc<SessionManager>, builder: PayloadBuilder, customer: &str) -> Self {
        Self {
            sessions,
            builder,
            directory: None,
            customer: customer.trim().to_string(),
            dedup_field: None,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Name of the dynamic field that stores the chat timestamp for duplicate checks.
    pub fn with_dedup_field(mut self, dedup_field: Option<String>) -> Self {
        self.dedup_field = dedup_field
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        self
    }

    #[tracing::instrument(level = "info", skip_all, fields(ts = %message.ts()))]
    pub async fn process(&self, message: &InboundMessage) -> Result<PipelineOutcome> {
        let mut context = TicketContext {
            channel_id: message.channel_id.as_ref().map(ToString::to_string),
            user_id: message.user_id.as_ref().map(ToString::to_string),
            bot_id: message.bot_id.as_ref().map(ToString::to_string),
            ..TicketContext::new(self.customer.clone())
        };
        let dedup = self
            .dedup_field
            .as_deref()
            .filter(|_| !message.ts().is_empty())
            .map(|name| (name.to_string(), message.ts().to_string()));
        if let Some((name, value)) = dedup.as_ref() {
            context.dynamic_fields.push(DynamicField {
                name: name.clone(),
                value: value.clone(),
            });
        }
        self.create_ticket(&message.text, &context, dedup.as_ref())
            .await
    }

    /// Build and submit a ticket for `raw_text`, optionally skipping known duplicates.
    pub async fn create_ticket(
        &self,
        raw_text: &str,
        context: &TicketContext,
        dedup: Option<&(String, String)>,
    ) -> Result<PipelineOutcome> {
        let text = match self.directory.as_deref() {
            Some(directory) => resolve_mentions(raw_text, directory).await,
            None => raw_text.to_string(),
        };
        let fields = parse_key_values(&text);
        tracing::info!(
            field_count = fields.len(),
            reporter = %fields.reporter(),
            "message fields extracted"
        );
        let request = self.builder.build(&fields, &text, context)?;

        let client = self.sessions.client();
        if let Some((name, value)) = dedup {
            let existing = self
                .with_session(|token| async move {
                    client.find_open_by_dynamic_field(&token, name, value).await
                })
                .await?;
            if let Some(ticket_id) = existing {
                tracing::info!(%ticket_id, field = %name, "open ticket already exists; skipping");
                return Ok(PipelineOutcome::Duplicate { ticket_id });
            }
        }

        let request = &request;
        let result = self
            .with_session(|token| async move { client.submit(request, &token).await })
            .await?;
        Ok(PipelineOutcome::Created(result))
    }

    /// Run `op` with the current session; a rejected session is refreshed and `op` retried once.
    async fn with_session<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(SessionToken) -> Fut,
        Fut: Future<Output = sd_otrs::Result<T>>,
    {
        let token = self.sessions.acquire_token().await?;
        match op(token).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_session_rejected() => {
                tracing::warn!(%e, "otrs session rejected; re-authenticating once");
                self.sessions.invalidate().await;
                let token = self.sessions.acquire_token().await?;
                Ok(op(token).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}
