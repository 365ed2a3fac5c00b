use crate::error::{Result, TicketError};
use crate::fields::{FieldMap, TITLE_KEY, is_reporter_key};
use sd_otrs::{Article, DynamicField, TicketFields, TicketRequest};
use serde::Deserialize;

pub const TITLE_PREVIEW_CHARS: usize = 50;

/// Deployment constants stamped on every ticket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TicketDefaults {
    #[serde(default = "default_ticket_type")]
    pub ticket_type: String,
    #[serde(default)]
    pub queue: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default = "default_priority_id")]
    pub priority_id: String,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default = "default_lock")]
    pub lock: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Article recipient. Defaults to the customer.
    #[serde(default)]
    pub to_address: Option<String>,
    /// Field previewed in the title when there is no `Título`. Unset means raw text.
    #[serde(default)]
    pub title_source_field: Option<String>,
}

fn default_ticket_type() -> String {
    "Incidente".to_string()
}

fn default_priority_id() -> String {
    "2".to_string()
}

fn default_state() -> String {
    "open".to_string()
}

fn default_lock() -> String {
    "unlock".to_string()
}

fn default_owner() -> String {
    "root@localhost".to_string()
}

fn default_from_address() -> String {
    "slack@yourdomain".to_string()
}

impl Default for TicketDefaults {
    fn default() -> Self {
        Self {
            ticket_type: default_ticket_type(),
            queue: String::new(),
            service_id: String::new(),
            priority_id: default_priority_id(),
            state: default_state(),
            lock: default_lock(),
            owner: default_owner(),
            from_address: default_from_address(),
            to_address: None,
            title_source_field: None,
        }
    }
}

/// Per-message context: who the ticket is for and where the message came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketContext {
    pub customer: String,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub bot_id: Option<String>,
    pub dynamic_fields: Vec<DynamicField>,
}

impl TicketContext {
    pub fn new(customer: impl Into<String>) -> Self {
        Self {
            customer: customer.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    defaults: TicketDefaults,
}

impl PayloadBuilder {
    pub fn new(defaults: TicketDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &TicketDefaults {
        &self.defaults
    }

    /// Assemble a complete ticket-creation request. No I/O.
    pub fn build(
        &self,
        fields: &FieldMap,
        raw_text: &str,
        context: &TicketContext,
    ) -> Result<TicketRequest> {
        let customer = context.customer.trim();
        if customer.is_empty() {
            return Err(TicketError::InvalidInput(
                "ticket customer is required".to_string(),
            ));
        }

        let title = format!(
            "[{}] - {}",
            customer.to_uppercase(),
            self.title_preview(fields, raw_text)
        );
        let body = if fields.is_empty() {
            tracing::warn!("no structured fields found; using raw message body");
            fallback_body(raw_text, context)
        } else {
            fields_body(fields)
        };
        let to = self
            .defaults
            .to_address
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| customer.to_string());

        Ok(TicketRequest {
            ticket: TicketFields {
                title: title.clone(),
                ticket_type: self.defaults.ticket_type.clone(),
                queue: self.defaults.queue.clone(),
                lock: self.defaults.lock.clone(),
                service_id: self.defaults.service_id.clone(),
                priority_id: self.defaults.priority_id.clone(),
                state: self.defaults.state.clone(),
                customer_user: customer.to_string(),
                owner: self.defaults.owner.clone(),
            },
            article: Article {
                sender_type: "agent".to_string(),
                is_visible_for_customer: 1,
                from: self.defaults.from_address.clone(),
                to,
                subject: title,
                body,
                mime_type: "text/html".to_string(),
                charset: "UTF-8".to_string(),
                time_unit: "0".to_string(),
            },
            dynamic_fields: context.dynamic_fields.clone(),
        })
    }

    /// `Título` verbatim, else the first 50 characters of the title source on one line.
    pub fn title_preview(&self, fields: &FieldMap, raw_text: &str) -> String {
        if let Some(title) = fields.get_normalized(TITLE_KEY) {
            return title.to_string();
        }
        let source = self
            .defaults
            .title_source_field
            .as_deref()
            .and_then(|key| fields.get_normalized(key))
            .unwrap_or(raw_text);
        preview(source)
    }
}

fn preview(text: &str) -> String {
    text.replace("\r\n", " ")
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(TITLE_PREVIEW_CHARS)
        .collect()
}

fn fields_body(fields: &FieldMap) -> String {
    fields
        .canonical_order()
        .into_iter()
        .map(|(key, value)| {
            let value = if is_reporter_key(key) {
                fields.reporter()
            } else {
                value.to_string()
            };
            format!("<b>{}:</b> {}<br>", escape_html(key), html_text(&value))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fallback_body(raw_text: &str, context: &TicketContext) -> String {
    let mut lines = Vec::new();
    if let Some(channel) = context.channel_id.as_deref() {
        lines.push(format!("<b>Canal:</b> {}<br>", escape_html(channel)));
    }
    if let Some(user) = context.user_id.as_deref() {
        lines.push(format!("<b>Usuário:</b> {}<br>", escape_html(user)));
    }
    if let Some(bot) = context.bot_id.as_deref() {
        lines.push(format!("<b>Bot ID:</b> {}<br>", escape_html(bot)));
    }
    lines.push(format!("<b>Mensagem:</b> {}", html_text(raw_text.trim())));
    lines.join("\n")
}

fn html_text(value: &str) -> String {
    escape_html(value).replace("\r\n", "<br>").replace('\n', "<br>")
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}
