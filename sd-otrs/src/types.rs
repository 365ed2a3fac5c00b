use serde::{Deserialize, Deserializer, Serialize};

/// Ticket-creation payload, minus the session id which the client adds per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketRequest {
    #[serde(rename = "Ticket")]
    pub ticket: TicketFields,
    #[serde(rename = "Article")]
    pub article: Article,
    #[serde(rename = "DynamicField", skip_serializing_if = "Vec::is_empty")]
    pub dynamic_fields: Vec<DynamicField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TicketFields {
    pub title: String,
    #[serde(rename = "Type")]
    pub ticket_type: String,
    pub queue: String,
    pub lock: String,
    #[serde(rename = "ServiceID")]
    pub service_id: String,
    #[serde(rename = "PriorityID")]
    pub priority_id: String,
    pub state: String,
    pub customer_user: String,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Article {
    pub sender_type: String,
    pub is_visible_for_customer: u8,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub mime_type: String,
    pub charset: String,
    pub time_unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DynamicField {
    pub name: String,
    pub value: String,
}

/// Ticket states considered "still open" when looking for duplicates.
pub const OPEN_STATE_TYPES: &[&str] = &[
    "open",
    "new",
    "pending auto",
    "pending reminder",
    "Pendente com o Cliente",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketResult {
    pub ticket_number: String,
    pub ticket_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionCreateRequest<'a> {
    #[serde(rename = "UserLogin")]
    pub user_login: &'a str,
    #[serde(rename = "Password")]
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionCreateResponse {
    #[serde(rename = "SessionID", default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TicketCreateBody<'a> {
    #[serde(rename = "SessionID")]
    pub session_id: &'a str,
    #[serde(flatten)]
    pub request: &'a TicketRequest,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TicketCreateResponse {
    #[serde(rename = "Ticket", default)]
    pub ticket: Option<CreatedTicket>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedTicket {
    #[serde(rename = "TicketNumber", default, deserialize_with = "string_or_number")]
    pub ticket_number: Option<String>,
    #[serde(rename = "TicketID", default, deserialize_with = "string_or_number")]
    pub ticket_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TicketSearchBody<'a> {
    #[serde(rename = "SessionID")]
    pub session_id: &'a str,
    #[serde(rename = "StateType")]
    pub state_type: &'a [&'a str],
    #[serde(rename = "DynamicField")]
    pub dynamic_field: Vec<DynamicFieldFilter<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DynamicFieldFilter<'a> {
    #[serde(rename = "Name")]
    pub name: &'a str,
    #[serde(rename = "Equals")]
    pub equals: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TicketSearchResponse {
    #[serde(rename = "TicketID", default)]
    pub ticket_ids: Option<Vec<serde_json::Value>>,
}

/// The generic interface reports failures as `{"Error": {...}}` with HTTP 200.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(rename = "Error", default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(rename = "ErrorCode", default)]
    pub code: Option<String>,
    #[serde(rename = "ErrorMessage", default)]
    pub message: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| json_scalar_to_string(&v)))
}

pub(crate) fn json_scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_request() -> TicketRequest {
        TicketRequest {
            ticket: TicketFields {
                title: "[ACME] - Falha".to_string(),
                ticket_type: "Incidente".to_string(),
                queue: "Triagem".to_string(),
                lock: "unlock".to_string(),
                service_id: "290".to_string(),
                priority_id: "2".to_string(),
                state: "open".to_string(),
                customer_user: "acme".to_string(),
                owner: "root@localhost".to_string(),
            },
            article: Article {
                sender_type: "agent".to_string(),
                is_visible_for_customer: 1,
                from: "slack@yourdomain".to_string(),
                to: "acme".to_string(),
                subject: "[ACME] - Falha".to_string(),
                body: "<b>Mensagem:</b> Falha".to_string(),
                mime_type: "text/html".to_string(),
                charset: "UTF-8".to_string(),
                time_unit: "0".to_string(),
            },
            dynamic_fields: Vec::new(),
        }
    }

    #[test]
    fn ticket_create_body_uses_generic_interface_field_names() {
        let request = sample_request();
        let body = TicketCreateBody {
            session_id: "sess-1",
            request: &request,
        };
        let value = serde_json::to_value(&body).expect("serialize body");
        assert_eq!(value["SessionID"], "sess-1");
        assert_eq!(value["Ticket"]["Type"], "Incidente");
        assert_eq!(value["Ticket"]["ServiceID"], "290");
        assert_eq!(value["Ticket"]["PriorityID"], "2");
        assert_eq!(value["Ticket"]["CustomerUser"], "acme");
        assert_eq!(value["Article"]["IsVisibleForCustomer"], 1);
        assert_eq!(value["Article"]["MimeType"], "text/html");
        assert!(value.get("DynamicField").is_none());
    }

    #[test]
    fn dynamic_fields_are_serialized_when_present() {
        let mut request = sample_request();
        request.dynamic_fields.push(DynamicField {
            name: "SlackTS".to_string(),
            value: "1716572940.000100".to_string(),
        });
        let value = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(
            value["DynamicField"],
            json!([{"Name": "SlackTS", "Value": "1716572940.000100"}])
        );
    }

    #[test]
    fn created_ticket_accepts_numeric_ticket_number() {
        let parsed: TicketCreateResponse =
            serde_json::from_value(json!({"Ticket": {"TicketNumber": 2024051610000012u64}}))
                .expect("parse response");
        let ticket = parsed.ticket.expect("ticket present");
        assert_eq!(ticket.ticket_number.as_deref(), Some("2024051610000012"));
        assert_eq!(ticket.ticket_id, None);
    }
}
