use crate::error::{OtrsError, Result};
use crate::retry::{AttemptOutcome, RetryPolicy};
use crate::token::SessionToken;
use crate::types::{
    DynamicFieldFilter, ErrorEnvelope, OPEN_STATE_TYPES, SessionCreateRequest,
    SessionCreateResponse, TicketCreateBody, TicketCreateResponse, TicketRequest, TicketResult,
    TicketSearchBody, TicketSearchResponse, json_scalar_to_string,
};
use serde::Serialize;
use std::time::{Duration, SystemTime};

pub const DEFAULT_WEBSERVICE: &str = "ZabbixIntegrator2";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the helpdesk generic-interface web service.
///
/// Every operation is a JSON `POST` to `{base_url}{Operation}`.
#[derive(Clone)]
pub struct OtrsClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl OtrsClient {
    /// `server` is the helpdesk root (e.g. `https://helpdesk.example/otrs/`).
    pub fn new(server: &str, webservice: &str, timeout: Duration) -> Result<Self> {
        let server = server.trim();
        if server.is_empty() {
            return Err(OtrsError::InvalidInput(
                "otrs server url is required".to_string(),
            ));
        }
        let webservice = webservice.trim().trim_matches('/');
        if webservice.is_empty() {
            return Err(OtrsError::InvalidInput(
                "otrs webservice name is required".to_string(),
            ));
        }
        let base_url = format!(
            "{}/nph-genericinterface.pl/Webservice/{webservice}/",
            server.trim_end_matches('/')
        );
        Self::with_base_url(&base_url, timeout)
    }

    /// Point the client at a fully-formed operation prefix.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OtrsError::Http(e.to_string()))?;
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            http,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn create_session(&self, login: &str, password: &str) -> Result<SessionToken> {
        let payload = SessionCreateRequest {
            user_login: login,
            password,
        };
        let (status, body) = self.post("SessionCreate", &payload).await?;
        if status != 200 {
            return Err(OtrsError::Status {
                operation: "SessionCreate".to_string(),
                status,
                body,
            });
        }
        if let Err(OtrsError::Rejected { code, message }) = check_error_envelope(&body) {
            return Err(OtrsError::Auth(format!("{code}: {message}")));
        }
        let parsed: SessionCreateResponse = serde_json::from_str(&body)?;
        let session_id = parsed
            .session_id
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OtrsError::Auth("SessionCreate response missing SessionID".to_string()))?;
        Ok(SessionToken::new(session_id, SystemTime::now()))
    }

    /// Create a ticket. HTTP 500 is retried with the same payload and token.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn submit(&self, request: &TicketRequest, token: &SessionToken) -> Result<TicketResult> {
        tracing::info!(title = %request.ticket.title, queue = %request.ticket.queue, "creating ticket");
        let payload = TicketCreateBody {
            session_id: token.as_str(),
            request,
        };
        let body = self.post_with_retry("TicketCreate", &payload).await?;
        check_error_envelope(&body)?;

        let parsed: TicketCreateResponse = serde_json::from_str(&body)?;
        let created = parsed.ticket.ok_or_else(|| {
            OtrsError::ResponseFormat(format!("TicketCreate response missing Ticket: {body}"))
        })?;
        let ticket_number = created.ticket_number.ok_or_else(|| {
            OtrsError::ResponseFormat(format!("TicketCreate response missing TicketNumber: {body}"))
        })?;
        tracing::info!(ticket_number = %ticket_number, "ticket created");
        Ok(TicketResult {
            ticket_number,
            ticket_id: created.ticket_id,
        })
    }

    /// First open ticket whose dynamic field `name` equals `value`.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn find_open_by_dynamic_field(
        &self,
        token: &SessionToken,
        name: &str,
        value: &str,
    ) -> Result<Option<String>> {
        let payload = TicketSearchBody {
            session_id: token.as_str(),
            state_type: OPEN_STATE_TYPES,
            dynamic_field: vec![DynamicFieldFilter {
                name,
                equals: value,
            }],
        };
        let body = self.post_with_retry("TicketSearch", &payload).await?;
        check_error_envelope(&body)?;

        let parsed: TicketSearchResponse = serde_json::from_str(&body)?;
        Ok(parsed
            .ticket_ids
            .unwrap_or_default()
            .iter()
            .find_map(json_scalar_to_string))
    }

    async fn post_with_retry<T: Serialize + ?Sized>(
        &self,
        operation: &str,
        payload: &T,
    ) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let (status, body) = self.post(operation, payload).await?;
            match self.retry.classify(status, attempt) {
                AttemptOutcome::Success => return Ok(body),
                AttemptOutcome::Retry => {
                    tracing::warn!(
                        operation,
                        status,
                        attempt,
                        max_attempts = self.retry.max_attempts(),
                        body = %body,
                        "transient otrs failure; retrying"
                    );
                    tokio::time::sleep(self.retry.backoff()).await;
                }
                AttemptOutcome::Exhausted => {
                    tracing::error!(operation, status, attempt, body = %body, "otrs retries exhausted");
                    return Err(OtrsError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        status,
                        body,
                    });
                }
                AttemptOutcome::Fatal => {
                    tracing::error!(operation, status, body = %body, "otrs request failed");
                    return Err(OtrsError::Status {
                        operation: operation.to_string(),
                        status,
                        body,
                    });
                }
            }
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, operation: &str, payload: &T) -> Result<(u16, String)> {
        let url = format!("{}{operation}", self.base_url);
        let response = self.http.post(url).json(payload).send().await?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        Ok((status, body))
    }
}

fn check_error_envelope(body: &str) -> Result<()> {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return Ok(());
    };
    let Some(error) = envelope.error else {
        return Ok(());
    };
    Err(OtrsError::Rejected {
        code: error.code.unwrap_or_else(|| "unknown".to_string()),
        message: error.message.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Article, TicketFields};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> OtrsClient {
        OtrsClient::with_base_url(&format!("{}/ws/", server.uri()), Duration::from_secs(5))
            .expect("client builds")
            .with_retry_policy(RetryPolicy::new(2, Duration::ZERO))
    }

    fn token() -> SessionToken {
        SessionToken::new("sess-1", SystemTime::now())
    }

    fn request() -> TicketRequest {
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
    fn new_builds_generic_interface_base_url() {
        let client = OtrsClient::new("https://desk.example/otrs/", "ZabbixIntegrator2", DEFAULT_REQUEST_TIMEOUT)
            .expect("client builds");
        assert_eq!(
            client.base_url(),
            "https://desk.example/otrs/nph-genericinterface.pl/Webservice/ZabbixIntegrator2/"
        );
        assert!(OtrsClient::new("  ", DEFAULT_WEBSERVICE, DEFAULT_REQUEST_TIMEOUT).is_err());
    }

    #[tokio::test]
    async fn create_session_returns_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ws/SessionCreate"))
            .and(body_partial_json(json!({"UserLogin": "bot", "Password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"SessionID": "abc123"})))
            .expect(1)
            .mount(&server)
            .await;

        let token = test_client(&server)
            .create_session("bot", "pw")
            .await
            .expect("session created");
        assert_eq!(token.as_str(), "abc123");
    }

    #[tokio::test]
    async fn create_session_maps_error_object_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ws/SessionCreate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Error": {"ErrorCode": "SessionCreate.AuthFail", "ErrorMessage": "Authorization failing!"}
            })))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .create_session("bot", "wrong")
            .await
            .expect_err("credentials rejected");
        match err {
            OtrsError::Auth(msg) => assert!(msg.contains("AuthFail")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_retries_500_then_succeeds_with_third_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ws/TicketCreate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ws/TicketCreate"))
            .and(body_partial_json(json!({"SessionID": "sess-1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"Ticket": {"TicketNumber": "2024051610000012"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = test_client(&server)
            .submit(&request(), &token())
            .await
            .expect("third attempt succeeds");
        assert_eq!(result.ticket_number, "2024051610000012");
    }

    #[tokio::test]
    async fn submit_fails_after_all_attempts_return_500() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ws/TicketCreate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("still down"))
            .expect(3)
            .mount(&server)
            .await;

        let err = test_client(&server)
            .submit(&request(), &token())
            .await
            .expect_err("retries exhausted");
        match err {
            OtrsError::RetriesExhausted {
                attempts,
                status,
                body,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(status, 500);
                assert_eq!(body, "still down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ws/TicketCreate"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server)
            .submit(&request(), &token())
            .await
            .expect_err("fatal status");
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("bad payload"));
    }

    #[tokio::test]
    async fn submit_surfaces_session_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ws/TicketCreate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Error": {"ErrorCode": "TicketCreate.AuthFail", "ErrorMessage": "Authorization failing!"}
            })))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .submit(&request(), &token())
            .await
            .expect_err("rejected");
        assert!(err.is_session_rejected());
    }

    #[tokio::test]
    async fn search_returns_first_ticket_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ws/TicketSearch"))
            .and(body_partial_json(json!({
                "DynamicField": [{"Name": "SlackTS", "Equals": "1716572940.000100"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"TicketID": ["42", "43"]})))
            .mount(&server)
            .await;

        let found = test_client(&server)
            .find_open_by_dynamic_field(&token(), "SlackTS", "1716572940.000100")
            .await
            .expect("search ok");
        assert_eq!(found.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn search_returns_none_without_matches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ws/TicketSearch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let found = test_client(&server)
            .find_open_by_dynamic_field(&token(), "SlackTS", "1")
            .await
            .expect("search ok");
        assert_eq!(found, None);
    }
}
