//! Single inbound queue: every listener feeds one loop that submits tickets in order.

use anyhow::Result;
use sd_channels::InboundMessage;
use sd_ticket::{PipelineOutcome, TicketPipeline};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Bot ids whose messages may become tickets. Empty admits nothing.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    bot_ids: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(bot_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            bot_ids: bot_ids
                .into_iter()
                .map(|id| id.as_ref().trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bot_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bot_ids.len()
    }

    pub fn admits(&self, bot_id: Option<&str>) -> bool {
        bot_id.is_some_and(|id| self.bot_ids.contains(id.trim()))
    }
}

pub struct Gateway {
    pipeline: Arc<TicketPipeline>,
    allowed: AllowList,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
}

impl Gateway {
    pub fn new(
        pipeline: Arc<TicketPipeline>,
        allowed: AllowList,
        inbound_rx: mpsc::Receiver<InboundMessage>,
    ) -> Self {
        if allowed.is_empty() {
            tracing::warn!("bot allow-list is empty; no message will become a ticket");
        }
        Self {
            pipeline,
            allowed,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        }
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run_loop().await {
                tracing::error!(%e, "gateway loop exited");
            }
        })
    }

    /// Drain the queue one message at a time until every sender is gone.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run_loop(&self) -> Result<()> {
        loop {
            let msg = {
                let mut rx = self.inbound_rx.lock().await;
                rx.recv().await
            };
            let Some(inbound) = msg else {
                tracing::info!("inbound queue closed");
                return Ok(());
            };

            if let Err(e) = self.handle_inbound(inbound).await {
                tracing::warn!(%e, "handle_inbound failed");
            }
        }
    }

    /// `Ok(None)` when the sender is not allowed.
    #[tracing::instrument(level = "info", skip_all, fields(ts = %inbound.ts()))]
    pub async fn handle_inbound(&self, inbound: InboundMessage) -> Result<Option<PipelineOutcome>> {
        if !self.allowed.admits(inbound.sender_bot_id()) {
            tracing::debug!(
                bot_id = ?inbound.sender_bot_id(),
                user_id = ?inbound.user_id,
                "sender not in allow-list; ignoring"
            );
            return Ok(None);
        }

        match self.pipeline.process(&inbound).await {
            Ok(outcome) => {
                match &outcome {
                    PipelineOutcome::Created(result) => tracing::info!(
                        ticket_number = %result.ticket_number,
                        ticket_id = ?result.ticket_id,
                        "ticket created"
                    ),
                    PipelineOutcome::Duplicate { ticket_id } => {
                        tracing::info!(%ticket_id, "duplicate message; ticket not created")
                    }
                }
                Ok(Some(outcome))
            }
            Err(e) => {
                tracing::error!(%e, "ticket submission failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sd_otrs::{
        Credentials, MemoryTokenStore, OtrsClient, RetryPolicy, SessionManager, SessionToken,
    };
    use sd_ticket::{PayloadBuilder, TicketDefaults};
    use serde_json::json;
    use std::time::{Duration, SystemTime};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pipeline(server: &MockServer) -> Arc<TicketPipeline> {
        let client = OtrsClient::with_base_url(&server.uri(), Duration::from_secs(5))
            .expect("client builds")
            .with_retry_policy(RetryPolicy::new(2, Duration::ZERO));
        let store = Arc::new(MemoryTokenStore::with_token(SessionToken::new(
            "cached",
            SystemTime::now(),
        )));
        let sessions = Arc::new(SessionManager::new(
            client,
            Credentials {
                login: "bot".to_string(),
                password: "pw".to_string(),
            },
            store,
        ));
        Arc::new(TicketPipeline::new(
            sessions,
            PayloadBuilder::new(TicketDefaults {
                queue: "Triagem".to_string(),
                ..TicketDefaults::default()
            }),
            "acme",
        ))
    }

    fn message(ts: &str, bot_id: Option<&str>) -> InboundMessage {
        InboundMessage {
            message_id: ts.into(),
            channel_id: Some("C1".into()),
            bot_id: bot_id.map(Into::into),
            user_id: Some("U1".into()),
            text: "*Título:* Falha".to_string(),
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn allow_list_admits_only_listed_bots() {
        let allowed = AllowList::new([" B1 ", "", "B2"]);
        assert_eq!(allowed.len(), 2);
        assert!(allowed.admits(Some("B1")));
        assert!(!allowed.admits(Some("B3")));
        assert!(!allowed.admits(None));
    }

    #[test]
    fn empty_allow_list_admits_nobody() {
        let allowed = AllowList::new(Vec::<String>::new());
        assert!(allowed.is_empty());
        assert!(!allowed.admits(Some("B1")));
        assert!(!allowed.admits(None));
    }

    #[tokio::test]
    async fn disallowed_sender_never_reaches_helpdesk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (_tx, rx) = mpsc::channel(4);
        let gateway = Gateway::new(pipeline(&server), AllowList::new(["B1"]), rx);
        let outcome = gateway
            .handle_inbound(message("1.0", Some("B9")))
            .await
            .expect("ignored");
        assert!(outcome.is_none());
        let outcome = gateway
            .handle_inbound(message("2.0", None))
            .await
            .expect("ignored");
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn loop_processes_queue_in_order_and_survives_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/TicketCreate"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/TicketCreate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"Ticket": {"TicketNumber": "9"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (tx, rx) = mpsc::channel(4);
        let gateway = Arc::new(Gateway::new(pipeline(&server), AllowList::new(["B1"]), rx));
        tx.send(message("1.0", Some("B1"))).await.expect("queued");
        tx.send(message("2.0", Some("B1"))).await.expect("queued");
        drop(tx);

        gateway.run_loop().await.expect("loop drains queue");
    }
}
