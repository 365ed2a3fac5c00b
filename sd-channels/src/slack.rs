use crate::traits::{ChannelAdapter, UserDirectory};
use crate::types::{InboundMessage, UserProfile};
use anyhow::{Result, anyhow};
use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;

const SLACK_API_BASE_URL: &str = "https://slack.com/api/";
const HISTORY_PAGE_SIZE_CAP: usize = 200;
const MAX_CATCHUP_PAGES: usize = 10;

#[derive(Clone)]
pub struct SlackAdapter {
    http: reqwest::Client,
    api_base_url: String,
    bot_token: String,
    poll_interval: Duration,
    page_delay: Duration,
    channel_ids: Vec<String>,
    start_from_latest: bool,
    history_limit: usize,
}

impl SlackAdapter {
    pub fn new(bot_token: &str) -> Result<Self> {
        let token = bot_token.trim();
        if token.is_empty() {
            return Err(anyhow!("slack bot token is required"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_base_url: SLACK_API_BASE_URL.to_string(),
            bot_token: token.to_string(),
            poll_interval: Duration::from_millis(3000),
            page_delay: Duration::from_secs(1),
            channel_ids: Vec::new(),
            start_from_latest: true,
            history_limit: 100,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Pause between history pages, to stay under Slack rate limits.
    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub fn with_channel_ids(mut self, channel_ids: Vec<String>) -> Self {
        let mut deduped = Vec::new();
        for channel_id in channel_ids {
            let channel_id = channel_id.trim().to_string();
            if channel_id.is_empty() {
                continue;
            }
            if !deduped.iter().any(|existing| existing == &channel_id) {
                deduped.push(channel_id);
            }
        }
        self.channel_ids = deduped;
        self
    }

    pub fn with_start_from_latest(mut self, start_from_latest: bool) -> Self {
        self.start_from_latest = start_from_latest;
        self
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit.clamp(1, HISTORY_PAGE_SIZE_CAP);
        self
    }

    pub fn with_api_base_url(mut self, api_base_url: &str) -> Self {
        let mut base = api_base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.api_base_url = base;
        self
    }

    fn api_url(&self, method: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{method}", self.api_base_url))?)
    }

    /// Page through a channel's history, newest first, up to `limit` messages.
    ///
    /// API errors are logged and end the walk early; whatever was fetched is returned.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn fetch_channel_history(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<InboundMessage>> {
        let mut all_messages: Vec<SlackMessage> = Vec::new();
        let mut cursor: Option<String> = None;

        while all_messages.len() < limit {
            let page_size = HISTORY_PAGE_SIZE_CAP.min(limit - all_messages.len());
            let page = match self
                .fetch_history_page(channel_id, page_size, cursor.as_deref())
                .await
            {
                Ok(page) => page,
                Err(error) => {
                    tracing::error!(%error, channel_id, "slack history fetch failed");
                    break;
                }
            };
            if page.messages.is_empty() {
                break;
            }
            all_messages.extend(page.messages);
            tracing::info!(fetched = all_messages.len(), "slack history page fetched");

            if !page.has_more {
                break;
            }
            cursor = page
                .response_metadata
                .and_then(|meta| meta.next_cursor)
                .filter(|next| !next.is_empty());
            if cursor.is_none() {
                break;
            }
            tokio::time::sleep(self.page_delay).await;
        }

        all_messages.truncate(limit);
        tracing::info!(total = all_messages.len(), channel_id, "slack history fetch complete");
        all_messages
            .into_iter()
            .map(|message| to_inbound(channel_id, message))
            .collect()
    }

    async fn fetch_history_page(
        &self,
        channel_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<SlackHistoryResponse> {
        let url = self.api_url("conversations.history")?;
        let mut query = vec![
            ("channel", channel_id.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bot_token)
            .query(&query)
            .send()
            .await?;
        let status = response.status();
        let body: SlackHistoryResponse = response.json().await?;
        if !status.is_success() || !body.ok {
            return Err(anyhow!(
                "slack conversations.history failed: status={} channel={} error={}",
                status,
                channel_id,
                body.error.as_deref().unwrap_or("unknown")
            ));
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for SlackAdapter {
    fn channel_id(&self) -> &str {
        "slack"
    }

    async fn start(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        if self.channel_ids.is_empty() {
            return Err(anyhow!(
                "slack adapter requires at least one channel id to poll"
            ));
        }
        let adapter = self.clone();
        tokio::spawn(async move {
            if let Err(error) = adapter.run_poll_loop(tx).await {
                tracing::error!(%error, "slack poll loop exited");
            }
        });
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserDirectory for SlackAdapter {
    async fn lookup_user(&self, user_id: &str) -> Result<UserProfile> {
        let url = self.api_url("users.info")?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bot_token)
            .query(&[("user", user_id)])
            .send()
            .await?;
        let status = response.status();
        let body: SlackUserInfoResponse = response.json().await?;
        if !status.is_success() || !body.ok {
            return Err(anyhow!(
                "slack users.info failed: status={} user={} error={}",
                status,
                user_id,
                body.error.as_deref().unwrap_or("unknown")
            ));
        }
        let user = body
            .user
            .ok_or_else(|| anyhow!("slack users.info response missing user"))?;
        let profile = user.profile.unwrap_or_default();
        Ok(UserProfile {
            display_name: profile.display_name,
            real_name: profile.real_name.or(user.real_name),
            name: user.name,
        })
    }
}

impl SlackAdapter {
    #[tracing::instrument(level = "info", skip_all)]
    async fn run_poll_loop(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        let mut cursor_by_channel: HashMap<String, String> = HashMap::new();
        // Channels whose cursor still has to be seeded before anything is emitted.
        let mut unseeded: HashSet<String> = HashSet::new();

        if self.start_from_latest {
            for channel_id in &self.channel_ids {
                match self.fetch_channel_messages(channel_id, None).await {
                    Ok(messages) => {
                        if let Some(latest) = latest_ts(&messages) {
                            cursor_by_channel.insert(channel_id.clone(), latest);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, channel_id, "slack cursor seed failed; will retry next cycle");
                        unseeded.insert(channel_id.clone());
                    }
                }
            }
            tracing::info!(
                seeded_channels = cursor_by_channel.len(),
                unseeded_channels = unseeded.len(),
                "slack adapter seeded initial cursors"
            );
        }

        loop {
            for channel_id in &self.channel_ids {
                let channel_cursor = cursor_by_channel.get(channel_id).cloned();
                let mut messages = match self
                    .fetch_channel_messages(channel_id, channel_cursor.as_deref())
                    .await
                {
                    Ok(messages) => messages,
                    Err(error) => {
                        tracing::warn!(%error, channel_id, "slack poll failed; will retry next cycle");
                        continue;
                    }
                };
                if unseeded.remove(channel_id) {
                    if let Some(latest) = latest_ts(&messages) {
                        cursor_by_channel.insert(channel_id.clone(), latest);
                    }
                    tracing::info!(channel_id, "slack cursor seeded late");
                    continue;
                }
                messages.sort_by(|left, right| {
                    let left_ts = left.ts.as_deref().unwrap_or_default();
                    let right_ts = right.ts.as_deref().unwrap_or_default();
                    compare_slack_timestamps(left_ts, right_ts)
                });

                let mut newest_seen = channel_cursor.clone();
                let mut emitted = 0usize;

                for message in messages {
                    if !should_emit_message(&message, channel_cursor.as_deref()) {
                        continue;
                    }
                    let Some(ts) = message.ts.clone() else {
                        continue;
                    };
                    match newest_seen.as_deref() {
                        Some(current)
                            if compare_slack_timestamps(current, &ts) != Ordering::Less => {}
                        _ => newest_seen = Some(ts),
                    }
                    if message.text.as_deref().unwrap_or_default().trim().is_empty() {
                        continue;
                    }

                    let inbound = to_inbound(channel_id, message)?;
                    tx.send(inbound)
                        .await
                        .map_err(|e| anyhow!("slack inbound queue closed: {e}"))?;
                    emitted += 1;
                }

                if let Some(newest) = newest_seen {
                    cursor_by_channel.insert(channel_id.clone(), newest);
                }
                tracing::debug!(channel_id, emitted, "slack poll cycle complete");
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Newest messages first. With a cursor, keeps paging until a page reaches
    /// back to it, so a burst larger than one page is not skipped.
    async fn fetch_channel_messages(
        &self,
        channel_id: &str,
        channel_cursor: Option<&str>,
    ) -> Result<Vec<SlackMessage>> {
        let mut messages = Vec::new();
        let mut page_cursor: Option<String> = None;

        for page_number in 1..=MAX_CATCHUP_PAGES {
            let page = self
                .fetch_history_page(channel_id, self.history_limit, page_cursor.as_deref())
                .await?;
            let reached_cursor = match channel_cursor {
                Some(cursor) => page.messages.iter().any(|message| {
                    message.ts.as_deref().is_some_and(|ts| {
                        compare_slack_timestamps(ts, cursor) != Ordering::Greater
                    })
                }),
                None => true,
            };
            messages.extend(page.messages);

            if reached_cursor || !page.has_more {
                return Ok(messages);
            }
            page_cursor = page
                .response_metadata
                .and_then(|meta| meta.next_cursor)
                .filter(|next| !next.is_empty());
            if page_cursor.is_none() {
                return Ok(messages);
            }
            if page_number == MAX_CATCHUP_PAGES {
                tracing::warn!(
                    channel_id,
                    pages = MAX_CATCHUP_PAGES,
                    "slack catch-up page limit reached; older messages may be skipped"
                );
            }
        }
        Ok(messages)
    }
}

fn latest_ts(messages: &[SlackMessage]) -> Option<String> {
    messages
        .iter()
        .filter_map(|message| message.ts.as_deref())
        .max_by(|left, right| compare_slack_timestamps(left, right))
        .map(ToOwned::to_owned)
}

fn to_inbound(channel_id: &str, message: SlackMessage) -> Result<InboundMessage> {
    let metadata = serde_json::to_value(&message)?;
    Ok(InboundMessage {
        message_id: message.ts.unwrap_or_default().into(),
        channel_id: Some(channel_id.into()),
        bot_id: message.bot_id.map(Into::into),
        user_id: message.user.map(Into::into),
        text: message.text.unwrap_or_default(),
        metadata,
        received_at: Utc::now(),
    })
}

/// Integrations post as bots, so `bot_message` passes; edits, joins and the like do not.
fn should_emit_message(message: &SlackMessage, channel_cursor: Option<&str>) -> bool {
    let Some(ts) = message.ts.as_deref() else {
        return false;
    };
    match message.subtype.as_deref() {
        None | Some("bot_message") => {}
        Some(_) => return false,
    }
    if let Some(cursor) = channel_cursor {
        return compare_slack_timestamps(ts, cursor) == Ordering::Greater;
    }
    true
}

fn compare_slack_timestamps(left: &str, right: &str) -> Ordering {
    match (parse_slack_timestamp(left), parse_slack_timestamp(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SlackTimestamp {
    seconds: i64,
    micros: i64,
}

fn parse_slack_timestamp(raw: &str) -> Option<SlackTimestamp> {
    let mut parts = raw.trim().split('.');
    let seconds = parts.next()?.parse::<i64>().ok()?;
    let micros_raw = parts.next().unwrap_or("0");
    let micros_digits = micros_raw.chars().take(6).collect::<String>();
    let micros_padded = format!("{micros_digits:0<6}");
    let micros = micros_padded.parse::<i64>().ok()?;
    Some(SlackTimestamp { seconds, micros })
}

#[derive(Debug, Deserialize)]
struct SlackHistoryResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<SlackResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct SlackResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackUserInfoResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<SlackUserProfile>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackUserProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct SlackMessage {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
}
