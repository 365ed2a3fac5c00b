//! Chat-platform adapters for slackdesk.
//!
//! Adapters are pure I/O: they turn platform messages into `InboundMessage`
//! values and answer user-profile lookups for mention rendering.

mod slack;
mod traits;
mod types;

pub use slack::SlackAdapter;
pub use traits::{ChannelAdapter, UserDirectory};
pub use types::{BotId, ChannelId, InboundMessage, MessageId, UserId, UserProfile};
