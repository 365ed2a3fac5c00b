//! Ticket pipeline for slackdesk.
//!
//! Turns chat text into helpdesk tickets: mention resolution, `*Key:* value`
//! extraction, payload assembly and submission through an `sd_otrs` session.

mod error;
mod fields;
mod mentions;
mod payload;
mod pipeline;

pub use error::{Result, TicketError};
pub use fields::{
    FieldMap, REPORTER_KEY, TITLE_KEY, UNKNOWN_REPORTER, normalize_reporter, parse_key_values,
};
pub use mentions::{mentioned_user_ids, resolve_mentions};
pub use payload::{PayloadBuilder, TITLE_PREVIEW_CHARS, TicketContext, TicketDefaults};
pub use pipeline::{PipelineOutcome, TicketPipeline};
