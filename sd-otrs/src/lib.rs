//! Client for the helpdesk generic-interface web service.
//!
//! Session handling, ticket creation with bounded retry, and ticket search.
//! Pure HTTP plus a small on-disk token cache; knows nothing about chat.

mod client;
mod error;
mod retry;
mod session;
mod token;
mod types;

pub use client::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_WEBSERVICE, OtrsClient};
pub use error::{OtrsError, Result};
pub use retry::{AttemptOutcome, DEFAULT_BACKOFF, DEFAULT_MAX_RETRIES, RetryPolicy};
pub use session::{Credentials, SessionManager};
pub use token::{
    DEFAULT_TOKEN_MAX_AGE, FileTokenStore, MemoryTokenStore, SessionToken, TokenStore,
};
pub use types::{Article, DynamicField, OPEN_STATE_TYPES, TicketFields, TicketRequest, TicketResult};
