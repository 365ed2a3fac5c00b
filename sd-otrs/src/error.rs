use thiserror::Error;

pub type Result<T> = std::result::Result<T, OtrsError>;

#[derive(Debug, Error)]
pub enum OtrsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backend refused to open a session for the configured credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("otrs {operation} failed: status={status} body={body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("otrs {operation} failed after {attempts} attempts: status={status} body={body}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        status: u16,
        body: String,
    },

    /// HTTP 200 carrying an `Error` object in the body.
    #[error("otrs rejected request: code={code} message={message}")]
    Rejected { code: String, message: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    #[error("io error: {0}")]
    Io(String),
}

impl OtrsError {
    /// True when the backend rejected the session id rather than the payload.
    pub fn is_session_rejected(&self) -> bool {
        let Self::Rejected { code, .. } = self else {
            return false;
        };
        let code = code.to_ascii_lowercase();
        code.contains("authfail") || code.contains("invalidsession")
    }

    /// HTTP status attached to the error, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::RetriesExhausted { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OtrsError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for OtrsError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}

impl From<std::io::Error> for OtrsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
