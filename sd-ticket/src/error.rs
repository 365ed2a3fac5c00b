use sd_otrs::OtrsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TicketError>;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Otrs(#[from] OtrsError),
}
