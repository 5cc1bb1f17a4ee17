use thiserror::Error;
use turf_grid::GridError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(#[from] GridError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("cannot attack a zone you own")]
    SelfAttack,

    #[error("zone is not owned by the caller")]
    NotOwner,

    #[error("zone is locked by a concurrent operation")]
    Locked,

    #[error("user ledger is busy")]
    Busy,

    #[error("username already taken: {0}")]
    UsernameTaken(String),
}

impl Error {
    /// `Locked` and `Busy` left state untouched and are safe to retry
    /// with backoff; everything else is terminal for the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Locked | Error::Busy)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
