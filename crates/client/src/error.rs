use thiserror::Error;

/// Why a currency change did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("a currency change is already in progress")]
    Busy,
    /// Server rejection, network failure, or a malformed response.
    #[error("currency change failed: {message}")]
    Rejected { message: String },
}
