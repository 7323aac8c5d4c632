use thiserror::Error;

/// Errors surfaced by the stream session and its collaborators
#[derive(Debug, Error)]
pub enum StreamError {
    /// The debug stream protocol is text-only; a binary frame is a contract
    /// breach, not a recoverable condition
    #[error("unrecognized debug stream payload: {0} byte binary frame")]
    UnexpectedBinary(usize),

    /// Transport-level failure during a recent-log request
    #[error("backfill request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The recent-log endpoint answered with a non-success status
    #[error("backfill request returned status {0}")]
    BackfillStatus(u16),
}
