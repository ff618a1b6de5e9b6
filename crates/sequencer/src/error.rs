//! Sequencer error types.

use thiserror::Error;

/// Errors that can occur when submitting to the sequencer.
#[derive(Debug, Error)]
pub enum SequencerError {
    /// The sequencer has shut down and accepts no more requests.
    #[error("Sequencer is closed")]
    Closed,
}

/// Convenience type alias for sequencer results.
pub type Result<T> = std::result::Result<T, SequencerError>;
