//! Error taxonomy (spec §7).
//!
//! `EngineError` covers the small set of sentinel conditions callers
//! need to match on programmatically (cancellation, the semantic
//! pipeline failures). Everything else — filesystem I/O, blob store
//! failures — flows through as a plain `anyhow::Error` the way
//! `backup::read_chunk` and `backup::checksum_reader` propagate errors
//! in the teacher crate.

use thiserror::Error;

/// Sentinel and semantic errors raised by the graph engines and the
/// backup pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The enclosing context was cancelled (deadline or explicit cancel).
    ///
    /// Per spec §5/§7, a worker woken after the true first error has
    /// already been recorded returns this sentinel instead of racing
    /// to report its own observation; the top-level join discards it
    /// in favor of the recorded first error.
    #[error("operation cancelled")]
    Cancelled,

    /// `Pipeline::save` drained the DAG visitor's output but found no
    /// node without a parent.
    #[error("no root node found after processing")]
    NoRoot,

    /// `Pipeline::save` found more than one parentless node.
    #[error("found {0} parentless nodes, expected exactly 1")]
    MultipleRoots(usize),

    /// The root node's score list did not have exactly one element.
    #[error("root node has {0} scores, expected exactly 1")]
    WrongRootArity(usize),

    /// A password-protected registry marker failed to decrypt/authenticate.
    #[error("incorrect password")]
    IncorrectPassword,

    /// A registry object was created twice under the same key.
    #[error("job log entry already exists: {0}")]
    DuplicateJob(String),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}
