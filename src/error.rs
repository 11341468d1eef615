use thiserror::Error;

/// Domain conditions callers are expected to branch on.
///
/// Everything else (I/O, parse, transport) travels as `anyhow::Error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanvasError {
    /// The baseline has not collected enough frames yet. Recoverable: keep feeding frames.
    #[error("baseline not ready: {collected}/{required} frames accumulated")]
    BaselineNotReady { collected: usize, required: usize },

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("frame size {actual:?} does not match expected {expected:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}
