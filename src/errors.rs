//! Error taxonomy for the process-emulation engine.
//!
//! The kinds mirror the original tool's exception-based control flow
//! (layer-lookup failures, malformed scripts, invalid arguments) but are
//! modelled as explicit result variants instead, per the engine's design
//! notes on replacing exceptions at the core boundary.

use thiserror::Error;

/// All errors the core itself can raise.
///
/// `Io` is never constructed by the core (all persistence is delegated to
/// an output collaborator) but is kept as a variant so collaborator code
/// sharing this error type has somewhere to report into.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid script arguments: unknown `mode`, mutually exclusive
    /// `on`/`into`+`through`, missing required `into` in `etch` or
    /// `planarize`, non-`MaterialRegion` where one is required, or a
    /// color/transparency value outside `[0, 1]`.
    #[error("configuration error: {0}")]
    Config(String),

    /// A layer specifier string was malformed and strict resolution was
    /// requested.
    #[error("failed to parse layer spec {spec:?}: {reason}")]
    Parse { spec: String, reason: String },

    /// A geometric precondition was violated: self-intersecting input, or
    /// a sizing operation that would eliminate all area when that is not
    /// permitted.
    #[error("geometry error: {0}")]
    Geom(String),

    /// An uncaught failure during process-script evaluation.
    #[error("script error: {0}")]
    Script(String),

    /// Reported by an output collaborator; never raised by the core.
    #[error("I/O error: {0}")]
    Io(String),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Config(msg.into())
    }

    pub fn geom(msg: impl Into<String>) -> Self {
        EngineError::Geom(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
