//! Error taxonomy for the bridge.
//!
//! Engine exceptions are captured at the throw site (message, stack trace and
//! script diagnostics) and carried across the boundary as [`JsException`].
//! Everything else the bridge can fail with is a [`BridgeError`] variant.

use std::fmt;

use thiserror::Error;

/// A JavaScript exception captured while it propagated out of the engine.
///
/// The stack trace is recorded at the moment the exception crossed the
/// boundary; for syntax errors the script diagnostics (resource name, line,
/// columns and the offending source line) are filled in from the compiler
/// message.
#[derive(Debug, Clone, Default)]
pub struct JsException {
    /// Stringified exception value, e.g. `Error: boom`.
    pub message: String,
    /// Engine stack trace, empty only when the engine could not produce one.
    pub trace: String,
    /// Script resource name, when the exception carries script info.
    pub resource: Option<String>,
    /// 1-based line number within the script.
    pub line: Option<u32>,
    /// 0-based column where the problem starts.
    pub start_column: Option<u32>,
    /// 0-based column just past the problem.
    pub end_column: Option<u32>,
    /// The source line the message points at.
    pub source_line: Option<String>,
}

impl fmt::Display for JsException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.trace.is_empty() {
            write!(f, "{}", self.message)?;
        } else {
            write!(f, "{}", self.trace)?;
        }
        if let (Some(resource), Some(line)) = (&self.resource, self.line) {
            write!(f, "\n    at {resource}:{line}")?;
            if let Some(col) = self.start_column {
                write!(f, ":{col}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for JsException {}

/// Everything a bridge operation can fail with.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An exception thrown by engine code.
    #[error(transparent)]
    Exception(#[from] JsException),

    /// An error raised by the host runtime.
    #[error(transparent)]
    Lua(#[from] mlua::Error),

    /// A value of this type cannot cross the runtime boundary.
    #[error("cannot pass {0} across the runtime boundary")]
    Unsupported(&'static str),

    /// The engine object behind a reference has been released or collected.
    #[error("engine reference is no longer live")]
    Released,

    /// The engine failed to allocate a value or instantiate an object.
    #[error("engine allocation failed")]
    Alloc,

    /// The host runtime that owns this bridge has been closed.
    #[error("host runtime has been closed")]
    HostGone,

    /// The target of an operation is not a context or sandbox.
    #[error("operation requires a context or sandbox reference")]
    NotAContext,

    /// Invalid `BridgeConfig`.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<BridgeError> for mlua::Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Lua(e) => e,
            other => mlua::Error::external(other),
        }
    }
}

/// Bridge result type.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
