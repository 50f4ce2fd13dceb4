use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use tracing_error::{SpanTrace, SpanTraceStatus};

/* 📖 # Why a custom error type and not use anyhow/eyre/thiserror etc?

- Better control over error handling
- No dependencies to compile and integrate
- More transparency into error handling logic
- The HTTP facade needs to pattern match on upstream failures to build its 400 message
 */

/// Error variants that can occur in type registry operations.
/// Each variant represents a specific error category with its associated context.
#[derive(Debug)]
pub enum ErrorKind {
    /// File system operation failed
    FileError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The remote format source answered with a status other than 200
    UpstreamStatus { url: String, status: u16 },

    /// The remote format source could not be reached or its body could not be used
    UpstreamTransport { url: String, message: String },

    /// A configuration value is missing or invalid
    Config { key: String, message: String },

    /// Catch-all for other errors with a message
    Message { message: String },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::FileError { path, source } => {
                write!(f, "File error at {}: {}", path.display(), source)
            }
            ErrorKind::UpstreamStatus { url, status } => {
                write!(f, "Response status code '{}' from '{}'", status, url)
            }
            ErrorKind::UpstreamTransport { url, message } => {
                write!(f, "Request to '{}' failed: {}", url, message)
            }
            ErrorKind::Config { key, message } => {
                write!(f, "Invalid configuration for '{}': {}", key, message)
            }
            ErrorKind::Message { message } => write!(f, "{}", message),
        }
    }
}

/* 📖 # Why separate ErrorKind and TypeRegError?
ErrorKind holds the structural variant, TypeRegError adds the runtime context that
accumulates while the error propagates: context strings and the span trace of where
it was created. Callers match on `kind()`, everything else is
for humans reading logs.
*/

/// Error type wrapping an [`ErrorKind`] with context and a span trace.
pub struct TypeRegError {
    kind: ErrorKind,
    context: Vec<String>,
    span_trace: SpanTrace,
}

impl TypeRegError {
    /// Creates a new error from an ErrorKind, capturing the current span trace.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: vec![],
            span_trace: SpanTrace::capture(),
        }
    }

    /// Creates a catch-all message error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Message {
            message: message.into(),
        })
    }

    /// Attaches context to an error.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Attaches context using lazy evaluation.
    pub fn with_context<F>(mut self, f: F) -> Self
    where
        F: FnOnce() -> String,
    {
        self.context.push(f());
        self
    }

    /// Returns a reference to the underlying ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the attached context strings, oldest first.
    pub fn get_context(&self) -> &[String] {
        &self.context
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind)?;
        let total = self.context.len();
        for (index, ctx) in self.context.iter().enumerate() {
            let branch = if index + 1 == total { "└─" } else { "├─" };
            writeln!(f, "{} {}", branch, ctx)?;
        }
        Ok(())
    }
}

impl From<ErrorKind> for TypeRegError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl StdError for TypeRegError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            ErrorKind::FileError { source, .. } => Some(source),
            ErrorKind::UpstreamStatus { .. }
            | ErrorKind::UpstreamTransport { .. }
            | ErrorKind::Config { .. }
            | ErrorKind::Message { .. } => None,
        }
    }
}

impl fmt::Display for TypeRegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ctx in &self.context {
            write!(f, "{}: ", ctx)?;
        }
        write!(f, "{}", self.kind)
    }
}

impl fmt::Debug for TypeRegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f)?;
        if self.span_trace.status() == SpanTraceStatus::CAPTURED {
            writeln!(f, "Trace: {}", self.span_trace)?;
        }
        Ok(())
    }
}

/* 📖 # Why use Box<TypeRegError> in the result type?

Boxing the error reduces the size of the result type, making it more efficient to return in the common case.

*/

/// Standard result type for type registry operations.
pub type TypeRegResult<T> = std::result::Result<T, Box<TypeRegError>>;

/// Extension trait for attaching context to Results.
pub trait ResultExt<T> {
    /// Attaches context to an error. Eager evaluation.
    fn context(self, context: impl Into<String>) -> TypeRegResult<T>;

    /// Attaches context using lazy evaluation.
    /// Prefer this to avoid string formatting in the success path.
    fn with_context<F>(self, f: F) -> TypeRegResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for TypeRegResult<T> {
    fn context(self, context: impl Into<String>) -> TypeRegResult<T> {
        self.map_err(|err| Box::new((*err).context(context)))
    }

    fn with_context<F>(self, f: F) -> TypeRegResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| Box::new((*err).with_context(f)))
    }
}

/// Builds a boxed message error from a format string.
#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        Box::new($crate::error::TypeRegError::message(format!($($arg)*)))
    };
}

/// Returns early with a boxed message error built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::err!($($arg)*))
    };
}
