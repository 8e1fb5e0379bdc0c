//! Error types for the persistence engine
//!
//! Every fallible operation returns [`Result`]. Failures fall into three
//! groups:
//!
//! - malformed required data (missing field, non-finite value, column type
//!   mismatch, corrupt container), always carrying the record and field name
//! - I/O failures, wrapping the OS error together with the operation and path
//! - state/parameter misuse by the caller
//!
//! Missing *optional* data is never an error; readers return `Ok(None)`.
//!
//! Errors accumulate a call path as they propagate: [`ResultExt::context`]
//! wraps an error in [`Error::Context`] naming the operation that was running,
//! and [`Error::call_path`] recovers the chain outermost-first.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for persistence operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the persistence engine
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error with the operation and path that failed
    #[error("I/O error during {op} on '{}': {source}", path.display())]
    Io {
        /// Operation being attempted (open, rename, chmod, mmap, ...)
        op: &'static str,
        /// Path the operation targeted
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// I/O error without path information
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// A required keyword or column is absent
    #[error("missing required field {field} in record {record}")]
    MissingField {
        /// Record name
        record: String,
        /// Keyword or column name
        field: String,
    },

    /// A floating value is NaN or infinite
    #[error("non-finite value in {record}.{field} at index {index}")]
    NonFinite {
        /// Record name
        record: String,
        /// Keyword or column name
        field: String,
        /// Element index within the field
        index: usize,
    },

    /// A keyword or column is stored with an unexpected type
    #[error("type mismatch for {record}.{field}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Record name
        record: String,
        /// Keyword or column name
        field: String,
        /// Expected type name
        expected: &'static str,
        /// Type name found in the container
        found: String,
    },

    /// A keyword holds a value outside its enumeration
    #[error("invalid value '{value}' for {record}.{field}")]
    InvalidValue {
        /// Record name
        record: String,
        /// Keyword or column name
        field: String,
        /// Offending value
        value: String,
    },

    /// Container bytes failed validation
    #[error("corrupt container: {0}")]
    Corrupt(String),

    /// Caller passed an invalid argument
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Object is not in a state that permits the operation
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A deferred value's loader already ran (and failed)
    #[error("loader already consumed for {0}")]
    LoaderConsumed(String),

    /// The swap arena could not service a request
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// A termination signal arrived while the operation was running
    #[error("interrupted by termination signal")]
    Interrupted,

    /// Container template could not be read or parsed
    #[error("template error: {0}")]
    Template(String),

    /// Configuration could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// An inner error with the name of the operation that was running
    #[error("{context}: {source}")]
    Context {
        /// Operation name
        context: String,
        /// Inner error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// I/O error for an operation on a path
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Required field is absent
    pub fn missing(record: impl Into<String>, field: impl Into<String>) -> Self {
        Error::MissingField {
            record: record.into(),
            field: field.into(),
        }
    }

    /// Non-finite value at `index` of a field
    pub fn non_finite(record: impl Into<String>, field: impl Into<String>, index: usize) -> Self {
        Error::NonFinite {
            record: record.into(),
            field: field.into(),
            index,
        }
    }

    /// Field stored with the wrong type
    pub fn type_mismatch(
        record: impl Into<String>,
        field: impl Into<String>,
        expected: &'static str,
        found: impl Into<String>,
    ) -> Self {
        Error::TypeMismatch {
            record: record.into(),
            field: field.into(),
            expected,
            found: found.into(),
        }
    }

    /// Field holds a value outside its enumeration
    pub fn invalid_value(
        record: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Error::InvalidValue {
            record: record.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Corrupt container bytes
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }

    /// Invalid caller argument
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParam(msg.into())
    }

    /// Invalid object state
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Wrap this error with the name of an enclosing operation
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Operations that led to this error, outermost first
    pub fn call_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = self;
        while let Error::Context { context, source } = current {
            path.push(context.as_str());
            current = source;
        }
        path
    }

    /// The innermost error, with all context layers removed
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Context { source, .. } = current {
            current = source;
        }
        current
    }
}

/// Adds call-path context to results
pub trait ResultExt<T> {
    /// Wrap an error with a fixed operation name
    fn context(self, context: &str) -> Result<T>;

    /// Wrap an error with a lazily formatted operation name
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}
