use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    InvalidArgument,
    InvalidOperation,
    Opening,
    Version,
    Corrupt,
    Lock,
    Unimplemented,
    Modified,
    DatabaseClosed,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context.into())
    }

    pub fn invalid_argument(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, context.into())
    }

    pub fn invalid_operation(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidOperation, context.into())
    }

    pub fn unimplemented(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Unimplemented, context.into())
    }

    pub fn corrupt(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Corrupt, context.into())
    }

    pub fn closed() -> Self {
        Error::new(ErrorKind::DatabaseClosed, "Database has been closed".to_string())
    }

    /// Prefix the context with the shard that produced the error.
    /// The kind is left untouched so callers can still match on it.
    pub fn in_shard(mut self, index: usize) -> Self {
        self.context = format!("shard {}: {}", index, self.context);
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: format!("Failed to persist file: {}", err.error),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
