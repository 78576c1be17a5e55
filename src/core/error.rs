//! Purpose: Define the error type shared by loaders, cache, recorder and transport.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: One struct with builder methods; kinds drive exit codes.
//! Invariants: Exit code mapping is stable per kind.

use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    PathNotFound,
    UnsupportedFormat,
    MalformedDataset,
    ShapeMismatch,
    IndexOutOfRange,
    EmptyDataset,
    InvalidShape,
    InvalidEpisodeIndex,
    NotLoaded,
    InvalidPose,
    InvalidFrame,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// I/O failure on `path`, keeping the OS error as the source.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io)
            .with_message(err.to_string())
            .with_path(path)
            .with_source(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::PathNotFound => 3,
        ErrorKind::UnsupportedFormat => 4,
        ErrorKind::MalformedDataset
        | ErrorKind::ShapeMismatch
        | ErrorKind::IndexOutOfRange
        | ErrorKind::EmptyDataset
        | ErrorKind::InvalidShape => 5,
        ErrorKind::InvalidEpisodeIndex | ErrorKind::InvalidPose | ErrorKind::InvalidFrame => 6,
        ErrorKind::NotLoaded => 7,
        ErrorKind::Io => 8,
    }
}
