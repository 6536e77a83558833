//! Error taxonomy for model construction, validation, and analysis.
//!
//! Every user-surfaced error carries an optional source location pointing at
//! the input document element the error originates from. Internal logic
//! errors signal bugs and are never recoverable.

use std::fmt;

use thiserror::Error;

/// Location of the offending element in an input document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Input file name.
    pub file: String,
    /// 1-based line number.
    pub line: u64,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// The kind of failure, one variant per error class.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Input or report I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Ill-typed value at an API boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Internal precondition violated; indicates a bug, not bad input.
    #[error("logic error: {0}")]
    Logic(String),
    /// Operation invalid for this variant or state.
    #[error("illegal operation: {0}")]
    IllegalOperation(String),
    /// Inconsistent analysis settings.
    #[error("settings error: {0}")]
    Settings(String),
    /// Model-level rule violation.
    #[error("validation error: {0}")]
    Validation(String),
    /// Duplicate registration of the same (scope, id).
    #[error("redefinition of element '{0}'")]
    Redefinition(String),
    /// The same event repeated in one formula.
    #[error("duplicate argument '{0}'")]
    DuplicateArgument(String),
    /// A reference that resolves to nothing.
    #[error("undefined element '{0}'")]
    UndefinedElement(String),
    /// A cycle in the gate graph or the parameter graph.
    #[error("cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    /// Malformed input document.
    #[error("parse error: {0}")]
    Parse(String),
}

/// An error together with where in the input it was raised.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    location: Option<SourceLocation>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    /// Attaches a source location, keeping an already present one.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location.get_or_insert(location);
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}", location, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_is_prefixed() {
        let err = Error::new(ErrorKind::Validation("probability out of range".into()))
            .with_location(SourceLocation {
                file: "plant.xml".into(),
                line: 42,
            });
        assert_eq!(
            err.to_string(),
            "plant.xml:42: validation error: probability out of range"
        );
    }

    #[test]
    fn first_location_wins() {
        let err = Error::new(ErrorKind::UndefinedElement("pump".into()))
            .with_location(SourceLocation {
                file: "a.xml".into(),
                line: 1,
            })
            .with_location(SourceLocation {
                file: "b.xml".into(),
                line: 2,
            });
        assert_eq!(err.location().unwrap().file, "a.xml");
    }

    #[test]
    fn cycle_message_names_the_cycle() {
        let err = Error::new(ErrorKind::Cycle(vec!["a".into(), "b".into(), "a".into()]));
        assert!(err.to_string().contains("a -> b -> a"));
    }
}
