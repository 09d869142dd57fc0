//! Error handling for the template event engine
//!
//! All fallible operations in this crate return [`Result<T>`]. The variants
//! follow the failure taxonomy of the processing core:
//!
//! - [`Error::InvalidArgument`] - caller bugs detected at the point of the call
//!   (empty names, null-valued attributes in XML mode, unquoted empty values)
//! - [`Error::Configuration`] - inconsistent dialect or engine configuration
//! - [`Error::TemplateProcessing`] - structural sequencing violations and
//!   post-condition failures found while processing a template
//! - [`Error::Parse`] - tokenizer failures while building the event stream
//! - [`Error::InvalidEvent`] - an event kind reaching a dispatch that cannot
//!   handle it
//!
//! # Usage
//!
//! ```rust,ignore
//! use thymeleaf_events::{Error, TemplateManager};
//!
//! match manager.process(template, TemplateMode::Html, context) {
//!     Ok(output) => println!("{output}"),
//!     Err(Error::TemplateProcessing { message, location }) => {
//!         eprintln!("line {:?}: {message}", location.line)
//!     }
//!     Err(err) => eprintln!("{err}"),
//! }
//! ```
//!
//! # Memory Efficiency
//!
//! Messages use `Cow<'static, str>` so that the common static messages do not
//! allocate.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// Source location attached to processing and parse errors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub template_name: Option<String>,
    pub line: Option<usize>,
    pub col: Option<usize>,
}

impl Location {
    pub fn new(template_name: Option<&str>, line: usize, col: usize) -> Self {
        Self {
            template_name: template_name.map(str::to_owned),
            line: Some(line),
            col: Some(col),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.template_name.is_none() && self.line.is_none()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        f.write_str(" (template: ")?;
        match &self.template_name {
            Some(name) => write!(f, "\"{name}\"")?,
            None => f.write_str("?")?,
        }
        if let (Some(line), Some(col)) = (self.line, self.col) {
            write!(f, " - line {line}, col {col}")?;
        }
        f.write_str(")")
    }
}

/// Error type for every operation of the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Precondition violated by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),

    /// Engine or dialect configuration is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(Cow<'static, str>),

    /// Fatal error raised while processing a template
    ///
    /// Aborts the whole render: no partial output is produced for the template
    /// invocation that raised it.
    #[error("{message}{location}")]
    TemplateProcessing {
        message: Cow<'static, str>,
        location: Location,
    },

    /// Markup could not be tokenized
    #[error("Parse error: {message}{location}")]
    Parse {
        message: Cow<'static, str>,
        location: Location,
    },

    /// An event kind reached a dispatch that does not support it
    #[error("Invalid event: {0}")]
    InvalidEvent(Cow<'static, str>),

    /// Writing output failed
    #[error("Write error: {0}")]
    Fmt(#[from] fmt::Error),

    /// JSON conversion of a context value failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_static(msg: &'static str) -> Self {
        Error::InvalidArgument(Cow::Borrowed(msg))
    }

    pub fn invalid_owned(msg: String) -> Self {
        Error::InvalidArgument(Cow::Owned(msg))
    }

    pub fn config_static(msg: &'static str) -> Self {
        Error::Configuration(Cow::Borrowed(msg))
    }

    pub fn config_owned(msg: String) -> Self {
        Error::Configuration(Cow::Owned(msg))
    }

    /// Create a processing error without location information
    pub fn processing_static(msg: &'static str) -> Self {
        Error::TemplateProcessing {
            message: Cow::Borrowed(msg),
            location: Location::default(),
        }
    }

    /// Create a processing error with a dynamic message
    pub fn processing_owned(msg: String) -> Self {
        Error::TemplateProcessing {
            message: Cow::Owned(msg),
            location: Location::default(),
        }
    }

    pub fn parse_owned(msg: String, location: Location) -> Self {
        Error::Parse {
            message: Cow::Owned(msg),
            location,
        }
    }

    pub fn invalid_event_owned(msg: String) -> Self {
        Error::InvalidEvent(Cow::Owned(msg))
    }

    /// Attach a location to a processing error that does not carry one yet
    ///
    /// Other variants are returned untouched.
    pub fn at(self, location: &Location) -> Self {
        match self {
            Error::TemplateProcessing { message, location: current } if current.is_empty() => {
                Error::TemplateProcessing {
                    message,
                    location: location.clone(),
                }
            }
            other => other,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, Error::TemplateProcessing { .. })
    }
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
