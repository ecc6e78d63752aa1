//! Structured error types for the report engine.
//!
//! Two classes cover the real failure sources: configuration errors (bad
//! table markup, bad row sources, impossible column layouts) and resource
//! errors (unreadable input, unwritable output). Configuration errors are
//! fatal and raised at the point of detection; there is no retryable class.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReportError>;

/// The unified error type returned by all public API functions.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Table markup contains no `<table>` element.
    #[error("no table found in the markup")]
    MissingTable,

    /// A row source was configured but the markup has no row with
    /// `id="template"`.
    #[error("cannot find required 'template' row")]
    MissingTemplateRow,

    /// A row-source field name has no matching slot in the template row.
    #[error("id '{0}' not in template row")]
    UnknownField(String),

    /// The table header does not fit within one row at the configured
    /// column count.
    #[error("not enough room to place the table header in {0} columns")]
    InsufficientColumns(usize),

    /// `Report::run` was called with no sections.
    #[error("section list is empty")]
    EmptySections,

    /// A resolved row source held fewer than two rows (field-name header
    /// plus at least one data row).
    #[error("row count must be 2 or more, got {0}")]
    NotEnoughRows(usize),

    /// A row-source factory produced something that is not a row sequence.
    #[error("bad row source: {0}")]
    BadRowSource(String),

    /// Block markup failed to parse.
    #[error("markup error: {0}")]
    Markup(String),

    /// A font could not be loaded or parsed.
    #[error("font error: {0}")]
    Font(String),

    /// An image could not be loaded or decoded.
    #[error("image error: {0}")]
    Image(String),

    /// I/O failure reading a resource or writing the output document.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReportError {
    /// True for errors caused by report configuration rather than the
    /// environment. These are never worth retrying.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, ReportError::Io(_))
    }
}
