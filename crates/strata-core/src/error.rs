//! # Error Types
//!
//! Errors raised before any SQL is generated.
//!
//! ```text
//! Specification ──► Filter::push ──► CoreError ──► DbError::InvalidSpecification
//! ```

use thiserror::Error;

/// Errors from building query predicates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A condition's `?` placeholders don't line up with its bound values.
    ///
    /// ## When This Occurs
    /// - `Condition::new("a = ? AND b = ?", [1])`
    /// - A hand-written `Specification` returning too many values
    #[error("Condition '{expression}' has {placeholders} placeholders but {values} values")]
    PlaceholderMismatch {
        expression: String,
        placeholders: usize,
        values: usize,
    },

    /// A condition expression is empty.
    #[error("Condition expression is empty")]
    EmptyExpression,
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
