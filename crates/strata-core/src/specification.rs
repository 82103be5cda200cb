//! # Specifications
//!
//! Composable query predicates.
//!
//! ## How Specifications Fold Into a Query
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  repo.find(&[&greater_than("age", 17), &equal("name", "ada")])          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Filter::push (left to right)                                          │
//! │       │                                                                 │
//! │       │   clauses: ["age > ?", "name = ?"]                              │
//! │       │   values:  [17, "ada"]                                          │
//! │       ▼                                                                 │
//! │  WHERE (age > ?) AND (name = ?)        ← bound: 17, 'ada'              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Field names are written into the SQL as given; only values are bound.

use crate::error::{CoreError, CoreResult};
use crate::value::Value;

/// A query predicate: a condition with `?` placeholders plus the values that
/// fill them, in order.
///
/// Implementations must be stateless; the repository may call them on any
/// task, any number of times.
pub trait Specification: Send + Sync {
    /// The condition expression, e.g. `"age > ?"`.
    fn query(&self) -> String;

    /// Values bound to the placeholders of [`query`](Specification::query).
    fn values(&self) -> Vec<Value>;
}

impl<S: Specification + ?Sized> Specification for &S {
    fn query(&self) -> String {
        (**self).query()
    }

    fn values(&self) -> Vec<Value> {
        (**self).values()
    }
}

impl<S: Specification + ?Sized> Specification for Box<S> {
    fn query(&self) -> String {
        (**self).query()
    }

    fn values(&self) -> Vec<Value> {
        (**self).values()
    }
}

// =============================================================================
// Condition
// =============================================================================

/// The stock [`Specification`]: an expression and its values.
///
/// ## Example
/// ```rust
/// use strata_core::specification::{equal, is_null, Specification};
///
/// let spec = equal("status", "open").or(is_null("closed_at")).not();
/// assert_eq!(spec.query(), "NOT ((status = ?) OR (closed_at IS NULL))");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    expression: String,
    values: Vec<Value>,
}

impl Condition {
    /// Creates a condition from raw SQL and its bound values.
    pub fn new(expression: impl Into<String>, values: Vec<Value>) -> Self {
        Condition {
            expression: expression.into(),
            values,
        }
    }

    /// Creates a condition with no bound values.
    pub fn expr(expression: impl Into<String>) -> Self {
        Condition::new(expression, Vec::new())
    }

    /// Both conditions must hold.
    pub fn and(self, other: impl Specification) -> Self {
        self.join("AND", &other)
    }

    /// Either condition holds.
    pub fn or(self, other: impl Specification) -> Self {
        self.join("OR", &other)
    }

    /// Negates the condition.
    pub fn not(self) -> Self {
        Condition {
            expression: format!("NOT ({})", self.expression),
            values: self.values,
        }
    }

    fn join(mut self, operator: &str, other: &dyn Specification) -> Self {
        self.expression = format!("({}) {} ({})", self.expression, operator, other.query());
        self.values.extend(other.values());
        self
    }
}

impl Specification for Condition {
    fn query(&self) -> String {
        self.expression.clone()
    }

    fn values(&self) -> Vec<Value> {
        self.values.clone()
    }
}

// =============================================================================
// Builders
// =============================================================================

fn compare(field: &str, operator: &str, value: Value) -> Condition {
    Condition::new(format!("{} {} ?", field, operator), vec![value])
}

/// `field = ?`
pub fn equal(field: &str, value: impl Into<Value>) -> Condition {
    compare(field, "=", value.into())
}

/// `field <> ?`
pub fn not_equal(field: &str, value: impl Into<Value>) -> Condition {
    compare(field, "<>", value.into())
}

/// `field > ?`
pub fn greater_than(field: &str, value: impl Into<Value>) -> Condition {
    compare(field, ">", value.into())
}

/// `field >= ?`
pub fn greater_or_equal(field: &str, value: impl Into<Value>) -> Condition {
    compare(field, ">=", value.into())
}

/// `field < ?`
pub fn less_than(field: &str, value: impl Into<Value>) -> Condition {
    compare(field, "<", value.into())
}

/// `field <= ?`
pub fn less_or_equal(field: &str, value: impl Into<Value>) -> Condition {
    compare(field, "<=", value.into())
}

/// `field LIKE ?`
pub fn like(field: &str, pattern: impl Into<Value>) -> Condition {
    compare(field, "LIKE", pattern.into())
}

/// `field IN (?, ?, ...)`.
///
/// An empty list matches no rows.
pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Condition {
    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    if values.is_empty() {
        return Condition::expr("1 = 0");
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    Condition::new(format!("{} IN ({})", field, placeholders), values)
}

/// `field IS NULL`
pub fn is_null(field: &str) -> Condition {
    Condition::expr(format!("{} IS NULL", field))
}

/// `field IS NOT NULL`
pub fn is_not_null(field: &str) -> Condition {
    Condition::expr(format!("{} IS NOT NULL", field))
}

// =============================================================================
// Filter
// =============================================================================

/// The AND-fold of zero or more specifications.
///
/// Clauses keep the order they were pushed in, and so do their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Filter {
    /// Folds a slice of specifications left to right.
    pub fn from_specifications(specifications: &[&dyn Specification]) -> CoreResult<Self> {
        let mut filter = Filter::default();
        for spec in specifications {
            filter.push(*spec)?;
        }
        Ok(filter)
    }

    /// ANDs one more specification onto the filter.
    ///
    /// ## Errors
    /// * `CoreError::EmptyExpression` - blank condition
    /// * `CoreError::PlaceholderMismatch` - `?` count differs from value count
    pub fn push(&mut self, spec: &dyn Specification) -> CoreResult<()> {
        let expression = spec.query();
        if expression.trim().is_empty() {
            return Err(CoreError::EmptyExpression);
        }

        let values = spec.values();
        let placeholders = count_placeholders(&expression);
        if placeholders != values.len() {
            return Err(CoreError::PlaceholderMismatch {
                expression,
                placeholders,
                values: values.len(),
            });
        }

        self.clauses.push(expression);
        self.values.extend(values);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The combined condition, or `None` when nothing was pushed.
    pub fn clause(&self) -> Option<String> {
        if self.clauses.is_empty() {
            return None;
        }
        Some(
            self.clauses
                .iter()
                .map(|c| format!("({})", c))
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Counts `?` placeholders outside string literals, quoted identifiers and
/// comments.
fn count_placeholders(expression: &str) -> usize {
    let mut count = 0;
    let mut chars = expression.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                // A doubled quote inside the span reopens it straight away.
                for inner in chars.by_ref() {
                    if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = ' ';
                for inner in chars.by_ref() {
                    if previous == '*' && inner == '/' {
                        break;
                    }
                    previous = inner;
                }
            }
            '?' => count += 1,
            _ => {}
        }
    }
    count
}
