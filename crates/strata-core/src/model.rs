//! # Model ↔ Entity Mapping
//!
//! The one extension point for a new storage/domain pairing.
//!
//! ```text
//! ┌──────────────────┐   from_entity(&E)   ┌──────────────────┐
//! │  Entity (E)      │ ──────────────────► │  Model (M)       │
//! │  domain shape    │                     │  storage shape   │
//! │                  │ ◄────────────────── │                  │
//! └──────────────────┘   to_entity(&self)  └──────────────────┘
//! ```
//!
//! The conversion is lossless in both directions, except for fields the
//! backend manages (generated ids, timestamps) which only flow model → entity.

/// A storage record that converts to and from its domain entity `E`.
///
/// Each model type pairs with exactly one entity type per repository; the
/// pairing is fixed by the repository's type parameters.
///
/// ## Example
/// ```rust
/// use strata_core::Model;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Book { id: i64, title: String }
///
/// #[derive(Debug, Default)]
/// struct BookRow { id: i64, title: String }
///
/// impl Model<Book> for BookRow {
///     fn to_entity(&self) -> Book {
///         Book { id: self.id, title: self.title.clone() }
///     }
///     fn from_entity(book: &Book) -> Self {
///         BookRow { id: book.id, title: book.title.clone() }
///     }
/// }
///
/// let book = Book { id: 1, title: "Dune".into() };
/// assert_eq!(BookRow::from_entity(&book).to_entity(), book);
/// ```
pub trait Model<E>: Sized {
    /// Builds the domain entity from this record.
    fn to_entity(&self) -> E;

    /// Builds a storage record from a domain entity.
    fn from_entity(entity: &E) -> Self;
}
