//! # strata-core: Repository Contracts
//!
//! Pure types shared by every generic repository. Nothing in this crate
//! touches a database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Strata Data Flow                                 │
//! │                                                                         │
//! │  Application code                                                      │
//! │       │  repo.find(&[&equal("name", "a")])                              │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ strata-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────────┐   ┌───────────────┐   ┌─────────────┐        │   │
//! │  │   │    value    │   │ specification │   │    model    │        │   │
//! │  │   │   Value     │   │ Specification │   │  Model<E>   │        │   │
//! │  │   │             │   │ Filter        │   │             │        │   │
//! │  │   └─────────────┘   └───────────────┘   └─────────────┘        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  strata-db (Repository, query builder, SQLite)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`value`] - Bound parameter values
//! - [`specification`] - Composable query predicates
//! - [`model`] - Model ↔ entity mapper contract
//! - [`error`] - Specification errors
//!
//! ## Example
//!
//! ```rust
//! use strata_core::specification::{equal, greater_than, Filter, Specification};
//!
//! let adults = greater_than("age", 17);
//! let named = equal("name", "ada");
//!
//! let mut filter = Filter::default();
//! filter.push(&adults).unwrap();
//! filter.push(&named).unwrap();
//!
//! assert_eq!(filter.clause().as_deref(), Some("(age > ?) AND (name = ?)"));
//! assert_eq!(filter.values().len(), 2);
//! ```

pub mod error;
pub mod model;
pub mod specification;
pub mod value;

pub use error::{CoreError, CoreResult};
pub use model::Model;
pub use specification::{Condition, Filter, Specification};
pub use value::Value;
