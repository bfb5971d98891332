//! libSQL-backed profile and decision stores.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Decision, DecisionStore, ProfileStore, SwipeAction};
