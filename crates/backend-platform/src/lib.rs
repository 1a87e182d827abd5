//! Platform seam the client runtime is built against.
//!
//! Everything the product persists or authenticates lives behind two
//! object-safe traits: [`AuthApi`] for sessions and [`StoreApi`] for the
//! named collections with their change feeds. The runtime receives both as
//! trait objects at construction, so production adapters and the bundled
//! [`MemoryPlatform`] are interchangeable.

/// Auth/store traits and the platform error type.
pub mod api;
/// Self-contained in-memory implementation of both traits.
pub mod memory;
/// Tables, typed rows, filters, queries, patches and change events.
pub mod query;

pub use api::{AuthApi, AuthSession, PlatformError, StoreApi};
pub use memory::MemoryPlatform;
pub use query::{Filter, OrderBy, Patch, Row, SelectQuery, StoreChange, StoreEvent, Table};
