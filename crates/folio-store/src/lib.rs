//! Row storage contract for Folio content storage.
//!
//! A row storage persists [`Row`](folio_types::Row) payloads under string
//! keys and reports which keys exist together with their modification
//! timestamps. The coordinator in `folio-flex` talks to every backend
//! through the [`RowStorage`] trait.
//!
//! # Storage Backends
//!
//! - [`InMemoryRowStorage`] -- `BTreeMap`-based storage for tests and embedding
//! - `PageStorage` (in `folio-pages`) -- hierarchical folders of markdown files
//!
//! # Design Rules
//!
//! 1. Batch operations degrade per entry; only relocation failures and
//!    unsupported operations abort a call.
//! 2. Side-channel metadata rides next to the payload and is never persisted.
//! 3. There is no locking: one writer per key is assumed.

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

pub use config::{PathResolver, RootResolver, StorageOptions};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryRowStorage;
pub use traits::{ExistingKeys, KeyEntry, ReadRows, RowResults, RowStorage};
