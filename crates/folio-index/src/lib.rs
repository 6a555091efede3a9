//! Node metadata and index building for Folio page trees.
//!
//! Every folder of a page tree is a node. [`MetaIndexer::compute_meta`]
//! scans one folder into a checksummed [`Meta`](folio_types::Meta);
//! [`MetaIndexer::build_index`] walks the whole tree into a [`MetaIndex`]
//! and propagates modification times from modular (`_`-prefixed) children
//! into their parents.
//!
//! # Key Types
//!
//! - [`MetaIndexer`] -- scans nodes and builds the index
//! - [`MetaIndex`] -- folder key to meta, naturally sorted
//! - [`MetaCache`] -- scanned metas with explicit invalidation
//! - [`Reload`] -- whether a lookup may use the cache

pub mod cache;
pub mod error;
pub mod indexer;
pub mod scan;

pub use cache::{MetaCache, Reload};
pub use error::{IndexError, IndexResult};
pub use indexer::{object_key, MetaIndex, MetaIndexer, NodePath};
pub use scan::{parse_variant, scan_folder, FolderScan};
