//! Hierarchical page storage for Folio.
//!
//! [`PageStorage`] implements [`RowStorage`](folio_store::RowStorage) over a
//! tree of folders. Folder names carry the manual order (`03.about`), file
//! names carry the variant (`item.fr.md`), and every file is a TOML
//! frontmatter header followed by a markdown body.

pub mod file;
pub mod relocate;
pub mod storage;

pub use file::{decode, encode, split_frontmatter, BODY_FIELD};
pub use storage::PageStorage;
