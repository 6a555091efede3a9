//! Single-level folder scans.

use std::fs::{self, Metadata};
use std::path::Path;
use std::time::UNIX_EPOCH;

use folio_store::StorageOptions;
use folio_types::{ChildMap, MarkdownMap, NaturalKey, Timestamp};

use crate::error::{IndexError, IndexResult};

/// What one folder holds, before any propagation from its children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderScan {
    pub markdown: MarkdownMap,
    pub children: ChildMap,
    /// Newest mtime among the folder's own files; `0` when there are none.
    pub storage_timestamp: Timestamp,
}

/// Split a variant file name into `(template, lang)`.
///
/// Returns `None` when `name` does not end with `ext`. The language is the
/// last dot-separated segment before the extension when it is made of word
/// characters and dashes; otherwise the whole stem is the template.
pub fn parse_variant<'a>(name: &'a str, ext: &str) -> Option<(&'a str, &'a str)> {
    let stem = name.strip_suffix(ext)?;
    if stem.is_empty() {
        return None;
    }
    match stem.rsplit_once('.') {
        Some((template, lang)) if is_lang(lang) => Some((template, lang)),
        _ => Some((stem, "")),
    }
}

fn is_lang(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Convert file metadata to a Unix timestamp in seconds.
pub fn mtime(metadata: &Metadata) -> Timestamp {
    match metadata.modified().map(|t| t.duration_since(UNIX_EPOCH)) {
        Ok(Ok(d)) => d.as_secs() as Timestamp,
        Ok(Err(before)) => -(before.duration().as_secs() as Timestamp),
        Err(_) => 0,
    }
}

/// Scan the direct entries of `path`.
///
/// Hidden entries (when enabled) and names on the ignore lists are skipped.
/// Every remaining file counts towards the storage timestamp; only files
/// with the data extension become variants.
pub fn scan_folder(path: &Path, options: &StorageOptions) -> IndexResult<FolderScan> {
    let scan_err = |source| IndexError::Scan {
        path: path.to_path_buf(),
        source,
    };
    let ext = options.data_ext();
    let mut scan = FolderScan::default();

    for entry in fs::read_dir(path).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.is_empty() || (options.ignore_hidden && name.starts_with('.')) {
            continue;
        }

        let metadata = fs::metadata(entry.path()).map_err(scan_err)?;
        if metadata.is_dir() {
            if options.is_ignored_folder(name) {
                continue;
            }
            scan.children.insert(NaturalKey::from(name), None);
        } else {
            if options.is_ignored_file(name) {
                continue;
            }
            let timestamp = mtime(&metadata);
            if let Some((template, lang)) = parse_variant(name, &ext) {
                scan.markdown
                    .entry(NaturalKey::from(lang))
                    .or_default()
                    .insert(NaturalKey::from(template), timestamp);
            }
            scan.storage_timestamp = scan.storage_timestamp.max(timestamp);
        }
    }

    Ok(scan)
}
