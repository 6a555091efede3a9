//! Folder and file relocation on disk.

use std::fs;
use std::path::Path;

use folio_store::{StoreError, StoreResult};
use walkdir::WalkDir;

/// Move `from` to `to`, creating the parent of `to` if needed.
pub fn move_folder(from: &Path, to: &Path) -> StoreResult<()> {
    ensure_parent(from, to)?;
    fs::rename(from, to).map_err(|e| StoreError::relocate(from, to, e))
}

/// Copy the folder `from` and everything below it to `to`.
pub fn copy_folder(from: &Path, to: &Path) -> StoreResult<()> {
    ensure_parent(from, to)?;
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            StoreError::relocate(path, to, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| StoreError::relocate(entry.path(), to, std::io::Error::other(e)))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| StoreError::relocate(entry.path(), &target, e))?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|e| StoreError::relocate(entry.path(), &target, e))?;
        }
    }
    Ok(())
}

/// Rename one file within the data root.
pub fn rename_file(from: &Path, to: &Path) -> StoreResult<()> {
    fs::rename(from, to).map_err(|e| StoreError::relocate(from, to, e))
}

fn ensure_parent(from: &Path, to: &Path) -> StoreResult<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::relocate(from, parent, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("_hero")).unwrap();
        fs::write(root.join("default.md"), "body").unwrap();
        fs::write(root.join("_hero/hero.md"), "hero").unwrap();
    }

    #[test]
    fn copy_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("about");
        let to = dir.path().join("company/03.about");
        populate(&from);

        copy_folder(&from, &to).unwrap();

        assert!(from.join("default.md").is_file());
        assert_eq!(fs::read_to_string(to.join("_hero/hero.md")).unwrap(), "hero");
    }

    #[test]
    fn move_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("about");
        let to = dir.path().join("nested/about");
        populate(&from);

        move_folder(&from, &to).unwrap();

        assert!(!from.exists());
        assert!(to.join("_hero/hero.md").is_file());
    }

    #[test]
    fn move_onto_file_reports_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("about");
        let to = dir.path().join("blocker");
        populate(&from);
        fs::write(&to, "not a folder").unwrap();

        match move_folder(&from, &to) {
            Err(StoreError::StorageWrite { path, target, .. }) => {
                assert_eq!(path, from);
                assert_eq!(target, Some(to));
            }
            other => panic!("expected storage write error, got {other:?}"),
        }
    }
}
