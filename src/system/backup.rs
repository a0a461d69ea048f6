//! Timestamped backups taken before any configuration file is overwritten.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// `<file>.backup.<YYYYmmdd_HHMMSS>`, with `.N` appended if that name is taken.
pub fn backup_path(path: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let base = format!("{}.backup.{}", path.display(), stamp);

    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}.{}", base, n));
        n += 1;
    }
    candidate
}

/// Copy `path` to a fresh timestamped sibling. Returns `None` if `path` doesn't exist.
pub fn backup(path: &Path) -> Result<Option<PathBuf>> {
    if !path.is_file() {
        return Ok(None);
    }
    let target = backup_path(path);
    fs::copy(path, &target)?;
    tracing::debug!(from = %path.display(), to = %target.display(), "backed up");
    Ok(Some(target))
}

/// Back up `path` if it exists, then replace its contents.
pub fn write_with_backup(path: &Path, contents: &str) -> Result<Option<PathBuf>> {
    let saved = backup(path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backups_of(dir: &Path, name: &str) -> Vec<PathBuf> {
        let prefix = format!("{}.backup.", name);
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect()
    }

    #[test]
    fn test_overwrite_leaves_exactly_one_matching_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("interfaces");
        fs::write(&path, "auto wlan0\niface wlan0 inet static\n").unwrap();

        let saved = write_with_backup(&path, "auto lo\n").unwrap().unwrap();

        let backups = backups_of(dir.path(), "interfaces");
        assert_eq!(backups, vec![saved.clone()]);
        assert_eq!(
            fs::read_to_string(&saved).unwrap(),
            "auto wlan0\niface wlan0 inet static\n"
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "auto lo\n");
    }

    #[test]
    fn test_new_file_has_no_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join("01-netcfg.yaml");

        assert_eq!(write_with_backup(&path, "network: {}\n").unwrap(), None);
        assert!(path.is_file());
        assert!(backups_of(&dir.path().join("sub"), "01-netcfg.yaml").is_empty());
    }

    #[test]
    fn test_same_second_backups_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.v4");
        fs::write(&path, "one").unwrap();

        let first = backup(&path).unwrap().unwrap();
        fs::write(&path, "two").unwrap();
        let second = backup(&path).unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(first).unwrap(), "one");
        assert_eq!(fs::read_to_string(second).unwrap(), "two");
    }
}
