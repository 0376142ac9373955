use std::env;
use std::path::{Component, Path, PathBuf};

/// Absolute, symlink-resolved form of a path that may not exist yet.
///
/// The longest existing ancestor is canonicalized and the remaining
/// components are appended after lexical `.`/`..` folding.
pub fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map(|cwd| cwd.join(path)).unwrap_or_else(|_| path.to_path_buf())
    };
    let normalized = normalize(&absolute);

    let mut existing = normalized.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            for part in rest.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` equals `ancestor` or lies somewhere below it.
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    resolve(path).starts_with(resolve(ancestor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_nested_and_equal() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("photos");
        std::fs::create_dir_all(root.join("2023")).unwrap();

        assert!(is_within(&root, &root));
        assert!(is_within(&root.join("2023"), &root));
        assert!(is_within(&root.join("not-yet").join("deeper"), &root));
        assert!(is_within(&root.join("2023").join(".."), &root));
        assert!(!is_within(&dir.path().join("photos-out"), &root));
        assert!(!is_within(&root.join("..").join("elsewhere"), &root));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_destination_is_detected() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("photos");
        std::fs::create_dir_all(&root).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&root, &link).unwrap();
        assert!(is_within(&link.join("out"), &root));
    }
}
