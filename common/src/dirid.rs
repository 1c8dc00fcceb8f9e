use std::path::Path;

use sha1::{Digest, Sha1};

/// the stable identifier for a configured media directory: sha1 hex of its
/// canonicalized absolute path, or of the path as given when canonicalization
/// fails (directory not yet present on disk)
pub fn dir_id(path: &Path) -> String {
    let key = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned();

    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_for_same_path() {
        let p = Path::new("/tmp/does-not-exist-xyz");
        assert_eq!(dir_id(p), dir_id(p));
    }

    #[test]
    fn differs_across_paths() {
        assert_ne!(
            dir_id(Path::new("/tmp/a")),
            dir_id(Path::new("/tmp/b"))
        );
    }
}
