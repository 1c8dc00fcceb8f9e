use std::path::PathBuf;

use sha1::{Digest, Sha1};

use crate::media::ThumbFormat;

fn sha1_hex(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// content-addressed path for an image thumbnail: changing any input
/// parameter yields a new cache entry, old entries remain until cleaned
pub fn image_thumb_path(
    data_dir: &std::path::Path,
    dir_id: &str,
    rel_path: &str,
    width: u32,
    format: ThumbFormat,
) -> PathBuf {
    let key = format!("{dir_id}|{rel_path}|{width}|{}", format.ext());
    data_dir
        .join(api::THUMB_DIR)
        .join(format!("{}.{}", sha1_hex(&key), format.ext()))
}

/// content-addressed path for a video thumbnail
pub fn video_thumb_path(
    data_dir: &std::path::Path,
    dir_id: &str,
    rel_path: &str,
    time_sec: f64,
    width: u32,
    format: ThumbFormat,
) -> PathBuf {
    let key = format!(
        "{dir_id}|{rel_path}|{time_sec}|{width}|{}",
        format.ext()
    );
    data_dir
        .join(api::VTHUMB_DIR)
        .join(format!("{}.{}", sha1_hex(&key), format.ext()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn path_is_stable_for_identical_inputs() {
        let a = image_thumb_path(Path::new("/data"), "d1", "a/b.jpg", 400, ThumbFormat::Webp);
        let b = image_thumb_path(Path::new("/data"), "d1", "a/b.jpg", 400, ThumbFormat::Webp);
        assert_eq!(a, b);
    }

    #[test]
    fn path_changes_with_any_parameter() {
        let base = image_thumb_path(Path::new("/data"), "d1", "a/b.jpg", 400, ThumbFormat::Webp);
        let wider = image_thumb_path(Path::new("/data"), "d1", "a/b.jpg", 800, ThumbFormat::Webp);
        assert_ne!(base, wider);
    }
}
