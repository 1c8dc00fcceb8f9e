use serde::{Deserialize, Serialize};

use crate::dir::DirId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
    /// the sole canonical non-media value on the wire; `"other"` is never emitted
    File,
}

impl MediaKind {
    pub fn from_ext(ext: &str) -> Self {
        match ext {
            "mp4" | "mov" | "mkv" | "webm" | "avi" => MediaKind::Video,
            "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" | "tiff" => MediaKind::Image,
            _ => MediaKind::File,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
            MediaKind::File => "file",
        }
    }
}

/// one file as returned within a group
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemOut {
    pub filename: String,
    pub dir_id: DirId,
    pub url: String,
    pub ext: String,
    pub kind: MediaKind,
    pub seq: Option<i64>,
    pub thumb_url: Option<String>,
}

/// the unit of `/api/resources` output: the equivalence class of items
/// sharing (timeText, author, theme)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub time_text: String,
    pub iso: Option<String>,
    pub timestamp_ms: Option<i64>,
    pub author: String,
    pub theme: String,
    pub theme_text: String,
    pub types: Vec<String>,
    pub group_type: String,
    pub tags: Vec<String>,
    pub items: Vec<MediaItemOut>,
}
