use serde::{Deserialize, Serialize};

pub type DirId = String;

/// a configured media directory, as reported back to the client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaDirOut {
    pub id: DirId,
    pub path: String,
    pub label: Option<String>,
    pub exists: bool,
}
