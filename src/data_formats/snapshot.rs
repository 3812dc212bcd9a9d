use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: &str = "1.0";

/// A full export of the store, as written by `plog-backup export` and the
/// admin export page.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub exported_at: String,
    pub posts: Vec<SnapshotPost>,
    pub tags: Vec<SnapshotTag>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTag {
    #[serde(default)]
    pub id: i64,
    pub name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPost {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub is_page: bool,
    pub slug: String,
    #[serde(default)]
    pub tags: Vec<String>,
}
