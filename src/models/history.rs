use crate::models::item::ItemPriority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot record of one item. `hash` is the only identity that survives
/// between scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: usize,
    #[serde(rename = "type")]
    pub item_type: String,
    pub title: String,
    pub file: String,
    pub line: usize,
    pub status: String,
    pub priority: ItemPriority,
    #[serde(default)]
    pub is_done: bool,
    #[serde(default)]
    pub done_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub done_by: Option<String>,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
    pub total: usize,
    #[serde(default)]
    pub by_status: BTreeMap<String, usize>,
    #[serde(default)]
    pub by_type: BTreeMap<String, usize>,
    #[serde(default)]
    pub by_priority: BTreeMap<String, usize>,
    #[serde(default)]
    pub items: Vec<TaskItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSnapshot {
    pub branch: String,
    pub commit: String,
    pub commit_short: String,
    #[serde(default)]
    pub commit_message: String,
    pub timestamp: DateTime<Utc>,
    pub history: ItemStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitInfo {
    #[serde(rename = "git_branch")]
    pub branch: String,
    #[serde(rename = "git_commit")]
    pub commit: String,
    #[serde(rename = "git_commit_short")]
    pub commit_short: String,
}

impl GitInfo {
    pub fn unknown() -> Self {
        Self {
            branch: "unknown".to_string(),
            commit: "unknown".to_string(),
            commit_short: "unknown".to_string(),
        }
    }
}

/// Persisted root of `items_history.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsHistory {
    pub project_path: String,
    pub last_scan_at: DateTime<Utc>,
    #[serde(flatten)]
    pub git: GitInfo,
    pub total_items: usize,
    #[serde(default)]
    pub items_by_status: BTreeMap<String, usize>,
    #[serde(default)]
    pub items_by_type: BTreeMap<String, usize>,
    #[serde(default)]
    pub items_by_file: BTreeMap<String, usize>,
    #[serde(default)]
    pub current_items: Vec<TaskItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branch_history: Vec<BranchSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemsHistory {
    pub fn skeleton(project_path: String, now: DateTime<Utc>) -> Self {
        Self {
            project_path,
            last_scan_at: now,
            git: GitInfo::default(),
            total_items: 0,
            items_by_status: BTreeMap::new(),
            items_by_type: BTreeMap::new(),
            items_by_file: BTreeMap::new(),
            current_items: Vec::new(),
            branch_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub item: TaskItem,
    pub old_status: String,
    pub new_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub removed: usize,
    pub status_changed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemChanges {
    pub added: Vec<TaskItem>,
    pub removed: Vec<TaskItem>,
    pub status_changed: Vec<StatusChange>,
    pub summary: ChangeSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub commit: String,
    pub branch: String,
    pub total: usize,
    /// Item count per configured column, keyed by column name.
    pub columns: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionPoint {
    pub timestamp: DateTime<Utc>,
    pub commit: String,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypePoint {
    pub timestamp: DateTime<Utc>,
    pub commit: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemTrends {
    pub timeline: Vec<TimelineEntry>,
    pub completion_rate: Vec<CompletionPoint>,
    pub type_trends: BTreeMap<String, Vec<TypePoint>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub commit: String,
    pub branch: String,
    pub timestamp: DateTime<Utc>,
    pub history: ItemStats,
}

impl From<&BranchSnapshot> for SnapshotRef {
    fn from(snapshot: &BranchSnapshot) -> Self {
        Self {
            commit: snapshot.commit_short.clone(),
            branch: snapshot.branch.clone(),
            timestamp: snapshot.timestamp,
            history: snapshot.history.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitComparison {
    pub current: SnapshotRef,
    pub previous: SnapshotRef,
    /// Count delta (current - previous) per column name.
    pub changes: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStats {
    pub project_path: String,
    pub last_scan: DateTime<Utc>,
    pub git_branch: String,
    pub git_commit_short: String,
    pub total_items: usize,
    pub items_by_status: BTreeMap<String, usize>,
    pub progress_percent: f64,
    pub items_by_type: BTreeMap<String, usize>,
    pub items_by_file: BTreeMap<String, usize>,
    pub history_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileGroup {
    pub items: Vec<TaskItem>,
    pub total: usize,
    pub high_priority: usize,
    pub status_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileGroups {
    pub files: BTreeMap<String, FileGroup>,
    pub total_files: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemsAnalysis {
    pub total_items: usize,
    pub items_by_file: BTreeMap<String, Vec<TaskItem>>,
    pub items_by_type: BTreeMap<String, Vec<TaskItem>>,
    pub items_by_status: BTreeMap<String, Vec<TaskItem>>,
    pub high_priority: Vec<TaskItem>,
    pub recent_changes: Option<ItemChanges>,
}
