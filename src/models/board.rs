use crate::models::settings::KanbanColumn;
use serde::{Deserialize, Serialize};

/// Summary of an opened project board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardMeta {
    pub path: String,
    pub project_name: String,
    pub branch: String,
    pub commit_short: String,
    pub columns: Vec<KanbanColumn>,
    pub item_count: usize,
    pub last_scan_at: Option<i64>,
}
