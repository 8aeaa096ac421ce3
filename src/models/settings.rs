use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanbanColumn {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    /// `|`-delimited marker keywords. Columns without one can only be reached
    /// through a status annotation comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_assign_pattern: Option<String>,
}

impl KanbanColumn {
    pub fn is_keyword_entered(&self) -> bool {
        self.auto_assign_pattern.is_some()
    }

    pub fn keywords(&self) -> Vec<String> {
        self.auto_assign_pattern
            .as_deref()
            .map(|pattern| {
                pattern
                    .split('|')
                    .map(str::trim)
                    .filter(|keyword| !keyword.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityPatterns {
    pub low: String,
    pub medium: String,
    pub high: String,
}

impl Default for PriorityPatterns {
    fn default() -> Self {
        Self {
            low: "LOW".to_string(),
            medium: "MEDIUM".to_string(),
            high: "HIGH".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodeScanSettings {
    #[serde(default)]
    pub exclude_directories: Vec<String>,
    #[serde(default)]
    pub exclude_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub kanban_columns: Vec<KanbanColumn>,
    #[serde(default)]
    pub priority_patterns: PriorityPatterns,
    #[serde(default)]
    pub code_scan_settings: CodeScanSettings,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for Settings {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            kanban_columns: default_columns(),
            priority_patterns: PriorityPatterns::default(),
            code_scan_settings: CodeScanSettings {
                exclude_directories: default_exclude_directories(),
                exclude_files: default_exclude_files(),
            },
            created_at: now,
            updated_at: now,
        }
    }
}

impl Settings {
    /// Settings identical in everything that shapes the scan grammar.
    /// Timestamps are ignored so a re-saved file does not force recompilation.
    pub fn same_grammar(&self, other: &Settings) -> bool {
        self.kanban_columns == other.kanban_columns
            && self.priority_patterns == other.priority_patterns
    }

    pub fn column(&self, id: &str) -> Option<&KanbanColumn> {
        self.kanban_columns.iter().find(|col| col.id == id)
    }

    /// Entry status for items without any annotation.
    pub fn first_column(&self) -> Option<&KanbanColumn> {
        self.kanban_columns.first()
    }

    /// The last column is the "done" stage for trend and progress queries.
    pub fn done_column(&self) -> Option<&KanbanColumn> {
        self.kanban_columns.last()
    }

    /// Fills empty sections with defaults.
    pub fn validated(mut self) -> Self {
        if self.kanban_columns.is_empty() {
            self.kanban_columns = default_columns();
        }
        if self.code_scan_settings.exclude_directories.is_empty() {
            self.code_scan_settings.exclude_directories = default_exclude_directories();
        }
        if self.code_scan_settings.exclude_files.is_empty() {
            self.code_scan_settings.exclude_files = default_exclude_files();
        }
        self
    }
}

pub fn default_columns() -> Vec<KanbanColumn> {
    vec![
        KanbanColumn {
            id: "todo".to_string(),
            name: "TODO".to_string(),
            color: "dark".to_string(),
            auto_assign_pattern: Some("TODO|FIXME".to_string()),
        },
        KanbanColumn {
            id: "in_progress".to_string(),
            name: "IN PROGRESS".to_string(),
            color: "blue".to_string(),
            auto_assign_pattern: None,
        },
        KanbanColumn {
            id: "done".to_string(),
            name: "DONE".to_string(),
            color: "green".to_string(),
            auto_assign_pattern: None,
        },
    ]
}

fn default_exclude_directories() -> Vec<String> {
    [
        "node_modules", ".git", ".idea", ".vscode", ".cache", ".next", "dist", "build", "out",
        "public", "vendor", "target", "tmp", "logs", "coverage", ".kodo",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_files() -> Vec<String> {
    [
        "*.min.js", "*.min.css", "*.bundle.js", "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp",
        "*.svg", "*.ico", "*.map", "*.lock", "package-lock.json", "yarn.lock", "pnpm-lock.yaml",
        ".gitignore", ".dockerignore", "README.md", "LICENSE", "*.env", "*.local", "*.log", "*.db",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
