use crate::analysis::git;
use crate::analysis::persist::write_atomic;
use crate::error::{KodoError, Result};
use crate::models::history::{
    BranchSnapshot, ChangeSummary, CommitComparison, CompletionPoint, FileGroup, FileGroups, GitInfo,
    ItemChanges, ItemStats, ItemTrends, ItemsAnalysis, ItemsHistory, ProjectStats, SnapshotRef,
    StatusChange, TaskItem, TimelineEntry, TypePoint,
};
use crate::models::item::{Item, ItemPriority};
use crate::models::settings::{KanbanColumn, Settings};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const HISTORY_FILE_NAME: &str = "items_history.json";
pub const MAX_SNAPSHOTS: usize = 50;
pub const SNAPSHOT_RETENTION_DAYS: i64 = 30;

const GITIGNORE: &str = "# Kodo temporary files
*.tmp
*.log
*.kodo-tmp

# Keep the history but ignore temporary data
!items_history.json
";

/// Commit-keyed item history stored in `<config-dir>/items_history.json`.
///
/// Assumes a single writer per project directory; callers serialize access
/// through the board lock.
#[derive(Debug, Clone)]
pub struct HistoryTracker {
    project_root: PathBuf,
    kodo_dir: PathBuf,
    stats_file: PathBuf,
}

impl HistoryTracker {
    pub fn new(project_root: impl Into<PathBuf>, config_dir: impl AsRef<Path>) -> Self {
        let project_root = project_root.into();
        let kodo_dir = project_root.join(config_dir);
        let stats_file = kodo_dir.join(HISTORY_FILE_NAME);
        Self {
            project_root,
            kodo_dir,
            stats_file,
        }
    }

    pub fn stats_file(&self) -> &Path {
        &self.stats_file
    }

    /// Creates the config directory and its `.gitignore` when missing.
    pub fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.kodo_dir)?;

        let gitignore = self.kodo_dir.join(".gitignore");
        if !gitignore.exists() {
            if let Err(e) = fs::write(&gitignore, GITIGNORE) {
                log::warn!("Failed to create {}: {}", gitignore.display(), e);
            }
        }
        Ok(())
    }

    /// Persisted history, or `None` when the file is missing or unreadable.
    pub fn load_stats(&self) -> Option<ItemsHistory> {
        let raw = match fs::read_to_string(&self.stats_file) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to read history file {}: {}", self.stats_file.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(history) => Some(history),
            Err(e) => {
                log::error!("Failed to parse history file {}: {}", self.stats_file.display(), e);
                None
            }
        }
    }

    pub fn save_stats(&self, items: &[Item], settings: &Settings) -> Result<()> {
        let git_info = git::read_git_info(&self.project_root);
        self.save_stats_with(items, settings, git_info, Utc::now())
    }

    /// Records the current items. A snapshot is appended only when the commit
    /// differs from the last persisted one; an unknown commit always snapshots.
    pub fn save_stats_with(
        &self,
        items: &[Item],
        settings: &Settings,
        git_info: GitInfo,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.initialize()?;

        let existing = self.load_stats();
        let previous_commit = existing.as_ref().map(|h| h.git.commit.clone());
        let mut history = existing.unwrap_or_else(|| {
            ItemsHistory::skeleton(self.project_root.to_string_lossy().to_string(), now)
        });

        let done_column = settings.done_column();
        let task_items: Vec<TaskItem> = items.iter().map(|item| task_item(item, done_column)).collect();

        history.project_path = self.project_root.to_string_lossy().to_string();
        history.last_scan_at = now;
        history.total_items = items.len();
        history.items_by_status = count_by(items, |item| item.status.clone());
        history.items_by_type = count_by(items, |item| item.item_type.clone());
        history.items_by_file = count_by(items, |item| item.file.clone());
        history.current_items = task_items.clone();

        let commit_known = !git_info.commit.is_empty() && git_info.commit != "unknown";
        let same_commit = commit_known && previous_commit.as_deref() == Some(git_info.commit.as_str());

        if !same_commit {
            history.branch_history.push(BranchSnapshot {
                branch: git_info.branch.clone(),
                commit: git_info.commit.clone(),
                commit_short: git_info.commit_short.clone(),
                commit_message: git::commit_message(&self.project_root, &git_info.commit),
                timestamp: now,
                history: item_stats(items, task_items),
            });

            let len = history.branch_history.len();
            if len > MAX_SNAPSHOTS {
                history.branch_history.drain(..len - MAX_SNAPSHOTS);
            }
        }

        history.git = git_info;
        history.updated_at = now;
        self.write(&history)?;

        log::info!(
            "Saved item history: {} items on {}@{} ({} snapshots)",
            history.total_items,
            history.git.branch,
            history.git.commit_short,
            history.branch_history.len()
        );
        Ok(())
    }

    fn write(&self, history: &ItemsHistory) -> Result<()> {
        let data = serde_json::to_string_pretty(history)?;
        write_atomic(&self.stats_file, &data).map_err(|source| KodoError::FileWrite {
            path: self.stats_file.clone(),
            source,
        })
    }

    /// Snapshots newest first.
    pub fn branch_history(&self) -> Vec<BranchSnapshot> {
        let mut snapshots = self.snapshots();
        snapshots.reverse();
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        snapshots
    }

    /// Snapshots in arrival order.
    fn snapshots(&self) -> Vec<BranchSnapshot> {
        self.load_stats().map(|h| h.branch_history).unwrap_or_default()
    }

    fn last_two(&self) -> Result<(BranchSnapshot, BranchSnapshot)> {
        let mut snapshots = self.snapshots();
        if snapshots.len() < 2 {
            return Err(KodoError::NotEnoughHistory("at least two snapshots are required"));
        }
        let current = snapshots.pop().ok_or(KodoError::NotEnoughHistory("no snapshots"))?;
        let previous = snapshots.pop().ok_or(KodoError::NotEnoughHistory("no snapshots"))?;
        Ok((previous, current))
    }

    pub fn get_recent_item_changes(&self) -> Result<ItemChanges> {
        let (previous, current) = self.last_two()?;
        Ok(diff_snapshots(&previous, &current))
    }

    pub fn get_item_trends(&self, settings: &Settings) -> Result<ItemTrends> {
        let snapshots = self.snapshots();
        if snapshots.len() < 2 {
            return Err(KodoError::NotEnoughHistory("trend analysis needs at least two snapshots"));
        }
        let done = settings.done_column().ok_or(KodoError::NoColumns)?;

        let mut trends = ItemTrends::default();
        for snapshot in &snapshots {
            let items = &snapshot.history.items;
            let columns = settings
                .kanban_columns
                .iter()
                .map(|col| (col.name.clone(), column_count(items, col, done)))
                .collect();

            trends.timeline.push(TimelineEntry {
                timestamp: snapshot.timestamp,
                commit: snapshot.commit_short.clone(),
                branch: snapshot.branch.clone(),
                total: snapshot.history.total,
                columns,
            });

            let done_count = items.iter().filter(|item| is_done(item, done)).count();
            let rate = if snapshot.history.total > 0 {
                done_count as f64 / snapshot.history.total as f64 * 100.0
            } else {
                0.0
            };
            trends.completion_rate.push(CompletionPoint {
                timestamp: snapshot.timestamp,
                commit: snapshot.commit_short.clone(),
                rate,
            });

            for (item_type, count) in &snapshot.history.by_type {
                trends.type_trends.entry(item_type.clone()).or_default().push(TypePoint {
                    timestamp: snapshot.timestamp,
                    commit: snapshot.commit_short.clone(),
                    count: *count,
                });
            }
        }

        Ok(trends)
    }

    pub fn compare_with_previous_commit(&self, settings: &Settings) -> Result<CommitComparison> {
        let (previous, current) = self.last_two()?;
        let done = settings.done_column().ok_or(KodoError::NoColumns)?;

        let changes = settings
            .kanban_columns
            .iter()
            .map(|col| {
                let now = column_count(&current.history.items, col, done) as i64;
                let before = column_count(&previous.history.items, col, done) as i64;
                (col.name.clone(), now - before)
            })
            .collect();

        Ok(CommitComparison {
            current: SnapshotRef::from(&current),
            previous: SnapshotRef::from(&previous),
            changes,
        })
    }

    pub fn cleanup_old_stats(&self) -> Result<usize> {
        self.cleanup_old_stats_at(Utc::now())
    }

    /// Drops snapshots older than the retention window. The file is only
    /// rewritten when something was removed.
    pub fn cleanup_old_stats_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let Some(mut history) = self.load_stats() else {
            return Ok(0);
        };

        let cutoff = now - Duration::days(SNAPSHOT_RETENTION_DAYS);
        let before = history.branch_history.len();
        history.branch_history.retain(|snapshot| snapshot.timestamp > cutoff);
        let removed = before - history.branch_history.len();

        if removed > 0 {
            history.updated_at = now;
            self.write(&history)?;
            log::info!(
                "Cleaned up old history: removed {}, remaining {}",
                removed,
                history.branch_history.len()
            );
        }
        Ok(removed)
    }

    pub fn get_project_stats(&self, settings: &Settings) -> Result<ProjectStats> {
        let history = self
            .load_stats()
            .ok_or(KodoError::NotEnoughHistory("no history recorded yet"))?;
        let done = settings.done_column().ok_or(KodoError::NoColumns)?;

        let mut items_by_status: BTreeMap<String, usize> = settings
            .kanban_columns
            .iter()
            .map(|col| (col.id.clone(), 0))
            .collect();
        for item in &history.current_items {
            let key = if is_done(item, done) { done.id.clone() } else { item.status.clone() };
            *items_by_status.entry(key).or_insert(0) += 1;
        }

        let total = history.total_items;
        let done_count = items_by_status.get(&done.id).copied().unwrap_or(0);
        let progress_percent = if total > 0 {
            done_count as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(ProjectStats {
            project_path: history.project_path,
            last_scan: history.last_scan_at,
            git_branch: history.git.branch,
            git_commit_short: history.git.commit_short,
            total_items: total,
            items_by_status,
            progress_percent,
            items_by_type: history.items_by_type,
            items_by_file: history.items_by_file,
            history_count: history.branch_history.len(),
            created_at: history.created_at,
            updated_at: history.updated_at,
        })
    }

    pub fn get_items_by_file(&self, settings: &Settings) -> Result<FileGroups> {
        let history = self
            .load_stats()
            .ok_or(KodoError::NotEnoughHistory("no history recorded yet"))?;

        let mut files: BTreeMap<String, FileGroup> = BTreeMap::new();
        for item in history.current_items {
            let group = files.entry(item.file.clone()).or_insert_with(|| FileGroup {
                status_counts: settings
                    .kanban_columns
                    .iter()
                    .map(|col| (col.id.clone(), 0))
                    .collect(),
                ..FileGroup::default()
            });

            group.total += 1;
            if item.priority == ItemPriority::High {
                group.high_priority += 1;
            }
            if let Some(count) = group.status_counts.get_mut(&item.status) {
                *count += 1;
            }
            group.items.push(item);
        }

        Ok(FileGroups {
            total_files: files.len(),
            files,
        })
    }

    pub fn get_items_analysis(&self) -> Result<ItemsAnalysis> {
        let history = self
            .load_stats()
            .ok_or(KodoError::NotEnoughHistory("no history recorded yet"))?;

        let mut analysis = ItemsAnalysis {
            total_items: history.current_items.len(),
            recent_changes: self.get_recent_item_changes().ok(),
            ..ItemsAnalysis::default()
        };

        for item in history.current_items {
            analysis.items_by_file.entry(item.file.clone()).or_default().push(item.clone());
            analysis.items_by_type.entry(item.item_type.clone()).or_default().push(item.clone());
            analysis.items_by_status.entry(item.status.clone()).or_default().push(item.clone());
            if item.priority == ItemPriority::High {
                analysis.high_priority.push(item);
            }
        }

        Ok(analysis)
    }
}

/// Cross-scan identity of an item: rolling multiply-add over
/// `file:line:type:title`. Status is deliberately not part of it.
pub fn item_hash(file: &str, line: usize, item_type: &str, title: &str) -> String {
    let content = format!("{file}:{line}:{item_type}:{title}");
    let hash = content
        .chars()
        .fold(0u64, |acc, c| acc.wrapping_mul(31).wrapping_add(c as u64));
    format!("{hash:x}")
}

fn task_item(item: &Item, done_column: Option<&KanbanColumn>) -> TaskItem {
    let done_entry = done_column
        .filter(|col| col.id == item.status)
        .and_then(|col| item.last_transition_to(&col.id));

    TaskItem {
        id: item.id,
        item_type: item.item_type.clone(),
        title: item.title.clone(),
        file: item.file.clone(),
        line: item.line,
        status: item.status.clone(),
        priority: item.priority,
        is_done: done_column.is_some_and(|col| col.id == item.status),
        done_at: done_entry.map(|entry| entry.timestamp),
        done_by: done_entry.map(|entry| entry.user.clone()),
        hash: item_hash(&item.file, item.line, &item.item_type, &item.title),
    }
}

fn item_stats(items: &[Item], task_items: Vec<TaskItem>) -> ItemStats {
    ItemStats {
        total: items.len(),
        by_status: count_by(items, |item| item.status.clone()),
        by_type: count_by(items, |item| item.item_type.clone()),
        by_priority: count_by(items, |item| item.priority.to_string()),
        items: task_items,
    }
}

fn count_by<F>(items: &[Item], key: F) -> BTreeMap<String, usize>
where
    F: Fn(&Item) -> String,
{
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(key(item)).or_insert(0) += 1;
    }
    counts
}

fn is_done(item: &TaskItem, done: &KanbanColumn) -> bool {
    item.status == done.id || item.is_done
}

/// Items in `col`; the done column also claims items carrying the legacy
/// `is_done` flag.
fn column_count(items: &[TaskItem], col: &KanbanColumn, done: &KanbanColumn) -> usize {
    items
        .iter()
        .filter(|item| item.status == col.id || (col.id == done.id && item.is_done))
        .count()
}

/// Pairs two snapshots by hash.
pub fn diff_snapshots(previous: &BranchSnapshot, current: &BranchSnapshot) -> ItemChanges {
    let before: HashMap<&str, &TaskItem> = previous
        .history
        .items
        .iter()
        .map(|item| (item.hash.as_str(), item))
        .collect();
    let after: HashMap<&str, &TaskItem> = current
        .history
        .items
        .iter()
        .map(|item| (item.hash.as_str(), item))
        .collect();

    let mut changes = ItemChanges::default();
    for item in &current.history.items {
        match before.get(item.hash.as_str()) {
            None => changes.added.push(item.clone()),
            Some(old) if old.status != item.status => changes.status_changed.push(StatusChange {
                item: item.clone(),
                old_status: old.status.clone(),
                new_status: item.status.clone(),
            }),
            Some(_) => {}
        }
    }
    changes.removed = previous
        .history
        .items
        .iter()
        .filter(|item| !after.contains_key(item.hash.as_str()))
        .cloned()
        .collect();

    changes.summary = ChangeSummary {
        added: changes.added.len(),
        removed: changes.removed.len(),
        status_changed: changes.status_changed.len(),
    };
    changes
}
