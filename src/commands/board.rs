use crate::analysis::git;
use crate::analysis::history::HistoryTracker;
use crate::analysis::rewriter::StatusRewriter;
use crate::analysis::scanner::Scanner;
use crate::commands::settings::{load_settings_from_disk, save_settings_to_disk};
use crate::error::{KodoError, Result};
use crate::models::board::BoardMeta;
use crate::models::item::Item;
use crate::models::settings::Settings;
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Scanner, history tracker and rewriter of one project.
///
/// All mutation of source files and the history file goes through a
/// [`SharedBoard`] lock.
#[derive(Debug)]
pub struct Board {
    root: PathBuf,
    config_dir: String,
    settings: Settings,
    scanner: Scanner,
    tracker: HistoryTracker,
    rewriter: StatusRewriter,
    last_scan_at: Option<i64>,
}

pub type SharedBoard = Arc<Mutex<Board>>;

impl Board {
    pub fn open(root: impl Into<PathBuf>, config_dir: &str) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(KodoError::PathNotFound(root));
        }

        let settings = load_settings_from_disk(&root, config_dir)?;
        let tracker = HistoryTracker::new(&root, config_dir);
        tracker.initialize()?;

        Ok(Self {
            scanner: Scanner::new(&root),
            rewriter: StatusRewriter::new(&root),
            root,
            config_dir: config_dir.to_string(),
            settings,
            tracker,
            last_scan_at: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn items(&self) -> &[Item] {
        self.scanner.items()
    }

    pub fn tracker(&self) -> &HistoryTracker {
        &self.tracker
    }

    /// Reloads settings from disk, rescans and records the result in history.
    pub fn rescan(&mut self) -> Result<Vec<Item>> {
        self.settings = load_settings_from_disk(&self.root, &self.config_dir)?;
        let items = self.scanner.scan(&self.settings)?.to_vec();
        self.last_scan_at = Some(Utc::now().timestamp());
        self.record_stats();
        Ok(items)
    }

    /// Rewrites the item's annotation and records the move in history.
    pub fn move_item(&mut self, item_id: usize, column_id: &str) -> Result<Item> {
        let user = git::current_user(&self.root);
        let item = self
            .scanner
            .find_item_mut(item_id)
            .ok_or(KodoError::ItemNotFound(item_id))?;

        let delta = self.rewriter.apply(item, column_id, &self.settings, &user)?;
        let moved = item.clone();
        self.scanner.shift_lines(&moved.file, moved.line, delta);
        self.record_stats();
        Ok(moved)
    }

    /// Saves a settings update and carries in-memory statuses over renamed
    /// columns.
    pub fn update_settings(&mut self, incoming: &Value) -> Result<Settings> {
        let previous = self.settings.clone();
        let updated = save_settings_to_disk(&self.root, &self.config_dir, incoming)?;
        self.settings = updated.clone();

        if self.scanner.update_old_statuses(&previous, &updated) {
            log::info!("Remapped item statuses after column change");
            self.record_stats();
        }
        Ok(updated)
    }

    /// History failures never undo a completed scan or move.
    fn record_stats(&self) {
        if let Err(e) = self.tracker.save_stats(self.scanner.items(), &self.settings) {
            log::warn!("Failed to save item history: {}", e);
        }
    }

    pub fn meta(&self) -> BoardMeta {
        let info = git::read_git_info(&self.root);
        BoardMeta {
            path: self.root.to_string_lossy().to_string(),
            project_name: self
                .root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            branch: info.branch,
            commit_short: info.commit_short,
            columns: self.settings.kanban_columns.clone(),
            item_count: self.scanner.items().len(),
            last_scan_at: self.last_scan_at,
        }
    }
}

pub(crate) fn lock_board(board: &SharedBoard) -> Result<MutexGuard<'_, Board>> {
    board.lock().map_err(|_| KodoError::BoardLock)
}

/// Opens the project and runs the first scan.
pub async fn open_board(project_path: String, config_dir: String) -> std::result::Result<SharedBoard, String> {
    open_board_internal(Path::new(&project_path), &config_dir).map_err(|e| e.to_command_error())
}

pub fn open_board_internal(project_root: &Path, config_dir: &str) -> Result<SharedBoard> {
    let mut board = Board::open(project_root, config_dir)?;
    board.rescan()?;
    Ok(Arc::new(Mutex::new(board)))
}

pub async fn get_board_meta(board: &SharedBoard) -> std::result::Result<BoardMeta, String> {
    lock_board(board)
        .map(|lock| lock.meta())
        .map_err(|e| e.to_command_error())
}

pub async fn rescan(board: &SharedBoard) -> std::result::Result<Vec<Item>, String> {
    rescan_internal(board).map_err(|e| e.to_command_error())
}

pub fn rescan_internal(board: &SharedBoard) -> Result<Vec<Item>> {
    lock_board(board)?.rescan()
}

pub async fn get_items(board: &SharedBoard) -> std::result::Result<Vec<Item>, String> {
    lock_board(board)
        .map(|lock| lock.items().to_vec())
        .map_err(|e| e.to_command_error())
}

pub async fn update_item_status(
    board: &SharedBoard,
    item_id: usize,
    column_id: String,
) -> std::result::Result<Item, String> {
    update_item_status_internal(board, item_id, &column_id).map_err(|e| e.to_command_error())
}

pub fn update_item_status_internal(board: &SharedBoard, item_id: usize, column_id: &str) -> Result<Item> {
    lock_board(board)?.move_item(item_id, column_id)
}

pub async fn remap_statuses(board: &SharedBoard, settings: Value) -> std::result::Result<Settings, String> {
    lock_board(board)
        .and_then(|mut lock| lock.update_settings(&settings))
        .map_err(|e| e.to_command_error())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::settings::DEFAULT_CONFIG_DIR;
    use serde_json::json;
    use std::fs;

    fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            let path = tmp.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        tmp
    }

    #[test]
    fn missing_project_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Board::open(tmp.path().join("nope"), DEFAULT_CONFIG_DIR).unwrap_err();
        assert_eq!(err.code(), "PATH_NOT_FOUND");
    }

    #[test]
    fn unknown_item_is_reported() {
        let tmp = project(&[("src/a.rs", "// TODO: one\n")]);
        let board = open_board_internal(tmp.path(), DEFAULT_CONFIG_DIR).unwrap();

        let err = update_item_status_internal(&board, 42, "done").unwrap_err();
        assert!(matches!(err, KodoError::ItemNotFound(42)));
    }

    #[test]
    fn move_then_rescan_keeps_status() {
        let tmp = project(&[("src/a.rs", "fn main() {}\n// FIXME: leak\n")]);
        let board = open_board_internal(tmp.path(), DEFAULT_CONFIG_DIR).unwrap();

        let moved = update_item_status_internal(&board, 1, "in_progress").unwrap();
        assert_eq!(moved.status, "in_progress");

        let items = rescan_internal(&board).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, "in_progress");
        assert!(lock_board(&board).unwrap().tracker().stats_file().exists());
    }

    #[test]
    fn consecutive_moves_in_one_file_track_shifted_lines() {
        let tmp = project(&[("src/a.rs", "// TODO: one\nfn a() {}\n// TODO: two\nfn b() {}\n")]);
        let board = open_board_internal(tmp.path(), DEFAULT_CONFIG_DIR).unwrap();

        update_item_status_internal(&board, 1, "done").unwrap();
        let second = update_item_status_internal(&board, 2, "in_progress").unwrap();
        assert_eq!(second.line, 4);

        let source = fs::read_to_string(tmp.path().join("src/a.rs")).unwrap();
        let lines: Vec<&str> = source.lines().collect();
        assert_eq!(lines[3], "// TODO: two");
        assert!(lines[4].starts_with("// IN PROGRESS "));

        update_item_status_internal(&board, 1, "todo").unwrap();
        assert_eq!(lock_board(&board).unwrap().items()[1].line, 3);

        let items = rescan_internal(&board).unwrap();
        assert_eq!(items[0].status, "todo");
        assert_eq!((items[1].line, items[1].status.as_str()), (3, "in_progress"));
    }

    #[test]
    fn meta_describes_the_scanned_board() {
        let tmp = project(&[("src/a.rs", "// TODO: one\n// FIXME: two\n")]);
        let board = open_board_internal(tmp.path(), DEFAULT_CONFIG_DIR).unwrap();

        let meta = lock_board(&board).unwrap().meta();
        assert_eq!(meta.item_count, 2);
        assert_eq!(meta.columns.len(), 3);
        assert!(meta.last_scan_at.is_some());
    }

    #[test]
    fn renamed_column_carries_statuses() {
        let tmp = project(&[("src/a.rs", "// TODO: one\n")]);
        let board = open_board_internal(tmp.path(), DEFAULT_CONFIG_DIR).unwrap();

        let mut columns = serde_json::to_value(&lock_board(&board).unwrap().settings().kanban_columns).unwrap();
        columns[0]["id"] = json!("backlog");

        let mut lock = lock_board(&board).unwrap();
        let updated = lock.update_settings(&json!({ "kanban_columns": columns })).unwrap();
        assert_eq!(updated.kanban_columns[0].id, "backlog");
        assert_eq!(lock.items()[0].status, "backlog");
    }
}
