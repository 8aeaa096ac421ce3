use crate::commands::board::{lock_board, SharedBoard};
use crate::error::Result;
use crate::models::history::{
    BranchSnapshot, CommitComparison, FileGroups, ItemChanges, ItemTrends, ItemsAnalysis, ProjectStats,
};

pub async fn get_stats(board: &SharedBoard) -> std::result::Result<ProjectStats, String> {
    get_stats_internal(board).map_err(|e| e.to_command_error())
}

pub fn get_stats_internal(board: &SharedBoard) -> Result<ProjectStats> {
    let lock = lock_board(board)?;
    lock.tracker().get_project_stats(lock.settings())
}

/// Records the current items without rescanning, then reports stats.
pub async fn refresh_stats(board: &SharedBoard) -> std::result::Result<ProjectStats, String> {
    refresh_stats_internal(board).map_err(|e| e.to_command_error())
}

pub fn refresh_stats_internal(board: &SharedBoard) -> Result<ProjectStats> {
    let lock = lock_board(board)?;
    lock.tracker().save_stats(lock.items(), lock.settings())?;
    lock.tracker().get_project_stats(lock.settings())
}

pub async fn get_stats_history(board: &SharedBoard) -> std::result::Result<Vec<BranchSnapshot>, String> {
    lock_board(board)
        .map(|lock| lock.tracker().branch_history())
        .map_err(|e| e.to_command_error())
}

pub async fn compare_stats(board: &SharedBoard) -> std::result::Result<CommitComparison, String> {
    lock_board(board)
        .and_then(|lock| lock.tracker().compare_with_previous_commit(lock.settings()))
        .map_err(|e| e.to_command_error())
}

/// Number of snapshots removed.
pub async fn cleanup_stats(board: &SharedBoard) -> std::result::Result<usize, String> {
    lock_board(board)
        .and_then(|lock| lock.tracker().cleanup_old_stats())
        .map_err(|e| e.to_command_error())
}

pub async fn get_item_changes(board: &SharedBoard) -> std::result::Result<ItemChanges, String> {
    lock_board(board)
        .and_then(|lock| lock.tracker().get_recent_item_changes())
        .map_err(|e| e.to_command_error())
}

pub async fn get_item_trends(board: &SharedBoard) -> std::result::Result<ItemTrends, String> {
    lock_board(board)
        .and_then(|lock| lock.tracker().get_item_trends(lock.settings()))
        .map_err(|e| e.to_command_error())
}

pub async fn get_items_by_file(board: &SharedBoard) -> std::result::Result<FileGroups, String> {
    lock_board(board)
        .and_then(|lock| lock.tracker().get_items_by_file(lock.settings()))
        .map_err(|e| e.to_command_error())
}

pub async fn get_items_analysis(board: &SharedBoard) -> std::result::Result<ItemsAnalysis, String> {
    lock_board(board)
        .and_then(|lock| lock.tracker().get_items_analysis())
        .map_err(|e| e.to_command_error())
}
