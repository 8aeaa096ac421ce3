use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KodoError>;

#[derive(Debug, Error)]
pub enum KodoError {
    #[error("project directory {0} does not exist")]
    PathNotFound(PathBuf),

    #[error("board lock poisoned")]
    BoardLock,

    #[error("kanban column with ID '{0}' not found")]
    KanbanColumnNotFound(String),

    #[error("item with ID {0} not found, rescan and retry")]
    ItemNotFound(usize),

    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid line number {line} (file has {line_count} lines), rescan and retry")]
    InvalidLine { line: usize, line_count: usize },

    #[error("failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not enough history: {0}")]
    NotEnoughHistory(&'static str),

    #[error("no kanban columns configured")]
    NoColumns,

    #[error("invalid scan pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl KodoError {
    /// Stable error code used as the prefix of command error strings.
    pub fn code(&self) -> &'static str {
        match self {
            KodoError::PathNotFound(_) => "PATH_NOT_FOUND",
            KodoError::BoardLock => "LOCK_ERROR",
            KodoError::KanbanColumnNotFound(_) => "COLUMN_NOT_FOUND",
            KodoError::ItemNotFound(_) => "ITEM_NOT_FOUND",
            KodoError::FileRead { .. } => "FILE_READ_FAILED",
            KodoError::InvalidLine { .. } => "INVALID_LINE",
            KodoError::FileWrite { .. } => "FILE_WRITE_FAILED",
            KodoError::NotEnoughHistory(_) => "NOT_ENOUGH_HISTORY",
            KodoError::NoColumns => "NO_COLUMNS",
            KodoError::Pattern(_) => "PATTERN_ERROR",
            KodoError::Serialize(_) => "SERIALIZE_FAILED",
            KodoError::Io(_) => "IO_ERROR",
        }
    }

    /// Renders the error the way command functions report it: `CODE: message`.
    pub fn to_command_error(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_carries_code_prefix() {
        let err = KodoError::InvalidLine { line: 12, line_count: 3 };
        let rendered = err.to_command_error();
        assert!(rendered.starts_with("INVALID_LINE: "));
        assert!(rendered.contains("12"));
    }
}
