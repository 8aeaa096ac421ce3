use crate::analysis::patterns::{CompiledPatterns, ANNOTATION_TIME_FORMAT};
use crate::analysis::persist::write_atomic;
use crate::error::{KodoError, Result};
use crate::models::item::Item;
use crate::models::settings::Settings;
use chrono::{DateTime, Local, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Persists board moves as status annotation comments in the item's source file.
#[derive(Debug, Clone)]
pub struct StatusRewriter {
    root: PathBuf,
}

impl StatusRewriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn apply(&self, item: &mut Item, target_column_id: &str, settings: &Settings, user: &str) -> Result<isize> {
        self.apply_at(item, target_column_id, settings, user, Local::now())
    }

    /// Moves `item` to `target_column_id`. Keyword-entered columns drop the
    /// annotation; annotation-only columns get a fresh
    /// `<prefix> <Name> <YYYY-MM-DD HH:MM> by <user>` line at the end of the
    /// comment block. Only lines inside the block are touched.
    ///
    /// Returns how many lines the file grew by (negative when it shrank), so
    /// callers can shift later items in the same file.
    pub fn apply_at(
        &self,
        item: &mut Item,
        target_column_id: &str,
        settings: &Settings,
        user: &str,
        now: DateTime<Local>,
    ) -> Result<isize> {
        let column = settings
            .column(target_column_id)
            .ok_or_else(|| KodoError::KanbanColumnNotFound(target_column_id.to_string()))?;
        let patterns = CompiledPatterns::compile(settings)?;

        let path = self.root.join(&item.file);
        let content = fs::read_to_string(&path).map_err(|source| KodoError::FileRead {
            path: path.clone(),
            source,
        })?;

        let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
        let lines: Vec<&str> = content.lines().collect();
        if item.line < 1 || item.line > lines.len() {
            return Err(KodoError::InvalidLine {
                line: item.line,
                line_count: lines.len(),
            });
        }

        let marker = item.line - 1;
        let is_this_item = patterns
            .match_item(lines[marker])
            .is_some_and(|(item_type, title)| item_type == item.item_type && title == item.title);
        if !is_this_item {
            return Err(KodoError::InvalidLine {
                line: item.line,
                line_count: lines.len(),
            });
        }

        let prefix = marker_prefix(lines[marker]).unwrap_or_else(|| comment_prefix(&item.file));
        let end = block_end(&lines, marker, prefix, &patterns);

        let annotation = (!column.is_keyword_entered()).then(|| {
            let indent: String = lines[marker].chars().take_while(|c| c.is_whitespace()).collect();
            format_annotation(&indent, prefix, &column.name, now, user)
        });

        let mut rewritten: Vec<&str> = Vec::with_capacity(lines.len() + 1);
        rewritten.extend_from_slice(&lines[..=marker]);
        rewritten.extend(
            lines[marker + 1..=end]
                .iter()
                .copied()
                .filter(|line| !patterns.is_status_marker(line)),
        );
        if let Some(annotation) = annotation.as_deref() {
            rewritten.push(annotation);
        }
        rewritten.extend_from_slice(&lines[end + 1..]);

        let delta = rewritten.len() as isize - lines.len() as isize;
        let mut output = rewritten.join(newline);
        if content.ends_with('\n') {
            output.push_str(newline);
        }

        write_atomic(&path, &output).map_err(|source| KodoError::FileWrite {
            path: path.clone(),
            source,
        })?;

        log::info!(
            "Moved {}:{} to '{}'",
            item.file,
            item.line,
            column.id
        );
        item.set_status(&column.id, user, now.with_timezone(&Utc));
        Ok(delta)
    }
}

/// Inclusive index of the last line of the comment block opened at `marker`.
/// The block stops at the first non-comment line, an empty comment, or a line
/// opening another item.
fn block_end(lines: &[&str], marker: usize, prefix: &str, patterns: &CompiledPatterns) -> usize {
    let mut end = marker;
    for (index, line) in lines.iter().enumerate().skip(marker + 1) {
        let in_block = is_comment_line(line, prefix)
            && patterns.match_description(line).is_some()
            && !patterns.is_item_line(line);
        if !in_block {
            break;
        }
        end = index;
    }
    end
}

fn is_comment_line(line: &str, prefix: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    match prefix {
        "<!--" => trimmed.contains("<!--"),
        _ => trimmed.starts_with(prefix),
    }
}

fn format_annotation(indent: &str, prefix: &str, column_name: &str, now: DateTime<Local>, user: &str) -> String {
    let stamp = now.format(ANNOTATION_TIME_FORMAT);
    match prefix {
        "<!--" => format!("{indent}<!-- {column_name} {stamp} by {user} -->"),
        _ => format!("{indent}{prefix} {column_name} {stamp} by {user}"),
    }
}

/// Comment opener actually used on `line`.
fn marker_prefix(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    ["<!--", "//", "--", "#"]
        .into_iter()
        .find(|prefix| trimmed.starts_with(prefix))
}

/// Line-comment opener for a file, chosen by extension.
pub fn comment_prefix(file: &str) -> &'static str {
    let ext = Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "py" | "sh" | "bash" | "zsh" | "rb" | "yml" | "yaml" | "toml" | "pl" | "r" => "#",
        "sql" | "lua" | "hs" => "--",
        "html" | "htm" | "xml" | "vue" | "svelte" | "md" => "<!--",
        _ => "//",
    }
}
