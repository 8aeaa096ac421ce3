use crate::analysis::git;
use crate::analysis::patterns::{CompiledPatterns, StatusLine};
use crate::error::Result;
use crate::models::item::{Item, ItemPriority, StatusHistory};
use crate::models::settings::{CodeScanSettings, Settings};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use glob::{MatchOptions, Pattern};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files above this size are skipped by the walker.
pub const MAX_SCAN_FILE_SIZE: u64 = 1024 * 1024;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Walks a project tree and turns marker comments into [`Item`]s.
///
/// Owns the item list of the latest scan. IDs restart at 1 on every scan.
#[derive(Debug)]
pub struct Scanner {
    root: PathBuf,
    items: Vec<Item>,
    next_id: usize,
    compiled: Option<(Settings, Arc<CompiledPatterns>)>,
}

/// Per-scan inputs shared by every parsed file.
pub struct ParseContext<'a> {
    pub patterns: &'a CompiledPatterns,
    pub first_column: &'a str,
    pub user: &'a str,
    pub now: DateTime<Utc>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            items: Vec::new(),
            next_id: 0,
            compiled: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn scan(&mut self, settings: &Settings) -> Result<&[Item]> {
        self.items.clear();
        self.next_id = 0;

        let Some(first_column) = settings.first_column() else {
            log::warn!("No kanban columns configured, scan yields no items");
            return Ok(&self.items);
        };
        let first_column = first_column.id.clone();

        let patterns = self.patterns_for(settings)?;
        let user = git::current_user(&self.root);
        let ctx = ParseContext {
            patterns: &patterns,
            first_column: &first_column,
            user: &user,
            now: Utc::now(),
        };

        let files = walk_files(&self.root, &settings.code_scan_settings);
        let mut items = Vec::new();
        for (path, relative) in &files {
            let source = match read_source(path) {
                Some(source) => source,
                None => continue,
            };
            items.extend(parse_source(&source, relative, &ctx, &mut self.next_id));
        }

        log::info!(
            "Scanned {} files under {}, found {} items",
            files.len(),
            self.root.display(),
            items.len()
        );
        self.items = items;
        Ok(&self.items)
    }

    /// Compiled grammar for `settings`, reusing the previous one when the
    /// columns and priority labels are unchanged.
    fn patterns_for(&mut self, settings: &Settings) -> Result<Arc<CompiledPatterns>> {
        if let Some((cached_settings, patterns)) = &self.compiled {
            if cached_settings.same_grammar(settings) {
                return Ok(Arc::clone(patterns));
            }
        }

        let patterns = Arc::new(CompiledPatterns::compile(settings)?);
        self.compiled = Some((settings.clone(), Arc::clone(&patterns)));
        Ok(patterns)
    }

    pub fn find_item(&self, id: usize) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn find_item_mut(&mut self, id: usize) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    pub fn items_by_type(&self, item_type: &str) -> Vec<&Item> {
        self.items.iter().filter(|item| item.item_type == item_type).collect()
    }

    pub fn items_by_status(&self, status: &str) -> Vec<&Item> {
        self.items.iter().filter(|item| item.status == status).collect()
    }

    pub fn items_by_priority(&self, priority: ItemPriority) -> Vec<&Item> {
        self.items.iter().filter(|item| item.priority == priority).collect()
    }

    pub fn items_by_category(&self) -> BTreeMap<String, Vec<&Item>> {
        let mut categories: BTreeMap<String, Vec<&Item>> = BTreeMap::new();
        for item in &self.items {
            categories.entry(item.item_type.clone()).or_default().push(item);
        }
        categories
    }

    /// Moves items below `after_line` in `file` by `delta` lines after a
    /// rewrite grew or shrank that file.
    pub fn shift_lines(&mut self, file: &str, after_line: usize, delta: isize) {
        if delta == 0 {
            return;
        }
        for item in self.items.iter_mut().filter(|item| item.file == file && item.line > after_line) {
            item.line = item.line.saturating_add_signed(delta);
        }
    }

    /// Carries in-memory statuses over a column rename. Columns are matched by
    /// position; returns whether any item changed.
    pub fn update_old_statuses(&mut self, old: &Settings, new: &Settings) -> bool {
        let renamed: HashMap<&str, &str> = old
            .kanban_columns
            .iter()
            .zip(new.kanban_columns.iter())
            .filter(|(before, after)| before.id != after.id)
            .map(|(before, after)| (before.id.as_str(), after.id.as_str()))
            .collect();

        if renamed.is_empty() {
            return false;
        }

        let mut changed = false;
        for item in &mut self.items {
            if let Some(new_id) = renamed.get(item.status.as_str()) {
                item.status = new_id.to_string();
                changed = true;
            }
            for entry in &mut item.history {
                if let Some(new_id) = renamed.get(entry.status.as_str()) {
                    entry.status = new_id.to_string();
                }
            }
        }
        changed
    }
}

/// Parses every item in one file. `next_id` is the scan-wide counter.
pub fn parse_source(
    source: &str,
    relative_path: &str,
    ctx: &ParseContext<'_>,
    next_id: &mut usize,
) -> Vec<Item> {
    let lines: Vec<&str> = source.lines().collect();
    let patterns = ctx.patterns;
    let mut items = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some((item_type, title)) = patterns.match_item(lines[i]) else {
            i += 1;
            continue;
        };

        let marker_line = i + 1;
        let mut descriptions = Vec::new();
        let mut history = Vec::new();
        let mut status = ctx.first_column.to_string();
        let mut priority = ItemPriority::Low;

        let mut j = i + 1;
        while j < lines.len() {
            let line = lines[j];
            if patterns.is_item_line(line) {
                break;
            }

            if let Some(status_line) = patterns.match_status(line) {
                // Last annotation in file order wins, whatever its timestamp.
                if let StatusLine::Annotation(annotation) = status_line {
                    status = annotation.status.clone();
                    history.push(StatusHistory {
                        status: annotation.status,
                        timestamp: local_to_utc(annotation.timestamp),
                        user: annotation.user,
                    });
                }
            } else if let Some(found) = patterns.match_priority(line) {
                priority = found;
            } else if let Some(text) = patterns.match_description(line) {
                if !patterns.is_label(&text) {
                    descriptions.push(text);
                }
            } else {
                break;
            }
            j += 1;
        }

        if history.is_empty() {
            history.push(StatusHistory {
                status: ctx.first_column.to_string(),
                timestamp: ctx.now,
                user: ctx.user.to_string(),
            });
        }

        *next_id += 1;
        items.push(Item {
            id: *next_id,
            item_type,
            title,
            description: descriptions.join("\n"),
            file: relative_path.to_string(),
            line: marker_line,
            status,
            priority,
            history,
            created_at: ctx.now,
            updated_at: ctx.now,
            current_user: ctx.user.to_string(),
        });

        i = j;
    }

    items
}

/// Annotation timestamps are written in local wall-clock time.
fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

fn read_source(path: &Path) -> Option<String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Skipping {}: {}", path.display(), e);
            return None;
        }
    };

    match String::from_utf8(bytes) {
        Ok(source) => Some(source),
        Err(_) => {
            log::debug!("Skipping non UTF-8 file {}", path.display());
            None
        }
    }
}

/// Lists scannable files as `(absolute, relative)` pairs in lexical order.
/// Relative paths always use `/`.
pub(crate) fn walk_files(root: &Path, scan: &CodeScanSettings) -> Vec<(PathBuf, String)> {
    let excludes: Vec<Pattern> = scan
        .exclude_files
        .iter()
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                log::warn!("Ignoring invalid exclude pattern '{}': {}", raw, e);
                None
            }
        })
        .collect();

    fn walk_recursive(
        dir: &Path,
        prefix: &str,
        scan: &CodeScanSettings,
        excludes: &[Pattern],
        files: &mut Vec<(PathBuf, String)>,
    ) {
        let mut entries: Vec<fs::DirEntry> = match fs::read_dir(dir) {
            Ok(entries) => entries.flatten().collect(),
            Err(e) => {
                log::warn!("Cannot read directory {}: {}", dir.display(), e);
                return;
            }
        };
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let relative = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };

            if file_type.is_dir() {
                if scan.exclude_directories.iter().any(|excluded| *excluded == name) {
                    continue;
                }
                walk_recursive(&entry.path(), &relative, scan, excludes, files);
            } else if file_type.is_file() {
                if is_excluded_file(&relative, &name, excludes) {
                    continue;
                }
                let too_large = entry
                    .metadata()
                    .map(|meta| meta.len() > MAX_SCAN_FILE_SIZE)
                    .unwrap_or(false);
                if too_large {
                    log::debug!("Skipping large file {}", relative);
                    continue;
                }
                files.push((entry.path(), relative));
            }
        }
    }

    let mut files = Vec::new();
    walk_recursive(root, "", scan, &excludes, &mut files);
    files
}

/// Globs match the root-relative path; globs without `/` also match the bare
/// file name so `*.png` excludes images at any depth.
fn is_excluded_file(relative: &str, name: &str, excludes: &[Pattern]) -> bool {
    excludes.iter().any(|pattern| {
        pattern.matches_with(relative, GLOB_OPTIONS)
            || (!pattern.as_str().contains('/') && pattern.matches_with(name, GLOB_OPTIONS))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::KanbanColumn;
    use chrono::Timelike;

    fn parse(source: &str) -> Vec<Item> {
        let patterns = CompiledPatterns::compile(&Settings::default()).unwrap();
        let ctx = ParseContext {
            patterns: &patterns,
            first_column: "todo",
            user: "tester",
            now: Utc::now(),
        };
        let mut next_id = 0;
        parse_source(source, "src/lib.rs", &ctx, &mut next_id)
    }

    #[test]
    fn annotation_sets_status_and_history() {
        let items = parse("// TODO: fix x\n// DONE 2024-01-02 09:00 by alice\nfn x() {}\n");
        assert_eq!(items.len(), 1);

        let item = &items[0];
        assert_eq!(item.status, "done");
        assert_eq!(item.line, 1);
        assert_eq!(item.history.len(), 1);
        assert_eq!(item.history[0].status, "done");
        assert_eq!(item.history[0].user, "alice");

        let local = item.history[0].timestamp.with_timezone(&Local);
        assert_eq!(local.format("%Y-%m-%d").to_string(), "2024-01-02");
        assert_eq!((local.hour(), local.minute()), (9, 0));
    }

    #[test]
    fn unannotated_item_gets_synthetic_history() {
        let items = parse("fn main() {}\n    // FIXME: handle errors\n");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_type, "FIXME");
        assert_eq!(items[0].title, "handle errors");
        assert_eq!(items[0].line, 2);
        assert_eq!(items[0].status, "todo");
        assert_eq!(items[0].priority, ItemPriority::Low);
        assert_eq!(items[0].history.len(), 1);
        assert_eq!(items[0].history[0].user, "tester");
    }

    #[test]
    fn block_collects_description_and_priority() {
        let source = "\
// TODO: refactor parser
// the tokenizer is quadratic
// HIGH
// and leaks memory
let x = 1;
// unrelated comment
";
        let items = parse(source);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].priority, ItemPriority::High);
        assert_eq!(items[0].description, "the tokenizer is quadratic\nand leaks memory");
    }

    #[test]
    fn last_annotation_in_file_order_wins() {
        let source = "\
# TODO: ship it
# DONE 2024-05-01 10:00 by bob
# IN PROGRESS 2024-01-01 10:00 by alice
";
        let items = parse(source);
        assert_eq!(items[0].status, "in_progress");
        assert_eq!(items[0].history.len(), 2);
        assert_eq!(items[0].history[1].user, "alice");
    }

    #[test]
    fn bare_labels_are_not_description() {
        let source = "// TODO: a\n// DONE\n// MEDIUM\n// real text\n";
        let items = parse(source);
        assert_eq!(items[0].description, "real text");
        assert_eq!(items[0].priority, ItemPriority::Medium);
        // A lone column name is neither an annotation nor a description line.
        assert_eq!(items[0].status, "todo");
    }

    #[test]
    fn consecutive_markers_are_separate_items_with_sequential_ids() {
        let items = parse("// TODO: first\n// FIXME: second\n// detail\n");
        assert_eq!(items.len(), 2);
        assert_eq!((items[0].id, items[1].id), (1, 2));
        assert_eq!(items[0].description, "");
        assert_eq!(items[1].description, "detail");
        assert_eq!(items[1].line, 2);
    }

    #[test]
    fn empty_comment_line_ends_block() {
        let items = parse("// TODO: a\n//\n// not part of it\n");
        assert_eq!(items[0].description, "");
    }

    #[test]
    fn scan_respects_exclusions_and_resets_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("src/main.rs"), "// TODO: keep me\n").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "// TODO: excluded dir\n").unwrap();
        fs::write(root.join("src/app.min.js"), "// TODO: excluded glob\n").unwrap();

        let mut scanner = Scanner::new(root);
        let settings = Settings::default();
        let items = scanner.scan(&settings).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].file, "src/main.rs");
        assert_eq!(items[0].id, 1);

        let again = scanner.scan(&settings).unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, 1);
    }

    #[test]
    fn scan_without_columns_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.rs"), "// TODO: x\n").unwrap();

        let settings = Settings {
            kanban_columns: vec![],
            ..Settings::default()
        };
        let mut scanner = Scanner::new(tmp.path());
        assert!(scanner.scan(&settings).unwrap().is_empty());
    }

    #[test]
    fn path_globs_do_not_cross_directories() {
        let excludes = vec![Pattern::new("gen/*.rs").unwrap()];
        assert!(is_excluded_file("gen/a.rs", "a.rs", &excludes));
        assert!(!is_excluded_file("src/gen/a.rs", "a.rs", &excludes));

        let deep = vec![Pattern::new("**/fixtures/**").unwrap()];
        assert!(is_excluded_file("tests/fixtures/x.rs", "x.rs", &deep));
    }

    #[test]
    fn queries_filter_the_latest_scan() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("a.rs"),
            "// TODO: one\n// HIGH\n// FIXME: two\n// DONE 2024-01-02 09:00 by alice\n// TODO: three\n",
        )
        .unwrap();

        let mut scanner = Scanner::new(tmp.path());
        scanner.scan(&Settings::default()).unwrap();

        assert_eq!(scanner.find_item(2).map(|item| item.title.as_str()), Some("two"));
        assert!(scanner.find_item(4).is_none());

        let todos: Vec<&str> = scanner.items_by_type("TODO").iter().map(|i| i.title.as_str()).collect();
        assert_eq!(todos, vec!["one", "three"]);
        assert_eq!(scanner.items_by_status("done").len(), 1);
        assert_eq!(scanner.items_by_status("todo").len(), 2);

        let high = scanner.items_by_priority(ItemPriority::High);
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].title, "one");

        let categories = scanner.items_by_category();
        assert_eq!(categories.keys().collect::<Vec<_>>(), vec!["FIXME", "TODO"]);
        assert_eq!(categories["TODO"].len(), 2);
    }

    #[test]
    fn shift_lines_moves_only_later_items_in_the_same_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.rs"), "// TODO: one\n\n// TODO: two\n").unwrap();
        fs::write(tmp.path().join("b.rs"), "\n\n\n// TODO: other\n").unwrap();

        let mut scanner = Scanner::new(tmp.path());
        scanner.scan(&Settings::default()).unwrap();
        scanner.shift_lines("a.rs", 1, 1);

        let lines: Vec<(&str, usize)> = scanner.items().iter().map(|i| (i.title.as_str(), i.line)).collect();
        assert_eq!(lines, vec![("one", 1), ("two", 4), ("other", 4)]);
    }

    #[test]
    fn update_old_statuses_follows_positional_rename() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("a.rs"),
            "// TODO: x\n// DONE 2024-01-02 09:00 by alice\n",
        )
        .unwrap();

        let old = Settings::default();
        let mut scanner = Scanner::new(tmp.path());
        scanner.scan(&old).unwrap();

        let mut new = old.clone();
        new.kanban_columns[2] = KanbanColumn {
            id: "shipped".to_string(),
            ..new.kanban_columns[2].clone()
        };

        assert!(scanner.update_old_statuses(&old, &new));
        let item = &scanner.items()[0];
        assert_eq!(item.status, "shipped");
        assert_eq!(item.history[0].status, "shipped");
        assert!(!scanner.update_old_statuses(&new, &new));
    }
}
