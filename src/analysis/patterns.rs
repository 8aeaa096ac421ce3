use crate::error::Result;
use crate::models::item::ItemPriority;
use crate::models::settings::Settings;
use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::HashMap;

/// Comment openers recognised by the scanner, regardless of file type.
const COMMENT_PREFIX: &str = r"(?://|#|--|<!--)";

pub const ANNOTATION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Scan grammar compiled from one version of the settings.
///
/// Patterns built from an empty alternation are `None` and never match, so a
/// project without columns scans to zero items.
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    item: Option<Regex>,
    description: Regex,
    priority: Option<Regex>,
    status: Option<Regex>,
    strip: Option<Regex>,
    priority_labels: Vec<(String, ItemPriority)>,
    status_ids: HashMap<String, String>,
    labels: Vec<String>,
}

/// A line shaped like a status annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLine {
    Annotation(StatusAnnotation),
    /// Column name and `by` are there but the timestamp does not parse.
    BadTimestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusAnnotation {
    pub status: String,
    pub timestamp: NaiveDateTime,
    pub user: String,
}

impl CompiledPatterns {
    pub fn compile(settings: &Settings) -> Result<Self> {
        let mut keywords = Vec::new();
        let mut annotation_names = Vec::new();
        let mut status_ids = HashMap::new();

        for col in &settings.kanban_columns {
            if col.is_keyword_entered() {
                keywords.extend(col.keywords());
            } else if !col.name.trim().is_empty() {
                annotation_names.push(col.name.trim().to_string());
                status_ids.insert(col.name.trim().to_lowercase(), col.id.clone());
            }
        }

        let p = &settings.priority_patterns;
        let priority_labels: Vec<(String, ItemPriority)> = [
            (p.low.trim(), ItemPriority::Low),
            (p.medium.trim(), ItemPriority::Medium),
            (p.high.trim(), ItemPriority::High),
        ]
        .into_iter()
        .filter(|(label, _)| !label.is_empty())
        .map(|(label, priority)| (label.to_string(), priority))
        .collect();

        let item = alternation(&keywords)
            .map(|kw| Regex::new(&format!(r"^\s*{COMMENT_PREFIX}\s*({kw}):\s*(.*)$")))
            .transpose()?;

        let description = Regex::new(&format!(r"^\s*{COMMENT_PREFIX}\s*(.+)$"))?;

        let labels: Vec<String> = priority_labels.iter().map(|(l, _)| l.clone()).collect();
        let priority = alternation(&labels)
            .map(|alt| Regex::new(&format!(r"^\s*{COMMENT_PREFIX}\s*({alt})(?:\s|-->|$)")))
            .transpose()?;

        let status = alternation(&annotation_names)
            .map(|names| {
                Regex::new(&format!(
                    r"^\s*{COMMENT_PREFIX}\s*({names})\s+(\d{{4}}-\d{{2}}-\d{{2}}\s+\d{{2}}:\d{{2}})\s+by\s+(.+?)(?:\s*-->)?\s*$"
                ))
            })
            .transpose()?;

        let mut every_marker = keywords.clone();
        every_marker.extend(annotation_names.iter().cloned());
        let strip = alternation(&every_marker)
            .map(|alt| Regex::new(&format!(r"^\s*{COMMENT_PREFIX}\s*({alt})(?::|\s|$)")))
            .transpose()?;

        let mut all_labels = labels;
        all_labels.extend(
            settings
                .kanban_columns
                .iter()
                .map(|col| col.name.trim().to_string())
                .filter(|name| !name.is_empty()),
        );

        Ok(Self {
            item,
            description,
            priority,
            status,
            strip,
            priority_labels,
            status_ids,
            labels: all_labels,
        })
    }

    /// `(keyword, title)` when the line opens a new item.
    pub fn match_item(&self, line: &str) -> Option<(String, String)> {
        let caps = self.item.as_ref()?.captures(line)?;
        let keyword = caps.get(1)?.as_str().to_string();
        let title = caps
            .get(2)
            .map(|m| strip_html_close(m.as_str()))
            .unwrap_or_default();
        Some((keyword, title))
    }

    pub fn is_item_line(&self, line: &str) -> bool {
        self.item.as_ref().is_some_and(|re| re.is_match(line))
    }

    /// Text of any comment line, with the prefix removed.
    pub fn match_description(&self, line: &str) -> Option<String> {
        let caps = self.description.captures(line)?;
        let text = strip_html_close(caps.get(1)?.as_str());
        (!text.is_empty()).then_some(text)
    }

    pub fn match_priority(&self, line: &str) -> Option<ItemPriority> {
        let caps = self.priority.as_ref()?.captures(line)?;
        let label = caps.get(1)?.as_str();
        self.priority_labels
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, priority)| *priority)
    }

    /// Parses a status annotation. Lines that look like one but carry an
    /// unparsable timestamp yield [`StatusLine::BadTimestamp`].
    pub fn match_status(&self, line: &str) -> Option<StatusLine> {
        let caps = self.status.as_ref()?.captures(line)?;
        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let raw_time = caps
            .get(2)
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        let user = caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default();

        let Ok(timestamp) = NaiveDateTime::parse_from_str(&raw_time, ANNOTATION_TIME_FORMAT) else {
            return Some(StatusLine::BadTimestamp);
        };

        Some(StatusLine::Annotation(StatusAnnotation {
            status: self.status_id_for(name),
            timestamp,
            user,
        }))
    }

    /// Lines the rewriter removes from a block before writing the new annotation.
    pub fn is_status_marker(&self, line: &str) -> bool {
        self.strip.as_ref().is_some_and(|re| re.is_match(line))
    }

    /// True when `text` is exactly a priority label or a column name.
    pub fn is_label(&self, text: &str) -> bool {
        self.labels.iter().any(|label| label == text)
    }

    fn status_id_for(&self, name: &str) -> String {
        self.status_ids
            .get(&name.trim().to_lowercase())
            .cloned()
            .unwrap_or_else(|| snake_case(name))
    }
}

fn alternation(words: &[String]) -> Option<String> {
    let escaped: Vec<String> = words
        .iter()
        .filter(|w| !w.is_empty())
        .map(|w| regex::escape(w))
        .collect();
    (!escaped.is_empty()).then(|| escaped.join("|"))
}

fn strip_html_close(text: &str) -> String {
    let trimmed = text.trim();
    trimmed.strip_suffix("-->").unwrap_or(trimmed).trim().to_string()
}

pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::{KanbanColumn, Settings};

    fn patterns() -> CompiledPatterns {
        CompiledPatterns::compile(&Settings::default()).unwrap()
    }

    #[test]
    fn matches_marker_with_any_comment_prefix() {
        let p = patterns();
        assert_eq!(
            p.match_item("    // TODO: fix parser"),
            Some(("TODO".to_string(), "fix parser".to_string()))
        );
        assert_eq!(
            p.match_item("# FIXME: handle utf-8"),
            Some(("FIXME".to_string(), "handle utf-8".to_string()))
        );
        assert_eq!(
            p.match_item("<!-- TODO: alt text -->"),
            Some(("TODO".to_string(), "alt text".to_string()))
        );
        assert!(p.match_item("let todo = 1; // TODO: trailing").is_none());
        assert!(p.match_item("// TODO without colon").is_none());
    }

    #[test]
    fn parses_status_annotation_to_column_id() {
        let p = patterns();
        let Some(StatusLine::Annotation(parsed)) = p.match_status("// IN PROGRESS 2024-03-05 14:30 by Jane Doe")
        else {
            panic!("annotation not parsed");
        };
        assert_eq!(parsed.status, "in_progress");
        assert_eq!(parsed.user, "Jane Doe");
        assert_eq!(parsed.timestamp.format(ANNOTATION_TIME_FORMAT).to_string(), "2024-03-05 14:30");

        let Some(StatusLine::Annotation(html)) = p.match_status("<!-- DONE 2024-01-02 09:00 by alice -->") else {
            panic!("html annotation not parsed");
        };
        assert_eq!(html.status, "done");
        assert_eq!(html.user, "alice");
    }

    #[test]
    fn bad_annotation_timestamp_is_flagged() {
        let p = patterns();
        assert_eq!(p.match_status("// DONE 2024-13-45 99:99 by alice"), Some(StatusLine::BadTimestamp));
    }

    #[test]
    fn priority_requires_whole_label() {
        let p = patterns();
        assert_eq!(p.match_priority("// HIGH"), Some(ItemPriority::High));
        assert_eq!(p.match_priority("# MEDIUM because of users"), Some(ItemPriority::Medium));
        assert_eq!(p.match_priority("// HIGHLY unlikely"), None);
    }

    #[test]
    fn empty_columns_compile_to_matchless_grammar() {
        let settings = Settings {
            kanban_columns: vec![],
            ..Settings::default()
        };
        let p = CompiledPatterns::compile(&settings).unwrap();
        assert!(p.match_item("// TODO: anything").is_none());
        assert!(p.match_status("// DONE 2024-01-02 09:00 by alice").is_none());
        assert!(!p.is_status_marker("// TODO: anything"));
    }

    #[test]
    fn keywords_are_regex_escaped() {
        let settings = Settings {
            kanban_columns: vec![KanbanColumn {
                id: "todo".to_string(),
                name: "TODO".to_string(),
                color: String::new(),
                auto_assign_pattern: Some("C++|TODO".to_string()),
            }],
            ..Settings::default()
        };
        let p = CompiledPatterns::compile(&settings).unwrap();
        assert!(p.match_item("// C++: port me").is_some());
        assert!(p.match_item("// CCC: not a marker").is_none());
    }

    #[test]
    fn strip_pattern_covers_keywords_and_annotation_names() {
        let p = patterns();
        assert!(p.is_status_marker("// DONE 2024-01-02 09:00 by alice"));
        assert!(p.is_status_marker("// IN PROGRESS 2024-01-02 09:00 by alice"));
        assert!(p.is_status_marker("// TODO later"));
        assert!(!p.is_status_marker("// DONEness is relative"));
        assert!(!p.is_status_marker("// explain the edge case"));
    }

    #[test]
    fn snake_case_normalizes_names() {
        assert_eq!(snake_case("In Review"), "in_review");
        assert_eq!(snake_case("  QA--Ready "), "qa_ready");
    }
}
