use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemPriority {
    #[default]
    Low,
    Medium,
    High,
}

impl ItemPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemPriority::Low => "LOW",
            ItemPriority::Medium => "MEDIUM",
            ItemPriority::High => "HIGH",
        }
    }
}

impl fmt::Display for ItemPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistory {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub user: String,
}

/// A marker comment found by the scanner.
///
/// `id` is only meaningful within the scan that produced it; use the
/// snapshot hash to follow an item across scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: usize,
    #[serde(rename = "type")]
    pub item_type: String,
    pub title: String,
    pub description: String,
    pub file: String,
    pub line: usize,
    pub status: String,
    pub priority: ItemPriority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<StatusHistory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_user: String,
}

impl Item {
    pub fn full_title(&self) -> String {
        format!("{}: {}", self.item_type, self.title)
    }

    /// Moves the item to `status`, recording the transition. No-op when unchanged.
    pub fn set_status(&mut self, status: &str, user: &str, now: DateTime<Utc>) {
        if self.status == status {
            return;
        }

        self.status = status.to_string();
        self.updated_at = now;
        self.current_user = user.to_string();
        self.history.push(StatusHistory {
            status: status.to_string(),
            timestamp: now,
            user: user.to_string(),
        });
    }

    /// The most recent history entry that put the item into `status`.
    pub fn last_transition_to(&self, status: &str) -> Option<&StatusHistory> {
        self.history.iter().rev().find(|entry| entry.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Item {
        let now = Utc::now();
        Item {
            id: 1,
            item_type: "TODO".to_string(),
            title: "fix parser".to_string(),
            description: String::new(),
            file: "src/lib.rs".to_string(),
            line: 3,
            status: "todo".to_string(),
            priority: ItemPriority::Low,
            history: vec![StatusHistory {
                status: "todo".to_string(),
                timestamp: now,
                user: "alice".to_string(),
            }],
            created_at: now,
            updated_at: now,
            current_user: "alice".to_string(),
        }
    }

    #[test]
    fn set_status_appends_history_once() {
        let mut item = sample();
        let now = Utc::now();
        item.set_status("done", "bob", now);
        item.set_status("done", "bob", now);

        assert_eq!(item.status, "done");
        assert_eq!(item.history.len(), 2);
        assert_eq!(item.last_transition_to("done").map(|h| h.user.as_str()), Some("bob"));
    }

    #[test]
    fn full_title_joins_type_and_title() {
        assert_eq!(sample().full_title(), "TODO: fix parser");
    }

    #[test]
    fn priority_serializes_uppercase() {
        let json = serde_json::to_string(&ItemPriority::Medium).unwrap();
        assert_eq!(json, "\"MEDIUM\"");
    }
}
