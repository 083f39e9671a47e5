//! Admin notification payloads.
//!
//! Content formatting stays outside the core; this is just the structured
//! payload handed to the platform adapter. Field values are capped at the
//! platform's 1024-character embed limit.

use serde::{Deserialize, Serialize};

/// Maximum length the platform accepts for a single field value.
const MAX_FIELD_VALUE: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A structured admin notification (rendered as an embed by the adapter).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<NotificationField>,
}

impl Notification {
    pub fn new(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color,
            fields: Vec::new(),
        }
    }

    /// Append a field, truncating the value to the platform limit.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        let mut value = value.into();
        if value.len() > MAX_FIELD_VALUE {
            let mut cut = MAX_FIELD_VALUE;
            while !value.is_char_boundary(cut) {
                cut -= 1;
            }
            value.truncate(cut);
        }
        self.fields.push(NotificationField {
            name: name.into(),
            value,
            inline,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_values_are_truncated() {
        let n = Notification::new("t", "d", 0xff0000).field("long", "x".repeat(3000), false);
        assert_eq!(n.fields[0].value.len(), 1024);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let n = Notification::new("t", "d", 0).field("emoji", "🏴".repeat(400), true);
        assert!(n.fields[0].value.len() <= 1024);
        assert!(n.fields[0].value.chars().all(|c| c == '🏴'));
    }
}
