//! Live platform view of a principal and its tags.

use serde::{Deserialize, Serialize};
use warden_types::{PrincipalId, TagId};

/// A capability tag as reported by the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    /// Position in the platform's role hierarchy; higher wins when the
    /// single-capability-tag policy has to pick one to keep.
    pub priority: i64,
    /// Managed tags (bot/integration-owned) are never stripped.
    pub managed: bool,
}

/// A principal as currently reported by the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    /// Display name as shown in the group (nickname or global name).
    pub display_name: String,
    pub is_bot: bool,
    pub tags: Vec<Tag>,
}

impl Principal {
    pub fn has_tag(&self, tag: &TagId) -> bool {
        self.tags.iter().any(|t| &t.id == tag)
    }

    /// Non-managed tags, i.e. those subject to the single-tag policy.
    pub fn capability_tags(&self) -> Vec<&Tag> {
        self.tags.iter().filter(|t| !t.managed).collect()
    }

    /// The highest-priority non-managed tag, if any.
    pub fn highest_capability_tag(&self) -> Option<&Tag> {
        self.capability_tags()
            .into_iter()
            .max_by_key(|t| t.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: &str, priority: i64, managed: bool) -> Tag {
        Tag {
            id: TagId::new(id),
            priority,
            managed,
        }
    }

    fn principal(tags: Vec<Tag>) -> Principal {
        Principal {
            id: PrincipalId::new("1"),
            display_name: "test".into(),
            is_bot: false,
            tags,
        }
    }

    #[test]
    fn has_tag_matches_by_id() {
        let p = principal(vec![tag("verified", 5, false)]);
        assert!(p.has_tag(&TagId::new("verified")));
        assert!(!p.has_tag(&TagId::new("jail")));
    }

    #[test]
    fn highest_capability_tag_ignores_managed() {
        let p = principal(vec![
            tag("bot-managed", 100, true),
            tag("verified", 5, false),
            tag("initiate", 1, false),
        ]);
        assert_eq!(
            p.highest_capability_tag().map(|t| t.id.as_str()),
            Some("verified")
        );
    }

    #[test]
    fn no_capability_tags() {
        let p = principal(vec![tag("bot-managed", 100, true)]);
        assert!(p.highest_capability_tag().is_none());
    }
}
