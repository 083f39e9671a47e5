//! Opaque identifier newtypes.
//!
//! The host platform hands out identifiers as strings (snowflakes or
//! similar); warden never interprets their contents, only compares them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Return the raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id! {
    /// The monitored community/server instance.
    GroupId
}

string_id! {
    /// An account/member participating in a group.
    PrincipalId
}

string_id! {
    /// A capability/role marker attached to a principal.
    TagId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_compare_by_value() {
        assert_eq!(PrincipalId::new("42"), PrincipalId::from("42"));
        assert_ne!(PrincipalId::new("42"), PrincipalId::new("99"));
    }

    #[test]
    fn display_is_raw_string() {
        assert_eq!(GroupId::new("g1").to_string(), "g1");
        assert_eq!(TagId::new("verified").as_str(), "verified");
    }
}
