use serde::{Deserialize, Serialize};
use std::fmt;

pub fn new_handle() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Opaque identifier for a console process. Stable across suspend/resume:
/// a resurrected instance keeps the handle recorded in its snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsoleHandle(String);

impl ConsoleHandle {
    pub fn new() -> Self {
        Self(new_handle())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConsoleHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ConsoleHandle {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConsoleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_handle_is_valid_uuid() {
        let handle = new_handle();
        let parsed = uuid::Uuid::parse_str(&handle);
        assert!(parsed.is_ok());
        assert_eq!(parsed.unwrap().get_version_num(), 4);
    }

    #[test]
    fn new_handle_is_unique() {
        let a = new_handle();
        let b = new_handle();
        assert_ne!(a, b);
    }

    #[test]
    fn console_handle_display_matches_as_str() {
        let handle = ConsoleHandle::new();
        assert_eq!(handle.to_string(), handle.as_str());
    }

    #[test]
    fn console_handle_from_string_round_trips() {
        let handle = ConsoleHandle::from("abc-123".to_string());
        assert_eq!(handle.as_str(), "abc-123");
    }

    #[test]
    fn console_handle_serialization() {
        let handle = ConsoleHandle::new();
        let json = serde_json::to_string(&handle).unwrap();
        let deserialized: ConsoleHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(handle, deserialized);
    }

    #[test]
    fn console_handle_equality_and_hash() {
        use std::collections::HashSet;
        let a = ConsoleHandle::new();
        let b = a.clone();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }
}
