//! Structured request from the orchestrator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::checks::Overrides;

/// Parameters and resolution choices for one operation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub params: Map<String, Value>,
    /// Overrides the configured auto mode when set.
    pub auto_resolve: Option<bool>,
    /// Check name to chosen option id.
    pub resolutions: BTreeMap<String, String>,
    pub overrides: Overrides,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_resolution(mut self, check: &str, option_id: &str) -> Self {
        self.resolutions
            .insert(check.to_string(), option_id.to_string());
        self
    }

    pub fn auto(mut self, auto_resolve: bool) -> Self {
        self.auto_resolve = Some(auto_resolve);
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Trimmed, non-empty string parameter.
    pub fn str_param(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Boolean parameter. Accepts JSON booleans and "true"/"false" strings.
    pub fn bool_param(&self, key: &str) -> Option<bool> {
        match self.params.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_params_are_trimmed() {
        let req = Request::new()
            .with_param("message", "  fix login  ")
            .with_param("blank", "   ")
            .with_param("count", 3);
        assert_eq!(req.str_param("message").as_deref(), Some("fix login"));
        assert_eq!(req.str_param("blank"), None);
        assert_eq!(req.str_param("count"), None);
        assert_eq!(req.str_param("missing"), None);
    }

    #[test]
    fn bool_params() {
        let req = Request::new()
            .with_param("a", true)
            .with_param("b", "false")
            .with_param("c", "nope");
        assert_eq!(req.bool_param("a"), Some(true));
        assert_eq!(req.bool_param("b"), Some(false));
        assert_eq!(req.bool_param("c"), None);
    }

    #[test]
    fn deserializes_partial_json() {
        let req: Request = serde_json::from_str(
            r#"{"params": {"description": "add login"}, "resolutions": {"working-tree-clean": "stash"}}"#,
        )
        .unwrap();
        assert_eq!(req.str_param("description").as_deref(), Some("add login"));
        assert_eq!(req.resolutions["working-tree-clean"], "stash");
        assert_eq!(req.auto_resolve, None);
    }
}
