//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for `POST /invalidate/pattern`
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidatePatternRequest {
    /// Glob where `*` matches any substring
    pub pattern: String,
}

impl InvalidatePatternRequest {
    /// Returns an error message if validation fails, None if valid.
    ///
    /// An empty pattern could only ever match an empty key, which is
    /// almost certainly a client bug.
    pub fn validate(&self) -> Option<String> {
        if self.pattern.is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        None
    }
}

/// Request body for `POST /invalidate/change`
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateChangeRequest {
    /// Change type name, e.g. `property_update`
    pub change_type: String,
    /// Id of the written entity, if any
    #[serde(default)]
    pub entity_id: Option<String>,
}

impl InvalidateChangeRequest {
    pub fn validate(&self) -> Option<String> {
        if self.change_type.is_empty() {
            return Some("Change type cannot be empty".to_string());
        }
        if matches!(self.entity_id.as_deref(), Some("")) {
            return Some("Entity id cannot be empty when present".to_string());
        }
        None
    }
}
