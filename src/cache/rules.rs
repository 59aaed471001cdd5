//! Invalidation Rules
//!
//! Maps a change type to the key patterns that must be evicted when an
//! entity of that kind is written. The table is validated once at
//! construction and read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::cache::pattern::{self, WILDCARD};
use crate::error::{CacheError, Result};

// == Change Type ==
/// Category of write that drives rule-based invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    PropertyCreate,
    PropertyUpdate,
    PropertyDelete,
    UserProfileUpdate,
    FavoriteToggle,
    NotificationRead,
    MessageSent,
}

impl ChangeType {
    /// Every known change type.
    pub const ALL: [ChangeType; 7] = [
        ChangeType::PropertyCreate,
        ChangeType::PropertyUpdate,
        ChangeType::PropertyDelete,
        ChangeType::UserProfileUpdate,
        ChangeType::FavoriteToggle,
        ChangeType::NotificationRead,
        ChangeType::MessageSent,
    ];

    /// Wire name of the change type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::PropertyCreate => "property_create",
            ChangeType::PropertyUpdate => "property_update",
            ChangeType::PropertyDelete => "property_delete",
            ChangeType::UserProfileUpdate => "user_profile_update",
            ChangeType::FavoriteToggle => "favorite_toggle",
            ChangeType::NotificationRead => "notification_read",
            ChangeType::MessageSent => "message_sent",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known change type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown change type '{0}'")]
pub struct UnknownChangeType(pub String);

impl FromStr for ChangeType {
    type Err = UnknownChangeType;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ChangeType::ALL
            .into_iter()
            .find(|change| change.as_str() == s)
            .ok_or_else(|| UnknownChangeType(s.to_string()))
    }
}

// == Key Pattern ==
/// A key template attached to a change type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    /// One exact key.
    Literal(String),
    /// Template whose single `*` stands for the entity id. With an id the
    /// substituted key is removed; without one the template acts as a glob.
    Entity(String),
    /// Glob with a single `*`, always matched against every stored key.
    Family(String),
}

impl KeyPattern {
    pub fn literal(key: impl Into<String>) -> Self {
        KeyPattern::Literal(key.into())
    }

    pub fn entity(template: impl Into<String>) -> Self {
        KeyPattern::Entity(template.into())
    }

    pub fn family(glob: impl Into<String>) -> Self {
        KeyPattern::Family(glob.into())
    }

    /// The raw pattern text.
    pub fn as_str(&self) -> &str {
        match self {
            KeyPattern::Literal(s) | KeyPattern::Entity(s) | KeyPattern::Family(s) => s,
        }
    }

    fn validate(&self, change_type: ChangeType) -> Result<()> {
        let wildcards = pattern::wildcard_count(self.as_str());
        let reason = match self {
            KeyPattern::Literal(_) if wildcards != 0 => {
                Some(format!("is a literal but contains '{}'", WILDCARD))
            }
            KeyPattern::Entity(_) | KeyPattern::Family(_) if wildcards != 1 => Some(format!(
                "must contain exactly one '{}', found {}",
                WILDCARD, wildcards
            )),
            _ if self.as_str().is_empty() => Some("is empty".to_string()),
            _ => None,
        };

        match reason {
            Some(reason) => Err(CacheError::InvalidRule {
                change_type: change_type.to_string(),
                pattern: self.as_str().to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

// == Invalidation Target ==
/// What a single pattern resolves to for a concrete change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    /// Remove exactly this key
    Key(String),
    /// Remove every key matching this glob
    Pattern(String),
}

// == Invalidation Rules ==
/// Static table from change type to ordered key patterns.
#[derive(Debug, Clone, Default)]
pub struct InvalidationRules {
    rules: HashMap<ChangeType, Vec<KeyPattern>>,
}

impl InvalidationRules {
    /// Builds a validated table.
    ///
    /// Fails on the first pattern that does not fit its kind. Repeating a
    /// change type appends to its pattern list.
    pub fn new<I>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ChangeType, Vec<KeyPattern>)>,
    {
        let mut table: HashMap<ChangeType, Vec<KeyPattern>> = HashMap::new();
        for (change_type, patterns) in rules {
            for pattern in &patterns {
                pattern.validate(change_type)?;
            }
            table.entry(change_type).or_default().extend(patterns);
        }
        Ok(Self { rules: table })
    }

    /// A table with no rules.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rules for the property-listing domain.
    pub fn default_rules() -> Self {
        use KeyPattern as P;

        let rules: Vec<(ChangeType, Vec<KeyPattern>)> = vec![
            (
                ChangeType::PropertyCreate,
                vec![P::family("user_properties_*"), P::family("properties_*")],
            ),
            (
                ChangeType::PropertyUpdate,
                vec![P::entity("property_*"), P::family("properties_*")],
            ),
            (
                ChangeType::PropertyDelete,
                vec![
                    P::family("user_properties_*"),
                    P::entity("property_*"),
                    P::family("properties_*"),
                ],
            ),
            (
                ChangeType::UserProfileUpdate,
                vec![P::entity("user_profile_*")],
            ),
            (
                ChangeType::FavoriteToggle,
                vec![P::entity("user_favorites_*"), P::family("properties_*")],
            ),
            (
                ChangeType::NotificationRead,
                vec![P::entity("user_notifications_*")],
            ),
            (
                ChangeType::MessageSent,
                vec![P::entity("conversation_*"), P::family("conversations_*")],
            ),
        ];

        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// Patterns registered for a change type, empty if none.
    pub fn patterns(&self, change_type: ChangeType) -> &[KeyPattern] {
        self.rules
            .get(&change_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolves the patterns of `change_type` against an optional entity id.
    pub fn targets(&self, change_type: ChangeType, entity_id: Option<&str>) -> Vec<InvalidationTarget> {
        self.patterns(change_type)
            .iter()
            .map(|p| match (p, entity_id) {
                (KeyPattern::Literal(key), _) => InvalidationTarget::Key(key.clone()),
                (KeyPattern::Entity(template), Some(id)) => {
                    InvalidationTarget::Key(pattern::substitute(template, id))
                }
                (KeyPattern::Entity(glob), None) | (KeyPattern::Family(glob), _) => {
                    InvalidationTarget::Pattern(glob.clone())
                }
            })
            .collect()
    }

    /// Number of change types with rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
