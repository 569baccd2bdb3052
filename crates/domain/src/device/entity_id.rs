use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Value object representing the entity id segment of a device's topics
///
/// Rules:
/// - Must be non-empty
/// - Must not contain topic separators or wildcards (`/`, `+`, `#`)
/// - Must not contain whitespace
/// - Max length 100 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Create a new EntityId with validation
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(DomainError::InvalidEntityId(
                "Entity ID cannot be empty".to_string(),
            ));
        }

        if id.len() > 100 {
            return Err(DomainError::InvalidEntityId(format!(
                "Entity ID too long: {} chars (max 100)",
                id.len()
            )));
        }

        if id
            .chars()
            .any(|c| c == '/' || c == '+' || c == '#' || c.is_whitespace())
        {
            return Err(DomainError::InvalidEntityId(format!(
                "Entity ID {id} must not contain '/', '+', '#' or whitespace"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
