//! Authenticated identity supplied by the identity collaborator

use serde::{Deserialize, Serialize};

/// The signed-in user, as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_creation() {
        let identity = Identity::new("user-123", "test@example.com").with_name("Test");
        assert_eq!(identity.id, "user-123");
        assert_eq!(identity.email, "test@example.com");
        assert_eq!(identity.name.as_deref(), Some("Test"));
    }
}
