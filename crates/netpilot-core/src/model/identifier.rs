// ── Profile identifiers ──
//
// Textual form is `name` for a global profile and `~user/name` for a user
// profile. The user hash travels alongside but never takes part in equality.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::ManagerError;

/// Identity of one profile layer.
#[derive(Debug, Clone, Default)]
pub struct ProfileIdentifier {
    /// Owning user, `None` for a global profile.
    pub user: Option<String>,
    pub name: String,
    /// Opaque per-user token supplied by the session manager.
    pub user_hash: String,
}

impl ProfileIdentifier {
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            user: None,
            name: name.into(),
            user_hash: String::new(),
        }
    }

    pub fn user(user: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            name: name.into(),
            user_hash: String::new(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.user.is_some()
    }

    /// Parse `name` or `~user/name`, validating each component.
    pub fn parse(text: &str) -> Result<Self, ManagerError> {
        let invalid = || ManagerError::invalid_arguments(format!("invalid profile name '{text}'"));
        if let Some(rest) = text.strip_prefix('~') {
            let (user, name) = rest.split_once('/').ok_or_else(invalid)?;
            if !is_valid_token(user) || !is_valid_token(name) {
                return Err(invalid());
            }
            Ok(Self::user(user, name))
        } else {
            if !is_valid_token(text) {
                return Err(invalid());
            }
            Ok(Self::global(text))
        }
    }
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl PartialEq for ProfileIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.user == other.user && self.name == other.name
    }
}

impl Eq for ProfileIdentifier {}

impl Hash for ProfileIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for ProfileIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "~{user}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for ProfileIdentifier {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
