use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Cryptographically random session identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty identifier marks a session that has never been saved.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl std::fmt::Display for SameSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lax => write!(f, "lax"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Cookie policy copied onto every session a store issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    /// Session lifetime in seconds. Non-positive means the session is being
    /// discarded: saving it deletes the row instead of writing it.
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: 60 * 60 * 24 * 30,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

/// How `load` treats a row whose expiry timestamp has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Public read path: loading an expired row is an error.
    RejectExpired,
    /// Forced load for rows already known to be expired. Used by the cleanup
    /// task to hand a fully-loaded session to the pre-delete observer.
    IgnoreExpiry,
}

/// A named session with its attribute bag and cookie policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Cookie/session name this session is scoped to.
    pub name: String,
    /// Opaque attribute bag, persisted as JSON.
    pub values: HashMap<String, serde_json::Value>,
    pub options: CookieOptions,
    pub is_new: bool,
}

impl Session {
    /// Creates an unsaved session with default options and an empty bag.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SessionId::default(),
            name: name.into(),
            values: HashMap::new(),
            options: CookieOptions::default(),
            is_new: true,
        }
    }

    /// Store a value in the attribute bag.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Serialize,
    ) -> Result<(), SessionError> {
        let value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.values.insert(key.into(), value);
        Ok(())
    }

    /// Read a value from the attribute bag, if present and of the right type.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Remove a value from the attribute bag.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }
}
