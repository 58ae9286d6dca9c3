use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Row identifier, generated fresh for every version of every entity.
///
/// Surrogate keys are UUID v7 so they sort roughly by creation time. A key is
/// never reused and never changes after the row is inserted; dependent
/// entities reference a specific version through it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateKey(uuid::Uuid);

impl SurrogateKey {
    /// Generate a new time-ordered surrogate key (UUID v7).
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The nil key, used as a placeholder before insertion.
    pub const fn nil() -> Self {
        Self(uuid::Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl fmt::Debug for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurrogateKey({})", self.short_id())
    }
}

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SurrogateKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidSurrogateKey(format!("{s}: {e}")))
    }
}

/// Stable external identifier shared by every version of one entity.
///
/// Construction goes through [`BusinessKey::new`], which rejects empty and
/// whitespace-only strings. Deserialization applies the same check.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BusinessKey(String);

impl BusinessKey {
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(TypeError::EmptyBusinessKey);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for BusinessKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for BusinessKey {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BusinessKey> for String {
    fn from(key: BusinessKey) -> Self {
        key.0
    }
}

impl FromStr for BusinessKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for BusinessKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BusinessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BusinessKey({})", self.0)
    }
}

impl fmt::Display for BusinessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surrogate_keys_are_unique() {
        let a = SurrogateKey::generate();
        let b = SurrogateKey::generate();
        assert_ne!(a, b);
        assert!(!a.is_nil());
    }

    #[test]
    fn surrogate_key_parse_roundtrip() {
        let key = SurrogateKey::generate();
        let parsed: SurrogateKey = key.to_string().parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn surrogate_key_rejects_garbage() {
        let err = "not-a-uuid".parse::<SurrogateKey>().unwrap_err();
        assert!(matches!(err, TypeError::InvalidSurrogateKey(_)));
    }

    #[test]
    fn nil_key() {
        assert!(SurrogateKey::nil().is_nil());
    }

    #[test]
    fn business_key_rejects_empty() {
        assert_eq!(BusinessKey::new(""), Err(TypeError::EmptyBusinessKey));
        assert_eq!(BusinessKey::new("   "), Err(TypeError::EmptyBusinessKey));
    }

    #[test]
    fn business_key_accepts_text() {
        let key = BusinessKey::new("job-1").unwrap();
        assert_eq!(key.as_str(), "job-1");
        assert_eq!(format!("{key}"), "job-1");
    }

    #[test]
    fn business_key_serde_validates() {
        let ok: BusinessKey = serde_json::from_str("\"job-7\"").unwrap();
        assert_eq!(ok.as_str(), "job-7");
        assert!(serde_json::from_str::<BusinessKey>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"job-7\"");
    }
}
