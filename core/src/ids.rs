/// Canonical identifiers shared by posts, messages and users
use crate::error::{LostFoundError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User identifier as issued by the auth provider.
///
/// Equality is defined on the normalised form: surrounding whitespace is
/// dropped and ASCII letters are lowercased, so `"AbC "` and `"abc"` name
/// the same user. An empty id is never a valid `UserId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let normalized = raw.as_ref().trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(LostFoundError::InvalidArgument(
                "user id must not be empty".to_string(),
            ));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = LostFoundError;

    fn try_from(value: String) -> Result<Self> {
        UserId::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl FromStr for UserId {
    type Err = LostFoundError;

    fn from_str(s: &str) -> Result<Self> {
        UserId::new(s)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! numeric_id {
    ($name:ident, $what:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Big-endian key so sled iterates in id order
            pub fn to_key(self) -> [u8; 8] {
                self.0.to_be_bytes()
            }

            pub fn from_key(key: &[u8]) -> Option<Self> {
                let bytes: [u8; 8] = key.try_into().ok()?;
                Some(Self(u64::from_be_bytes(bytes)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = LostFoundError;

            fn from_str(s: &str) -> Result<Self> {
                s.trim().parse::<u64>().map($name).map_err(|_| {
                    LostFoundError::InvalidArgument(format!("invalid {}: {:?}", $what, s))
                })
            }
        }
    };
}

numeric_id!(PostId, "post id");
numeric_id!(MessageId, "message id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_normalizes_case_and_whitespace() {
        let a = UserId::new("  5F2C-AB ").unwrap();
        let b = UserId::new("5f2c-ab").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "5f2c-ab");
    }

    #[test]
    fn test_user_id_rejects_empty() {
        assert!(UserId::new("   ").is_err());
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
    }

    #[test]
    fn test_user_id_serde_uses_normalized_form() {
        let id: UserId = serde_json::from_str("\"ABC\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_numeric_ids_parse_and_key() {
        let id: PostId = "42".parse().unwrap();
        assert_eq!(id, PostId(42));
        assert_eq!(PostId::from_key(&id.to_key()), Some(id));
        assert!("forty".parse::<MessageId>().is_err());
        assert_eq!(PostId::from_key(b"short"), None);
    }
}
