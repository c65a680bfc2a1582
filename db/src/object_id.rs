use std::{fmt, hash::Hash, marker::PhantomData, str::FromStr};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::new_uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObjectIdError {
    #[error("Invalid {kind} ID, expected the prefix {prefix}")]
    InvalidPrefix {
        kind: &'static str,
        prefix: &'static str,
    },

    #[error("Failed to decode {0} ID")]
    DecodeFailure(&'static str),
}

/// What an [ObjectId] identifies.
pub trait IdKind {
    const PREFIX: &'static str;
    const NAME: &'static str;
}

#[derive(Debug)]
pub enum ImageKind {}

impl IdKind for ImageKind {
    const PREFIX: &'static str = "img_";
    const NAME: &'static str = "image";
}

/// Staged uploads never become records, so their IDs are kept apart from
/// image IDs.
#[derive(Debug)]
pub enum StagingKind {}

impl IdKind for StagingKind {
    const PREFIX: &'static str = "stg_";
    const NAME: &'static str = "staging";
}

/// A ULID stored as a UUID and shown as `{prefix}{base64url}`. The string
/// form is safe in URLs and in asset keys, and new IDs sort by creation time.
pub struct ObjectId<K: IdKind> {
    uuid: Uuid,
    kind: PhantomData<fn() -> K>,
}

pub type ImageId = ObjectId<ImageKind>;
pub type StagingId = ObjectId<StagingKind>;

impl<K: IdKind> ObjectId<K> {
    pub fn new() -> Self {
        Self::from_uuid(new_uuid())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        ObjectId {
            uuid,
            kind: PhantomData,
        }
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.uuid
    }
}

impl<K: IdKind> Default for ObjectId<K> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual impls so that the marker type needs none of these traits.
impl<K: IdKind> Clone for ObjectId<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: IdKind> Copy for ObjectId<K> {}

impl<K: IdKind> PartialEq for ObjectId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl<K: IdKind> Eq for ObjectId<K> {}

impl<K: IdKind> PartialOrd for ObjectId<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: IdKind> Ord for ObjectId<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.uuid.cmp(&other.uuid)
    }
}

impl<K: IdKind> Hash for ObjectId<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid.hash(state)
    }
}

impl<K: IdKind> fmt::Debug for ObjectId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl<K: IdKind> fmt::Display for ObjectId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(K::PREFIX)?;
        f.write_str(&URL_SAFE_NO_PAD.encode(self.uuid.as_bytes()))
    }
}

impl<K: IdKind> FromStr for ObjectId<K> {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s.strip_prefix(K::PREFIX).ok_or(ObjectIdError::InvalidPrefix {
            kind: K::NAME,
            prefix: K::PREFIX,
        })?;

        URL_SAFE_NO_PAD
            .decode(encoded)
            .ok()
            .and_then(|bytes| Uuid::from_slice(&bytes).ok())
            .map(Self::from_uuid)
            .ok_or(ObjectIdError::DecodeFailure(K::NAME))
    }
}

impl<K: IdKind> Serialize for ObjectId<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, K: IdKind> Deserialize<'de> for ObjectId<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_its_own_output() {
        let id = ImageId::new();
        let s = id.to_string();
        assert!(s.starts_with("img_"));
        assert_eq!(s.parse::<ImageId>().unwrap(), id);
    }

    #[test]
    fn kinds_do_not_mix() {
        let staged = StagingId::new().to_string();
        assert_eq!(
            staged.parse::<ImageId>(),
            Err(ObjectIdError::InvalidPrefix {
                kind: "image",
                prefix: "img_"
            })
        );
        assert_eq!(
            "img_!!!".parse::<ImageId>(),
            Err(ObjectIdError::DecodeFailure("image"))
        );
        assert!("img_".parse::<ImageId>().is_err());
    }

    #[test]
    fn json_form_is_the_string() {
        let id = StagingId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
        assert_eq!(serde_json::from_value::<StagingId>(json).unwrap(), id);
        assert!(serde_json::from_str::<StagingId>("42").is_err());
    }

    #[test]
    fn newer_ids_sort_later() {
        let first = ImageId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ImageId::new();
        assert!(first < second);
        assert!(second
            .to_string()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
