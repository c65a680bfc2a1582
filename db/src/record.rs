use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object_id::ImageId;

/// Tag set on records whose tags are still being generated in the background.
pub const PROCESSING_TAG: &str = "processing...";
/// Tag set on records when no automatic tagging was requested.
pub const DEFAULT_TAG: &str = "Personal";
pub const TAGGING_FAILED_TAG: &str = "tagging_failed";
pub const NO_TAGS_TAG: &str = "no_tags_available";

/// One user-visible image. The rendition keys are set when the record is
/// created and never change afterwards; re-enhancing an image creates a new
/// record that shares `original_key` with its source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: ImageId,
    pub owner: String,
    pub filename: String,
    pub display_name: String,
    pub original_key: String,
    pub enhanced_key: String,
    pub thumbnail_key: String,
    pub web_key: String,
    pub tags: Vec<String>,
    /// Byte length of the original upload.
    pub size: u64,
    pub upload_date: DateTime<Utc>,
    pub has_enhancements: bool,
}

impl ImageRecord {
    pub fn initial_tags(tagging_requested: bool) -> Vec<String> {
        let tag = if tagging_requested {
            PROCESSING_TAG
        } else {
            DEFAULT_TAG
        };
        vec![tag.to_string()]
    }

    pub fn is_processing(&self) -> bool {
        self.tags.len() == 1 && self.tags[0] == PROCESSING_TAG
    }

    /// The composite identifier of the record within the store's partition.
    pub fn sort_key(&self) -> String {
        sort_key(&self.owner, &self.id)
    }

    /// Apply the mutable fields of `patch`. Everything else on a record is
    /// fixed at creation.
    pub fn apply(&mut self, patch: ImagePatch) {
        if let Some(display_name) = patch.display_name {
            self.display_name = display_name;
        }

        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
    }
}

pub fn sort_key(owner: &str, id: &ImageId) -> String {
    format!("{owner}#{id}")
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePatch {
    pub display_name: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ImagePatch {
    pub fn tags(tags: Vec<String>) -> Self {
        ImagePatch {
            display_name: None,
            tags: Some(tags),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.tags.is_none()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let record = test_util::record("alice", "beach.jpg", 1234, Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["displayName"], "beach.jpg");
        assert_eq!(value["hasEnhancements"], false);
        assert_eq!(value["size"], 1234);
        assert!(value["uploadDate"].is_string());
        assert!(value["id"].as_str().unwrap().starts_with("img"));

        let back: ImageRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn patch_only_touches_mutable_fields() {
        let mut record = test_util::record("alice", "beach.jpg", 10, Utc::now());
        let before = record.clone();
        record.apply(ImagePatch::tags(vec!["sea".to_string(), "sand".to_string()]));
        assert_eq!(record.tags, vec!["sea", "sand"]);
        assert_eq!(record.display_name, before.display_name);
        assert_eq!(record.enhanced_key, before.enhanced_key);

        record.apply(ImagePatch {
            display_name: Some("Beach day".to_string()),
            tags: None,
        });
        assert_eq!(record.display_name, "Beach day");
        assert_eq!(record.tags, vec!["sea", "sand"]);
    }

    #[test]
    fn initial_tags() {
        assert_eq!(ImageRecord::initial_tags(true), vec![PROCESSING_TAG]);
        assert_eq!(ImageRecord::initial_tags(false), vec![DEFAULT_TAG]);
    }

    #[test]
    fn sort_key_format() {
        let record = test_util::record("alice", "a.png", 1, Utc::now());
        assert_eq!(record.sort_key(), format!("alice#{}", record.id));
    }
}
