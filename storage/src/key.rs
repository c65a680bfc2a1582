use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Prefix under which uploads are staged before processing.
pub const STAGING_PREFIX: &str = "staging";

/// One stored version of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rendition {
    Original,
    Enhanced,
    Thumbnail,
    Web,
}

impl Rendition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rendition::Original => "original",
            Rendition::Enhanced => "enhanced",
            Rendition::Thumbnail => "thumbnail",
            Rendition::Web => "web",
        }
    }
}

impl std::str::FromStr for Rendition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "original" => Ok(Rendition::Original),
            "enhanced" => Ok(Rendition::Enhanced),
            "thumbnail" => Ok(Rendition::Thumbnail),
            "web" => Ok(Rendition::Web),
            _ => Err(Error::InvalidKey(s.to_string())),
        }
    }
}

fn check_component(s: &str) -> Result<&str> {
    let valid = !s.is_empty()
        && s != "."
        && s != ".."
        && !s.contains(['/', '\\'])
        && !s.chars().any(|c| c.is_control());
    if valid {
        Ok(s)
    } else {
        Err(Error::InvalidKey(s.to_string()))
    }
}

/// The key of a rendition: `{owner}/{image_id}-{rendition}.{extension}`.
pub fn asset_key(owner: &str, image_id: &str, rendition: Rendition, extension: &str) -> Result<String> {
    Ok(format!(
        "{}/{}-{}.{}",
        check_component(owner)?,
        check_component(image_id)?,
        rendition.as_str(),
        check_component(extension)?
    ))
}

/// The key of a staged upload: `staging/{owner}/{staging_id}`.
pub fn staging_key(owner: &str, staging_id: &str) -> Result<String> {
    Ok(format!(
        "{STAGING_PREFIX}/{}/{}",
        check_component(owner)?,
        check_component(staging_id)?
    ))
}

/// True if `key` lives in `owner`'s namespace.
pub fn key_belongs_to(key: &str, owner: &str) -> bool {
    key.split_once('/')
        .map(|(prefix, rest)| prefix == owner && !rest.is_empty())
        .unwrap_or(false)
}

/// Content types of the image formats that get stored, by key extension.
pub const CONTENT_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("tiff", "image/tiff"),
];

/// The content type of the object at `key`, judged by its extension.
pub fn content_type_for_key(key: &str) -> &'static str {
    let extension = key
        .rsplit_once('/')
        .map_or(key, |(_, name)| name)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    extension
        .and_then(|ext| {
            CONTENT_TYPES
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, content_type)| *content_type)
        })
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendition_keys() {
        assert_eq!(
            asset_key("user-1", "img123", Rendition::Enhanced, "jpg").unwrap(),
            "user-1/img123-enhanced.jpg"
        );
        assert_eq!(
            asset_key("user-1", "img123", Rendition::Web, "webp").unwrap(),
            "user-1/img123-web.webp"
        );
        assert_eq!(staging_key("user-1", "abc").unwrap(), "staging/user-1/abc");
    }

    #[test]
    fn rejects_path_tricks() {
        assert!(asset_key("../etc", "x", Rendition::Original, "png").is_err());
        assert!(asset_key("..", "x", Rendition::Original, "png").is_err());
        assert!(asset_key("a", "", Rendition::Original, "png").is_err());
        assert!(staging_key("a", "b/c").is_err());
    }

    #[test]
    fn ownership() {
        assert!(key_belongs_to("alice/img-original.png", "alice"));
        assert!(!key_belongs_to("bob/img-original.png", "alice"));
        assert!(!key_belongs_to("alice", "alice"));
        assert!("thumbnail".parse::<Rendition>().is_ok());
        assert!("poster".parse::<Rendition>().is_err());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for_key("alice/i-web.webp"), "image/webp");
        assert_eq!(content_type_for_key("alice/i-original.JPG"), "image/jpeg");
        assert_eq!(content_type_for_key("staging/alice/stg_x"), "application/octet-stream");
        assert_eq!(content_type_for_key("weird.dir/noext"), "application/octet-stream");
    }
}
