use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use visuasort_convert::{EnhancementOptions, FilterKind};

use crate::Result;

/// A boolean that clients send either as JSON `true` or as the string "true".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flag(pub bool);

pub fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Flag(b),
            Raw::Text(s) => Flag(parse_flag(&s)),
        })
    }
}

pub fn parse_filter(name: &str, strict: bool) -> Result<FilterKind> {
    if strict {
        Ok(name.parse()?)
    } else {
        Ok(FilterKind::parse_lenient(name))
    }
}

/// Enhancement options as they arrive in a JSON body. Missing fields take
/// the endpoint's defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsInput {
    pub auto_enhance: Option<Flag>,
    pub add_watermark: Option<Flag>,
    pub apply_filter: Option<String>,
}

impl OptionsInput {
    pub fn resolve(
        &self,
        defaults: &EnhancementOptions,
        strict: bool,
    ) -> Result<EnhancementOptions> {
        let apply_filter = match self.apply_filter.as_deref() {
            Some(name) => parse_filter(name, strict)?,
            None => defaults.apply_filter,
        };

        Ok(EnhancementOptions {
            auto_enhance: self.auto_enhance.map_or(defaults.auto_enhance, |f| f.0),
            add_watermark: self.add_watermark.map_or(defaults.add_watermark, |f| f.0),
            apply_filter,
        })
    }
}

/// Options from the text fields of a multipart upload, where everything is a
/// string and anything but "true" is false.
pub fn options_from_form(
    fields: &HashMap<String, String>,
    strict: bool,
) -> Result<EnhancementOptions> {
    let flag = |name: &str| fields.get(name).map(|v| parse_flag(v)).unwrap_or(false);
    let apply_filter = match fields.get("applyFilter") {
        Some(name) => parse_filter(name, strict)?,
        None => FilterKind::None,
    };

    Ok(EnhancementOptions {
        auto_enhance: flag("autoEnhance"),
        add_watermark: flag("addWatermark"),
        apply_filter,
    })
}
