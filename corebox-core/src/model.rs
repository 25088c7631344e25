//! Plain data shared by the reconciliation workflow.

use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

use crate::contract::ImageItem;

/// A scalar field kept as trimmed text so comparisons can try numeric
/// coercion first and fall back to the exact text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldValue(String);

impl FieldValue {
    pub fn new(raw: impl AsRef<str>) -> Self {
        FieldValue(raw.as_ref().trim().to_string())
    }

    /// JSON scalar to text; `null`, blank strings, arrays and objects are absent.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(FieldValue::new(s)),
            Value::Number(n) => Some(FieldValue(n.to_string())),
            Value::Bool(b) => Some(FieldValue(b.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.0.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Integer view. Integral decimals such as `2.0` also coerce, matching
    /// how the portal sometimes serialises enum codes.
    pub fn as_i64(&self) -> Option<i64> {
        if let Ok(v) = self.0.parse::<i64>() {
            return Some(v);
        }
        self.as_f64()
            .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
            .map(|v| v as i64)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Portal image standard type, derived from the free-text condition label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardType {
    Dry = 1,
    /// Anything whose label is not "dry".
    Wet = 2,
}

impl StandardType {
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("dry") {
            StandardType::Dry
        } else {
            StandardType::Wet
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A locally described image waiting to be uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedImage {
    pub hole_name: String,
    pub depth_from: FieldValue,
    pub depth_to: FieldValue,
    pub image_type_label: String,
    pub local_path: PathBuf,
    pub original_filename: String,
}

impl StagedImage {
    pub fn standard_type(&self) -> StandardType {
        StandardType::from_label(&self.image_type_label)
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            hole_name: self.hole_name.trim().to_string(),
            depth_from: self.depth_from.clone(),
            depth_to: self.depth_to.clone(),
            standard_type: FieldValue(self.standard_type().code().to_string()),
        }
    }

    /// `hole_from_to_type`, the label used in operator logs.
    pub fn display_name(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.hole_name,
            self.depth_from,
            self.depth_to,
            self.standard_type().code()
        )
    }
}

/// The four fields that decide whether two image records are the same upload.
///
/// `==` compares raw text only; identity is [`IdentityKey::matches`].
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityKey {
    pub hole_name: String,
    pub depth_from: FieldValue,
    pub depth_to: FieldValue,
    pub standard_type: FieldValue,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.hole_name, self.depth_from, self.depth_to, self.standard_type
        )
    }
}

/// Which required field a remote image lacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingField(pub &'static str);

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing field `{}`", self.0)
    }
}

/// An image the portal already holds, reduced to what identity comparison needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteImageRecord {
    pub id: String,
    pub key: IdentityKey,
    pub file_name: Option<String>,
}

impl RemoteImageRecord {
    pub fn from_item(item: &ImageItem) -> Result<Self, MissingField> {
        let id = item
            .id
            .as_ref()
            .and_then(FieldValue::from_json)
            .ok_or(MissingField("id"))?;
        let hole_name = item
            .hole_name()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(MissingField("drillHole.name"))?;
        let depth_from = item
            .depth_from
            .as_ref()
            .and_then(FieldValue::from_json)
            .ok_or(MissingField("depthFrom"))?;
        let depth_to = item
            .depth_to
            .as_ref()
            .and_then(FieldValue::from_json)
            .ok_or(MissingField("depthTo"))?;
        let standard_type = item
            .standard_type
            .as_ref()
            .and_then(FieldValue::from_json)
            .ok_or(MissingField("standardType"))?;

        Ok(RemoteImageRecord {
            id: id.as_str().to_string(),
            key: IdentityKey {
                hole_name: hole_name.to_string(),
                depth_from,
                depth_to,
                standard_type,
            },
            file_name: item.first_file_name().map(str::to_owned),
        })
    }

    pub fn hole_name(&self) -> &str {
        &self.key.hole_name
    }
}
