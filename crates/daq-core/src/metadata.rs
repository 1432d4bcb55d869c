//! Per-image metadata tags.
//!
//! A [`Metadata`] set maps a qualified tag name (`"<device>-<name>"`, or just
//! `"<name>"` for tags without an owning device) to a [`MetadataTag`]. Tags hold
//! either a single value or an ordered list of values, always as strings.
//!
//! Two encodings are supported:
//! - serde (JSON), used by the CLI and logs
//! - a line-based interchange text ([`Metadata::serialize`] / [`Metadata::restore`]):
//!   the tag count, then one record per tag of
//!   `kind ("s" | "a")`, `name`, `device`, `read-only ("0" | "1")`, followed by the
//!   value for scalars or the value count and the values for arrays.
//!   Backslashes and newlines inside fields are escaped as `\\` and `\n`.

use crate::error::DaqError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known tag names injected by the acquisition pipeline.
pub mod tags {
    /// Image width in pixels.
    pub const WIDTH: &str = "Width";
    /// Image height in pixels.
    pub const HEIGHT: &str = "Height";
    /// Derived pixel type (`GRAY8`, `GRAY16`, ...).
    pub const PIXEL_TYPE: &str = "PixelType";
    /// Milliseconds since the buffer was initialized.
    pub const ELAPSED_TIME_MS: &str = "ElapsedTime-ms";
    /// Per-source running image counter.
    pub const IMAGE_NUMBER: &str = "ImageNumber";
    /// Channel index inside a multi-channel frame.
    pub const CAMERA_CHANNEL_INDEX: &str = "CameraChannelIndex";
    /// Time point index of the acquisition step.
    pub const FRAME: &str = "Frame";
    /// Position index of the acquisition step.
    pub const POSITION_INDEX: &str = "PositionIndex";
    /// Channel index of the acquisition step.
    pub const CHANNEL_INDEX: &str = "ChannelIndex";
    /// Slice index of the acquisition step.
    pub const SLICE_INDEX: &str = "SliceIndex";
    /// Name of the channel preset of the acquisition step.
    pub const CHANNEL: &str = "Channel";
    /// Label of the position bundle of the acquisition step.
    pub const POSITION_NAME: &str = "PositionName";
    /// Focus position commanded for the slice, in µm.
    pub const Z_POSITION_UM: &str = "ZPositionUm";
    /// Exposure of the channel in milliseconds.
    pub const EXPOSURE_MS: &str = "Exposure-ms";
}

/// Value of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    /// One value.
    Single(String),
    /// Ordered list of values.
    Array(Vec<String>),
}

/// One metadata entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTag {
    /// Tag name.
    pub name: String,
    /// Label of the owning device; empty for core tags.
    #[serde(default)]
    pub device: String,
    /// Read-only tags describe hardware state and are not user editable.
    #[serde(default)]
    pub read_only: bool,
    /// Tag value.
    pub value: TagValue,
}

impl MetadataTag {
    /// Scalar tag without an owning device.
    pub fn single(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            device: String::new(),
            read_only: false,
            value: TagValue::Single(value.to_string()),
        }
    }

    /// Array tag without an owning device.
    pub fn array<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            name: name.into(),
            device: String::new(),
            read_only: false,
            value: TagValue::Array(values.into_iter().map(|v| v.to_string()).collect()),
        }
    }

    /// Set the owning device label.
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Mark the tag read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// `"<device>-<name>"`, or `"<name>"` when the tag has no device.
    pub fn qualified_name(&self) -> String {
        if self.device.is_empty() {
            self.name.clone()
        } else {
            format!("{}-{}", self.device, self.name)
        }
    }

    /// Scalar value, or the first element of an array.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            TagValue::Single(v) => Some(v.as_str()),
            TagValue::Array(values) => values.first().map(String::as_str),
        }
    }
}

/// Set of tags keyed by qualified name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    tags: BTreeMap<String, MetadataTag>,
}

impl Metadata {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tag under its qualified name.
    pub fn put(&mut self, tag: MetadataTag) {
        self.tags.insert(tag.qualified_name(), tag);
    }

    /// Shorthand for a device-less scalar tag.
    pub fn put_single(&mut self, name: &str, value: impl ToString) {
        self.put(MetadataTag::single(name, value));
    }

    /// Look up by qualified name.
    pub fn get(&self, key: &str) -> Option<&MetadataTag> {
        self.tags.get(key)
    }

    /// Scalar value by qualified name.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.tags.get(key).and_then(MetadataTag::as_str)
    }

    /// True if a tag with this qualified name exists.
    pub fn contains(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    /// Remove a tag.
    pub fn remove(&mut self, key: &str) -> Option<MetadataTag> {
        self.tags.remove(key)
    }

    /// Copy every tag of `other` into `self`, overwriting on key collision.
    pub fn merge(&mut self, other: &Metadata) {
        for (key, tag) in &other.tags {
            self.tags.insert(key.clone(), tag.clone());
        }
    }

    /// Remove every tag.
    pub fn clear(&mut self) {
        self.tags.clear();
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// True when no tags are present.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Qualified tag names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    /// Tags in qualified-name order.
    pub fn iter(&self) -> impl Iterator<Item = &MetadataTag> {
        self.tags.values()
    }

    /// Encode as interchange text.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        push_line(&mut out, &self.tags.len().to_string());
        for tag in self.tags.values() {
            let kind = match tag.value {
                TagValue::Single(_) => "s",
                TagValue::Array(_) => "a",
            };
            push_line(&mut out, kind);
            push_line(&mut out, &escape(&tag.name));
            push_line(&mut out, &escape(&tag.device));
            push_line(&mut out, if tag.read_only { "1" } else { "0" });
            match &tag.value {
                TagValue::Single(v) => push_line(&mut out, &escape(v)),
                TagValue::Array(values) => {
                    push_line(&mut out, &values.len().to_string());
                    for v in values {
                        push_line(&mut out, &escape(v));
                    }
                }
            }
        }
        out
    }

    /// Decode interchange text produced by [`Metadata::serialize`].
    ///
    /// Replaces the current contents only on success.
    pub fn restore(&mut self, text: &str) -> Result<(), DaqError> {
        let mut lines = text.split('\n');
        let count = parse_count(next_field(&mut lines, "tag count")?, "tag count")?;

        let mut tags = BTreeMap::new();
        for _ in 0..count {
            let kind = next_field(&mut lines, "tag kind")?;
            let name = unescape(next_field(&mut lines, "tag name")?);
            let device = unescape(next_field(&mut lines, "tag device")?);
            let read_only = match next_field(&mut lines, "read-only flag")? {
                "0" => false,
                "1" => true,
                other => {
                    return Err(DaqError::MetadataFormat(format!(
                        "read-only flag must be 0 or 1, got '{other}'"
                    )))
                }
            };
            let value = match kind {
                "s" => TagValue::Single(unescape(next_field(&mut lines, "tag value")?)),
                "a" => {
                    let n = parse_count(next_field(&mut lines, "array length")?, "array length")?;
                    let mut values = Vec::new();
                    for _ in 0..n {
                        values.push(unescape(next_field(&mut lines, "array value")?));
                    }
                    TagValue::Array(values)
                }
                other => {
                    return Err(DaqError::MetadataFormat(format!(
                        "unknown tag kind '{other}'"
                    )))
                }
            };
            let tag = MetadataTag {
                name,
                device,
                read_only,
                value,
            };
            tags.insert(tag.qualified_name(), tag);
        }

        self.tags = tags;
        Ok(())
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn next_field<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    what: &str,
) -> Result<&'a str, DaqError> {
    lines
        .next()
        .ok_or_else(|| DaqError::MetadataFormat(format!("unexpected end of input reading {what}")))
}

fn parse_count(field: &str, what: &str) -> Result<usize, DaqError> {
    field
        .trim()
        .parse()
        .map_err(|_| DaqError::MetadataFormat(format!("invalid {what} '{field}'")))
}

fn escape(field: &str) -> String {
    field
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
