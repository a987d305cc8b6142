//! Positional codec packing a property collection into three text fields.
//!
//! Wire format:
//!
//! ```text
//! names          base64(UTF-8("name:kind:offset:length:" ...))
//! string_values  base64(UTF-8(concatenated string payloads))
//! binary_values  base64(concatenated binary payloads)
//! ```
//!
//! `kind` is `S` (payload in `string_values`) or `B` (payload in
//! `binary_values`). `offset` and `length` are byte positions in the decoded
//! payload stream. A null value is written as `name:B:0:-1:`.
//!
//! Decoding is best effort: every tuple is validated before it is used and
//! any tuple that does not fit is logged and skipped, so one damaged entry
//! never costs the rest of the record.

use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SecStoreError};
use crate::profile::property::{
    ProfileProperty, PropertyCollection, PropertyKind, PropertyValue,
};

/// Length sentinel marking an explicit null.
pub const NULL_LENGTH: i64 = -1;

/// The three encoded fields stored on a profile record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedProfile {
    pub names: String,
    pub string_values: String,
    pub binary_values: String,
}

impl EncodedProfile {
    /// The decoded `names` stream, for inspection.
    pub fn names_text(&self) -> Result<String> {
        let bytes = STANDARD
            .decode(&self.names)
            .map_err(|e| SecStoreError::SerializationError(format!("names: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| SecStoreError::SerializationError(format!("names: {e}")))
    }
}

/// Outcome counters of one decode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Tuples written into the target collection.
    pub applied: usize,
    /// Tuples rejected as malformed or incompatible.
    pub skipped: usize,
    /// Tuples naming properties the target does not define.
    pub unknown: usize,
}

/// One validated entry of the names stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    kind: PropertyKind,
    offset: usize,
    /// `None` for the null sentinel.
    length: Option<usize>,
}

/// Encoder/decoder for profile property bags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileCodec {
    case_sensitive: bool,
    binary_supported: bool,
}

impl Default for ProfileCodec {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ProfileCodec {
    /// `case_sensitive` governs how encoded names are matched to the target
    /// collection on decode.
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            binary_supported: true,
        }
    }

    /// Without binary support, binary payloads are base64'd into the string
    /// stream and tagged `S`.
    pub fn with_binary_support(mut self, supported: bool) -> Self {
        self.binary_supported = supported;
        self
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    // ── Encode ───────────────────────────────────────────────────────────────

    /// Encode the permitted, changed properties of `properties`.
    ///
    /// A property is permitted when the caller is authenticated or the
    /// property allows anonymous access. It is written when it is dirty or
    /// no longer holds its default value. Returns `None` when no permitted
    /// property is dirty; the caller must not persist anything in that case.
    ///
    /// Names and value kinds are checked when properties are added and set,
    /// so every collection is encodable.
    pub fn encode(
        &self,
        properties: &PropertyCollection,
        authenticated: bool,
    ) -> Option<EncodedProfile> {
        let permitted =
            |p: &&ProfileProperty| authenticated || p.definition().allow_anonymous;

        if !properties.iter().filter(permitted).any(|p| p.is_dirty()) {
            return None;
        }

        let mut names = String::new();
        let mut strings = String::new();
        let mut binary: Vec<u8> = Vec::new();

        for property in properties.iter().filter(permitted) {
            if !property.is_dirty() && property.using_default_value() {
                continue;
            }

            let (kind, offset, length) = match property.value() {
                None => (PropertyKind::Binary, 0, NULL_LENGTH),
                Some(PropertyValue::String(s)) => {
                    let offset = strings.len();
                    strings.push_str(s);
                    (PropertyKind::String, offset, s.len() as i64)
                }
                Some(PropertyValue::Binary(b)) if self.binary_supported => {
                    let offset = binary.len();
                    binary.extend_from_slice(b);
                    (PropertyKind::Binary, offset, b.len() as i64)
                }
                Some(PropertyValue::Binary(b)) => {
                    let text = STANDARD.encode(b);
                    let offset = strings.len();
                    strings.push_str(&text);
                    (PropertyKind::String, offset, text.len() as i64)
                }
            };

            // Writing to a String cannot fail.
            let _ = write!(
                names,
                "{}:{}:{}:{}:",
                property.name(),
                kind.tag(),
                offset,
                length
            );
        }

        Some(EncodedProfile {
            names: STANDARD.encode(names.as_bytes()),
            string_values: STANDARD.encode(strings.as_bytes()),
            binary_values: STANDARD.encode(&binary),
        })
    }

    // ── Decode ───────────────────────────────────────────────────────────────

    /// Restore property values from `encoded` into `target`.
    ///
    /// Never fails: undecodable fields are treated as empty, names missing
    /// from `target` are ignored, and malformed tuples are skipped. Each
    /// problem is logged at `warn` level.
    pub fn decode(&self, encoded: &EncodedProfile, target: &mut PropertyCollection) -> DecodeReport {
        let mut report = DecodeReport::default();

        let names = decode_text(&encoded.names, "names");
        let strings = decode_text(&encoded.string_values, "string_values");
        let binary = decode_bytes(&encoded.binary_values, "binary_values");

        if names.is_empty() {
            return report;
        }

        let fields: Vec<&str> = names.split(':').collect();
        // The stream ends with ':' so the final split element is empty.
        let usable = fields.len() - fields.len() % 4;
        let remainder = &fields[usable..];
        if !(remainder.is_empty() || remainder == [""]) {
            log::warn!("profile names stream has a truncated trailing entry");
            report.skipped += 1;
        }

        for tuple in fields[..usable].chunks_exact(4) {
            let name = tuple[0];
            let Some(property) = target.find_mut(name, self.case_sensitive) else {
                log::debug!("profile property {name:?} is not defined, ignoring");
                report.unknown += 1;
                continue;
            };

            let outcome = parse_entry(tuple[1], tuple[2], tuple[3])
                .and_then(|entry| materialize(entry, property, &strings, &binary));

            match outcome {
                Ok(value) => {
                    property.apply_decoded(value);
                    report.applied += 1;
                }
                Err(reason) => {
                    log::warn!("skipping profile property {name:?}: {reason}");
                    report.skipped += 1;
                }
            }
        }

        report
    }
}

fn decode_bytes(field: &str, label: &str) -> Vec<u8> {
    if field.is_empty() {
        return Vec::new();
    }
    match STANDARD.decode(field) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("profile {label} is not valid base64, treating as empty: {e}");
            Vec::new()
        }
    }
}

fn decode_text(field: &str, label: &str) -> String {
    match String::from_utf8(decode_bytes(field, label)) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("profile {label} is not valid UTF-8, treating as empty: {e}");
            String::new()
        }
    }
}

/// Validate all fields of a tuple before anything is indexed.
fn parse_entry(kind: &str, offset: &str, length: &str) -> std::result::Result<Entry, String> {
    let kind = PropertyKind::from_tag(kind).ok_or_else(|| format!("unknown kind {kind:?}"))?;
    let offset: i64 = offset
        .parse()
        .map_err(|_| format!("offset {offset:?} is not a number"))?;
    let length: i64 = length
        .parse()
        .map_err(|_| format!("length {length:?} is not a number"))?;

    let offset = usize::try_from(offset).map_err(|_| format!("negative offset {offset}"))?;
    let length = match length {
        NULL_LENGTH => None,
        n => Some(usize::try_from(n).map_err(|_| format!("invalid length {n}"))?),
    };

    Ok(Entry {
        kind,
        offset,
        length,
    })
}

/// Slice the payload for `entry` and convert it to the property's kind.
fn materialize(
    entry: Entry,
    property: &ProfileProperty,
    strings: &str,
    binary: &[u8],
) -> std::result::Result<Option<PropertyValue>, String> {
    let Some(length) = entry.length else {
        return if property.definition().nullable {
            Ok(None)
        } else {
            Err("null for a non-nullable property".to_string())
        };
    };
    let end = entry
        .offset
        .checked_add(length)
        .ok_or_else(|| "offset + length overflows".to_string())?;

    match (entry.kind, property.definition().kind) {
        (PropertyKind::String, target) => {
            let text = strings.get(entry.offset..end).ok_or_else(|| {
                format!(
                    "string slice {}..{end} outside payload of {} bytes",
                    entry.offset,
                    strings.len()
                )
            })?;
            match target {
                PropertyKind::String => Ok(Some(PropertyValue::String(text.to_string()))),
                PropertyKind::Binary => STANDARD
                    .decode(text)
                    .map(|b| Some(PropertyValue::Binary(b)))
                    .map_err(|e| format!("string payload is not base64 for binary property: {e}")),
            }
        }
        (PropertyKind::Binary, PropertyKind::Binary) => {
            let bytes = binary.get(entry.offset..end).ok_or_else(|| {
                format!(
                    "binary slice {}..{end} outside payload of {} bytes",
                    entry.offset,
                    binary.len()
                )
            })?;
            Ok(Some(PropertyValue::Binary(bytes.to_vec())))
        }
        (PropertyKind::Binary, PropertyKind::String) => {
            Err("binary payload for a string property".to_string())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
