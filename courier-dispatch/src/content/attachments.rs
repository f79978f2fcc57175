//! Template attachment lists in the shapes templates have been saved with
//! over time, normalised to [`AttachmentRef`]s.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{error::ContentError, types::AttachmentRef};

/// One entry of a stored attachment list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAttachment {
    /// A bare URL or path; the file name is its last segment.
    Location(String),
    Fields(AttachmentFields),
}

/// The object form. Which of the name/location pairs is filled depends on
/// where the template came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentFields {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default, alias = "contentType")]
    pub content_type: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for `filename`, by extension.
#[must_use]
pub fn content_type_for(filename: &str) -> &'static str {
    let Some((_, extension)) = filename.rsplit_once('.') else {
        return DEFAULT_CONTENT_TYPE;
    };

    match extension.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "zip" => "application/zip",
        "rar" => "application/x-rar-compressed",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|value| !value.trim().is_empty())
}

fn normalize_one(position: usize, raw: &RawAttachment) -> Option<AttachmentRef> {
    let (filename, path, content_type) = match raw {
        RawAttachment::Location(location) => {
            let location = location.trim();
            if location.is_empty() {
                return None;
            }
            let filename = location
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .map_or_else(|| format!("attachment_{}", position + 1), str::to_string);
            (filename, location.to_string(), None)
        }
        RawAttachment::Fields(fields) => {
            let pair = [
                (&fields.filename, &fields.path),
                (&fields.name, &fields.url),
                (&fields.file_name, &fields.file_url),
            ]
            .into_iter()
            .find_map(|(name, location)| {
                Some((non_empty(name.as_ref())?, non_empty(location.as_ref())?))
            });

            let (filename, path) = pair?;
            let content_type = non_empty(fields.content_type.as_ref())
                .or_else(|| non_empty(fields.kind.as_ref()))
                .map(str::to_string);
            (filename.to_string(), path.to_string(), content_type)
        }
    };

    let content_type = content_type.unwrap_or_else(|| content_type_for(&filename).to_string());

    Some(AttachmentRef {
        filename,
        path,
        content_type,
    })
}

/// Keep every entry that names both a file and a location. Unusable
/// entries are logged and dropped.
#[must_use]
pub fn normalize_attachments(raw: &[RawAttachment]) -> Vec<AttachmentRef> {
    raw.iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            let normalized = normalize_one(position, entry);
            if normalized.is_none() {
                warn!(position, ?entry, "Dropping unrecognised attachment entry");
            }
            normalized
        })
        .collect()
}

/// Parse a stored attachment list: a JSON array, a single object, or a single
/// URL string.
///
/// # Errors
///
/// Returns [`ContentError::Attachments`] if `json` is not valid JSON of one
/// of those shapes.
pub fn attachments_from_json(json: &str) -> Result<Vec<AttachmentRef>, ContentError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Many(Vec<RawAttachment>),
        One(RawAttachment),
    }

    if json.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw = match serde_json::from_str::<Stored>(json)? {
        Stored::Many(entries) => entries,
        Stored::One(entry) => vec![entry],
    };

    Ok(normalize_attachments(&raw))
}
