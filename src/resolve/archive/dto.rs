//! Internet Archive API Data Transfer Objects
//!
//! Covers the two endpoints used: advanced search (item discovery) and
//! item metadata (per-file details). Convert to domain types in the
//! client; never use these outside the archive module.

use serde::{Deserialize, Serialize};

/// Advanced search response wrapper
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResponse {
    pub response: SearchBody,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchBody {
    #[serde(default)]
    pub docs: Vec<SearchDoc>,
}

/// One discovered item
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchDoc {
    pub identifier: String,
    pub title: Option<String>,
    pub creator: Option<Creator>,
    pub year: Option<Year>,
}

/// The API returns creator as either a string or a list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Creator {
    One(String),
    Many(Vec<String>),
}

impl Creator {
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(s) => Some(s),
            Self::Many(v) => v.first().map(String::as_str),
        }
    }
}

/// Year comes back as a number or a string depending on the item.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Year {
    Num(i32),
    Text(String),
}

impl Year {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Item metadata response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataResponse {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    pub metadata: Option<ItemMetadata>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemMetadata {
    pub title: Option<String>,
    pub year: Option<Year>,
}

/// One file within an item
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub format: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub creator: Option<String>,
    /// Duration as seconds or "MM:SS"
    pub length: Option<String>,
    pub track: Option<String>,
}

impl FileEntry {
    /// Parse the length field ("205.32" or "3:25") into seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        let raw = self.length.as_deref()?.trim();
        if let Ok(secs) = raw.parse::<f64>() {
            return Some(secs);
        }
        let mut parts = raw.rsplit(':');
        let secs: f64 = parts.next()?.parse().ok()?;
        let mins: f64 = parts.next()?.parse().ok()?;
        let hours: f64 = parts.next().and_then(|h| h.parse().ok()).unwrap_or(0.0);
        Some(hours * 3600.0 + mins * 60.0 + secs)
    }
}
