pub mod fs;
pub mod net;
pub mod logger;

use std::time::{SystemTime, UNIX_EPOCH};

/// Base for single-item watch URLs
const WATCH_URL_BASE: &str = "https://www.youtube.com/watch?v=";

/// Base for playlist URLs
const PLAYLIST_URL_BASE: &str = "https://www.youtube.com/playlist?list=";

/// Utility functions for the application
pub struct Utils;

impl Utils {
    /// Strip characters that are illegal in file names
    pub fn sanitize_filename(filename: &str) -> String {
        filename
            .chars()
            .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Sanitize an optional field, treating empty results as absent
    pub fn sanitize_field(value: Option<&str>) -> Option<String> {
        value
            .map(Self::sanitize_filename)
            .filter(|s| !s.is_empty())
    }

    /// Read a query parameter from a URL
    pub fn query_param(url: &str, key: &str) -> Option<String> {
        url::Url::parse(url)
            .ok()?
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    }

    /// Playlist identifier of a URL, if it references one
    pub fn playlist_id(url: &str) -> Option<String> {
        Self::query_param(url, "list")
    }

    /// Canonical single-item URL; URLs without an item id are returned as given
    pub fn canonical_item_url(url: &str) -> String {
        match Self::query_param(url, "v") {
            Some(id) => Self::item_url(&id),
            None => url.trim().to_string(),
        }
    }

    /// Single-item URL for an identifier
    pub fn item_url(id: &str) -> String {
        format!("{}{}", WATCH_URL_BASE, id)
    }

    /// Playlist URL for an identifier
    pub fn playlist_url(list_id: &str) -> String {
        format!("{}{}", PLAYLIST_URL_BASE, list_id)
    }

    /// Milliseconds since the unix epoch
    pub fn timestamp_millis() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }

    /// Filename used when no metadata could be probed
    pub fn fallback_file_name() -> String {
        format!("audio_{}", Self::timestamp_millis())
    }

    /// Round to two decimal places
    pub fn round2(value: f64) -> f64 {
        (value * 100.0).round() / 100.0
    }
}
