//! URL normalization and internal/external classification.
//!
//! Pure functions; everything here operates on one URL at a time with no
//! shared state.

use url::Url;

use crate::error::{Result, ScanError};
use crate::result::Origin;

/// Schemes dropped without a `skipped` report.
const SILENT_SCHEMES: &[&str] = &["mailto", "javascript", "tel", "data"];

/// Why a raw reference was rejected during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlRejection {
    /// Empty, fragment-only, or one of the silently dropped schemes.
    Silent,
    /// A parseable URL whose scheme the scanner does not fetch.
    UnsupportedScheme(String),
    /// Not a resolvable reference at all.
    Invalid(String),
}

/// Scheme/host/port identity of the scan's start URL, the fixed point
/// against which every discovered link is classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl StartOrigin {
    pub fn of(url: &Url) -> Self {
        Self {
            scheme: url.scheme().to_string(),
            host: url.host_str().unwrap_or_default().to_string(),
            port: url.port_or_known_default(),
        }
    }
}

/// Resolves a raw href against the page it appeared on and canonicalizes it:
/// fragment stripped, scheme restricted to http(s).
pub fn normalize(raw: &str, base: &Url) -> std::result::Result<Url, UrlRejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Err(UrlRejection::Silent);
    }

    let mut resolved = base
        .join(trimmed)
        .map_err(|e| UrlRejection::Invalid(e.to_string()))?;

    match resolved.scheme() {
        "http" | "https" => {}
        s if SILENT_SCHEMES.contains(&s) => return Err(UrlRejection::Silent),
        s => return Err(UrlRejection::UnsupportedScheme(s.to_string())),
    }

    resolved.set_fragment(None);
    Ok(resolved)
}

/// Parses and validates the absolute URL a scan starts from.
pub fn normalize_seed(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ScanError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScanError::UnsupportedScheme(url.scheme().to_string()));
    }
    url.set_fragment(None);
    Ok(url)
}

/// Removes the query component, collapsing all query variants of a URL into
/// one canonical form.
pub fn strip_query(url: &Url) -> Url {
    let mut stripped = url.clone();
    stripped.set_query(None);
    stripped
}

/// Compares scheme, host, and port against the scan's start URL. Computed
/// once at discovery time, before any redirect is followed.
pub fn classify(url: &Url, start: &StartOrigin) -> Origin {
    let same = url.scheme() == start.scheme
        && url.host_str().unwrap_or_default() == start.host
        && url.port_or_known_default() == start.port;
    if same { Origin::Internal } else { Origin::External }
}
