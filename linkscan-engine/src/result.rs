use serde::{Deserialize, Serialize};

/// Internal/external classification of a link relative to the scan's start
/// URL. Fixed at discovery time: a link that redirects onto another host
/// keeps the origin it was discovered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Internal,
    External,
}

impl Origin {
    pub fn is_external(self) -> bool {
        matches!(self, Origin::External)
    }
}

/// Why a link was reported without ever being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Matched an exclude rule, or missed every include rule in its scope.
    Rule,
    /// The follow policy for the link's origin is `ignore`.
    PolicyIgnore,
    /// A scheme other than http/https.
    UnsupportedScheme,
}

/// Terminal and intermediate statuses of a discovered link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LinkStatus {
    Pending,
    Fetching,
    Done { code: u16, final_url: String },
    Timeout,
    Error { message: String },
    Skipped { reason: SkipReason },
}

impl LinkStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LinkStatus::Pending | LinkStatus::Fetching)
    }
}

/// One discovered edge in the crawl graph.
///
/// `target` is the normalized pre-redirect URL; it is the URL used for
/// dedup, rule matching, and origin classification even when the fetch was
/// redirected elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub target: String,
    /// Page the link was discovered on; empty for the seed.
    pub source_page: String,
    pub origin: Origin,
    /// External-recursion depth at discovery. Carried for internal links too
    /// but only compared against the limit for external ones.
    pub depth: usize,
    pub status: LinkStatus,
    /// Intermediate URLs when redirects were followed.
    pub redirect_chain: Vec<String>,
}

impl LinkRecord {
    pub fn new(target: String, source_page: String, origin: Origin, depth: usize) -> Self {
        Self {
            target,
            source_page,
            origin,
            depth,
            status: LinkStatus::Pending,
            redirect_chain: Vec::new(),
        }
    }
}
