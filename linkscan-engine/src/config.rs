use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::result::Origin;
use crate::rules::Rule;

/// Per-origin setting controlling whether a link is skipped, fetched only,
/// or fetched and recursed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowPolicy {
    Ignore,
    Check,
    Follow,
}

impl FromStr for FollowPolicy {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ignore" => Ok(FollowPolicy::Ignore),
            "check" => Ok(FollowPolicy::Check),
            "follow" => Ok(FollowPolicy::Follow),
            other => Err(ScanError::InvalidConfig(format!(
                "unknown follow policy `{other}` (expected ignore, check, or follow)"
            ))),
        }
    }
}

/// Scan settings, immutable for the duration of one scan. Changes apply to
/// the next start, never to a scan in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfiguration {
    /// Number of concurrent fetch workers.
    pub thread_count: usize,
    /// Seconds each worker waits after a completed request before issuing
    /// its next one. This is per-worker pacing, not a global limit: with N
    /// workers the aggregate rate to one host is up to N requests per delay
    /// window.
    pub delay_secs: u64,
    /// Per-request deadline in seconds.
    pub timeout_secs: u64,
    pub follow_redirects: bool,
    /// When false, query strings are stripped and the bare URL is fetched
    /// once no matter how many query variants were discovered.
    pub follow_query_strings: bool,
    pub internal_policy: FollowPolicy,
    pub external_policy: FollowPolicy,
    /// Bound on external-recursion depth; internal links are never depth
    /// limited.
    pub max_external_depth: usize,
}

impl Default for ScanConfiguration {
    fn default() -> Self {
        Self {
            thread_count: 1,
            delay_secs: 0,
            timeout_secs: 10,
            follow_redirects: true,
            follow_query_strings: true,
            internal_policy: FollowPolicy::Follow,
            external_policy: FollowPolicy::Check,
            max_external_depth: 1,
        }
    }
}

impl ScanConfiguration {
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(ScanError::InvalidConfig(
                "thread_count must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ScanError::InvalidConfig(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_external_depth == 0 {
            return Err(ScanError::InvalidConfig(
                "max_external_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn policy_for(&self, origin: Origin) -> FollowPolicy {
        match origin {
            Origin::Internal => self.internal_policy,
            Origin::External => self.external_policy,
        }
    }
}

/// The persisted shape a front end hands to the engine at session start:
/// the option block plus the ordered rule list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanProfile {
    pub options: ScanConfiguration,
    pub rules: Vec<Rule>,
}
