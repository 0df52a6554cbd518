//! Ordered include/exclude pattern rules applied to discovered links.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::result::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCondition {
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Internal,
    External,
    Both,
}

impl RuleScope {
    fn applies_to(self, origin: Origin) -> bool {
        match self {
            RuleScope::Both => true,
            RuleScope::Internal => origin == Origin::Internal,
            RuleScope::External => origin == Origin::External,
        }
    }
}

/// One user-defined matching rule. The pattern is a regular expression
/// matched against the pre-redirect URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub condition: RuleCondition,
    pub scope: RuleScope,
    pub pattern: String,
}

struct CompiledRule {
    condition: RuleCondition,
    scope: RuleScope,
    regex: Regex,
}

/// The compiled rule list for one scan session.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(rules: &[Rule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let regex = Regex::new(&rule.pattern).map_err(|source| ScanError::InvalidRule {
                    pattern: rule.pattern.clone(),
                    source,
                })?;
                Ok(CompiledRule {
                    condition: rule.condition,
                    scope: rule.scope,
                    regex,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Whether a link is included in the scan.
    ///
    /// Any matching exclude rule in scope wins outright. Otherwise, if the
    /// scope has include rules the link must match at least one of them;
    /// a scope with no include rules admits everything not excluded.
    pub fn evaluate(&self, url: &str, origin: Origin) -> bool {
        let mut has_include = false;
        let mut include_hit = false;

        for rule in self.rules.iter().filter(|r| r.scope.applies_to(origin)) {
            match rule.condition {
                RuleCondition::Exclude => {
                    if rule.regex.is_match(url) {
                        return false;
                    }
                }
                RuleCondition::Include => {
                    has_include = true;
                    include_hit = include_hit || rule.regex.is_match(url);
                }
            }
        }

        !has_include || include_hit
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}
