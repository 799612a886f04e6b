//! Configuration & Filter Layer
//!
//! Include/exclude rules gate which execution units are instrumented at
//! all. Eligibility is a pure function of (identity, filter set), evaluated
//! exactly once per unit at registration and cached as the unit's
//! eligibility flag.
//!
//! Semantics follow the original filter module: with no filter in force
//! everything is instrumented; an allow-list instruments only matches; a
//! deny-list instruments everything but matches. Within a list, rules are
//! ordered and the first matching rule wins; unmatched units fall back to
//! the complement of the declared mode. Getting this default wrong silently
//! corrupts coverage reports, so it is pinned by tests rather than left to
//! convention.

use crate::result::{SondearError, SondearResult};
use crate::unit::UnitIdentity;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Declared mode of a filter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// No filter in force; every unit is instrumented
    #[default]
    None,
    /// Only matched units are instrumented
    AllowList,
    /// Everything but matched units is instrumented
    DenyList,
}

impl FilterMode {
    /// Parse the `filter_mode` setting value
    pub fn parse(value: &str) -> SondearResult<Self> {
        match value.trim() {
            "none" => Ok(Self::None),
            "allow" => Ok(Self::AllowList),
            "deny" => Ok(Self::DenyList),
            other => Err(SondearError::Config {
                setting: "filter_mode".to_string(),
                message: format!("unknown filter mode '{other}'"),
            }),
        }
    }

}

/// Effect of a matching rule on list membership
///
/// Rules decide whether a unit is *in the list*; the declared mode decides
/// what membership means (allow-list: members are instrumented, deny-list:
/// members are not). Exclude rules carve exceptions out of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// A match puts the unit in the list
    Include,
    /// A match keeps the unit out of the list
    Exclude,
}

/// Uncompiled rule as it appears in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Regular expression matched against the unit's absolute path and
    /// (when present) its function name; anchored to the full string
    pub pattern: String,
    /// Include or exclude on match
    pub action: RuleAction,
}

impl RuleSpec {
    /// Include rule
    #[must_use]
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            action: RuleAction::Include,
        }
    }

    /// Exclude rule
    #[must_use]
    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            action: RuleAction::Exclude,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: Regex,
    action: RuleAction,
}

impl CompiledRule {
    fn matches(&self, identity: &UnitIdentity) -> bool {
        if self.pattern.is_match(&identity.path) {
            return true;
        }
        identity
            .function
            .as_deref()
            .is_some_and(|name| self.pattern.is_match(name))
    }
}

/// Ordered, compiled filter rules plus the declared mode
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    mode: FilterMode,
    rules: Vec<CompiledRule>,
}

impl FilterSet {
    /// Filter set that instruments everything
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Compile a filter set from configuration.
    ///
    /// Malformed patterns are a `Filter` error each: the rule is dropped
    /// (treated as never matching), a warning is logged, and compilation
    /// continues with the remaining rules. The returned error list lets
    /// callers surface the rejects without failing the load.
    #[must_use]
    pub fn compile(mode: FilterMode, specs: &[RuleSpec]) -> (Self, Vec<SondearError>) {
        let mut rules = Vec::with_capacity(specs.len());
        let mut rejected = Vec::new();

        for spec in specs {
            match Regex::new(&format!("^(?:{})$", spec.pattern)) {
                Ok(pattern) => rules.push(CompiledRule {
                    pattern,
                    action: spec.action,
                }),
                Err(err) => {
                    tracing::warn!(pattern = %spec.pattern, error = %err, "dropping malformed filter pattern");
                    rejected.push(SondearError::Filter {
                        pattern: spec.pattern.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        (Self { mode, rules }, rejected)
    }

    /// Declared mode
    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Number of compiled rules
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// First-match-wins list membership; unmatched units are not members
    fn is_listed(&self, identity: &UnitIdentity) -> bool {
        for rule in &self.rules {
            if rule.matches(identity) {
                return rule.action == RuleAction::Include;
            }
        }
        false
    }

    /// Decide whether a unit is instrumented.
    ///
    /// Pure: depends only on the identity and this set. Called once per
    /// unit at registration; the result is cached as the unit's
    /// eligibility flag and never re-evaluated. Flipping allow-list to
    /// deny-list with the same rules inverts the eligible set exactly.
    #[must_use]
    pub fn is_eligible(&self, identity: &UnitIdentity) -> bool {
        match self.mode {
            FilterMode::None => true,
            FilterMode::AllowList => self.is_listed(identity),
            FilterMode::DenyList => !self.is_listed(identity),
        }
    }
}
