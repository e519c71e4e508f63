use crate::catalog::{CatalogError, parse_yaml};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

const FILE: &str = "policy_lexicon.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    Safe,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
            RiskLevel::Safe => "safe",
        }
    }
}

impl From<Option<Severity>> for RiskLevel {
    fn from(worst: Option<Severity>) -> Self {
        match worst {
            Some(Severity::High) => RiskLevel::High,
            Some(Severity::Medium) => RiskLevel::Medium,
            Some(Severity::Low) => RiskLevel::Low,
            None => RiskLevel::Safe,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LexiconEntry {
    word: String,
    category: String,
    severity: Severity,
    #[serde(default)]
    suggestion: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    forbidden_categories: Vec<String>,
    entries: Vec<LexiconEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyViolation {
    pub word: String,
    pub category: String,
    pub severity: Severity,
    pub suggestion: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyCheckResult {
    pub violations: Vec<PolicyViolation>,
    pub risk_level: RiskLevel,
    pub suggestions: Vec<String>,
    pub summary: String,
}

/// Violations plus whether the text falls in a category that cannot be
/// advertised at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyReport {
    #[serde(flatten)]
    pub result: PolicyCheckResult,
    pub forbidden_category: bool,
}

#[derive(Debug)]
pub struct PolicyLexicon {
    forbidden_categories: Vec<String>,
    entries: Vec<(LexiconEntry, Regex)>,
}

impl PolicyLexicon {
    pub fn from_yaml(raw: &str) -> Result<Self, CatalogError> {
        let file: LexiconFile = parse_yaml(FILE, raw)?;
        let entries = file
            .entries
            .into_iter()
            .map(|entry| {
                let pattern = word_pattern(&entry.word).ok_or_else(|| {
                    CatalogError::invalid(FILE, format!("bad lexicon word {:?}", entry.word))
                })?;
                Ok::<_, CatalogError>((entry, pattern))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            forbidden_categories: file
                .forbidden_categories
                .into_iter()
                .map(|c| c.trim().to_lowercase())
                .collect(),
            entries,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Case-insensitive scan, one violation per lexicon entry found.
    pub fn check_policy_violations(&self, text: &str) -> PolicyCheckResult {
        let violations: Vec<PolicyViolation> = self
            .entries
            .iter()
            .filter(|(_, pattern)| pattern.is_match(text))
            .map(|(entry, _)| PolicyViolation {
                word: entry.word.clone(),
                category: entry.category.clone(),
                severity: entry.severity,
                suggestion: entry.suggestion.clone(),
                description: entry.description.clone(),
            })
            .collect();

        let risk_level = RiskLevel::from(violations.iter().map(|v| v.severity).max());

        let mut suggestions: Vec<String> = Vec::new();
        for violation in &violations {
            let hint = if violation.suggestion.is_empty() {
                format!("Remove \"{}\": {}", violation.word, violation.description)
            } else {
                format!("Replace \"{}\" with \"{}\"", violation.word, violation.suggestion)
            };
            if !suggestions.contains(&hint) {
                suggestions.push(hint);
            }
        }

        let summary = match violations.len() {
            0 => "No policy issues found.".to_string(),
            n => format!(
                "{n} potential policy issue{} found, risk level {}.",
                if n == 1 { "" } else { "s" },
                risk_level.as_str()
            ),
        };

        PolicyCheckResult {
            violations,
            risk_level,
            suggestions,
            summary,
        }
    }

    pub fn review(&self, text: &str) -> PolicyReport {
        PolicyReport {
            result: self.check_policy_violations(text),
            forbidden_category: self.check_forbidden_category(text),
        }
    }

    /// True when the text touches a category that cannot be advertised at all.
    pub fn check_forbidden_category(&self, text: &str) -> bool {
        self.entries.iter().any(|(entry, pattern)| {
            self.forbidden_categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&entry.category))
                && pattern.is_match(text)
        })
    }
}

/// Word-bounded so `cure` does not fire on `secure`.
fn word_pattern(word: &str) -> Option<Regex> {
    let word = word.trim();
    let first = word.chars().next()?;
    let last = word.chars().next_back()?;
    let open = if first.is_alphanumeric() { r"\b" } else { "" };
    let close = if last.is_alphanumeric() { r"\b" } else { "" };
    RegexBuilder::new(&format!("{open}{}{close}", regex::escape(word)))
        .case_insensitive(true)
        .build()
        .ok()
}
