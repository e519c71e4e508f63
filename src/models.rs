use crate::orchestrator::PipelineError;
use crate::policy::PolicyReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::{
    collections::{HashSet, hash_map::DefaultHasher},
    fmt,
    hash::{Hash, Hasher},
};
use uuid::Uuid;

/// Product description submitted from the form. Runs operate on an owned,
/// validated snapshot of it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProductInfo {
    pub name: String,
    pub features: String,
    pub target_audience: String,
    pub regions: Vec<String>,
    #[serde(default)]
    pub style: AdStyle,
    #[serde(default)]
    pub promotion: Promotion,
}

impl ProductInfo {
    /// Trims text fields, upper-cases region codes and drops duplicate
    /// regions while keeping selection order.
    pub fn validate(self) -> Result<Self, PipelineError> {
        let name = self.name.trim().to_string();
        let features = self.features.trim().to_string();
        let target_audience = self.target_audience.trim().to_string();
        for (field, value) in [
            ("name", &name),
            ("features", &features),
            ("target_audience", &target_audience),
        ] {
            if value.is_empty() {
                return Err(PipelineError::invalid_input(
                    "validate_product",
                    format!("missing_{field}"),
                ));
            }
        }

        let mut seen = HashSet::new();
        let regions = self
            .regions
            .iter()
            .map(|code| code.trim().to_ascii_uppercase())
            .filter(|code| !code.is_empty())
            .filter(|code| seen.insert(code.clone()))
            .collect::<Vec<_>>();
        if regions.is_empty() {
            return Err(PipelineError::invalid_input(
                "validate_product",
                "no_regions_selected",
            ));
        }

        Ok(Self {
            name,
            features,
            target_audience,
            regions,
            style: self.style,
            promotion: self.promotion,
        })
    }

    /// Concatenated free text, as fed to the policy checker.
    pub fn policy_text(&self) -> String {
        format!("{} {} {}", self.name, self.features, self.target_audience)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdStyle {
    Confident,
    #[default]
    Friendly,
    Professional,
    Playful,
    Luxury,
    Urgent,
}

impl AdStyle {
    pub fn prompt_label(&self) -> &'static str {
        match self {
            AdStyle::Confident => "confident and bold",
            AdStyle::Friendly => "warm and friendly",
            AdStyle::Professional => "professional and trustworthy",
            AdStyle::Playful => "playful and witty",
            AdStyle::Luxury => "premium and elegant",
            AdStyle::Urgent => "energetic with a sense of urgency",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Promotion {
    #[default]
    None,
    Discount,
    FreeShipping,
    LimitedTime,
    Bundle,
    NewArrival,
}

impl Promotion {
    pub fn prompt_label(&self) -> Option<&'static str> {
        match self {
            Promotion::None => None,
            Promotion::Discount => Some("a limited discount on the regular price"),
            Promotion::FreeShipping => Some("free shipping on every order"),
            Promotion::LimitedTime => Some("a limited-time offer ending soon"),
            Promotion::Bundle => Some("a bundle deal when buying more than one"),
            Promotion::NewArrival => Some("a brand-new arrival"),
        }
    }
}

/// Per-run random token threaded into every prompt so regenerations drift
/// toward different wording.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DiversitySeed(String);

impl DiversitySeed {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Stable numeric seed for a region slot, used to drive the emoji RNG.
    pub fn slot_seed(&self, region: &str, slot: usize) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        region.hash(&mut hasher);
        slot.hash(&mut hasher);
        hasher.finish()
    }
}

impl From<&str> for DiversitySeed {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for DiversitySeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopySource {
    Model,
    Fallback,
}

impl CopySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopySource::Model => "model",
            CopySource::Fallback => "fallback",
        }
    }
}

/// Why a region was served from templates instead of the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackReason {
    NotConfigured,
    Transport { detail: String },
    Timeout,
    Parse { detail: String },
    LanguageRejected { accepted: usize },
}

impl FallbackReason {
    pub fn label(&self) -> &'static str {
        match self {
            FallbackReason::NotConfigured => "not_configured",
            FallbackReason::Transport { .. } => "transport",
            FallbackReason::Timeout => "timeout",
            FallbackReason::Parse { .. } => "parse",
            FallbackReason::LanguageRejected { .. } => "language_rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedCopy {
    pub text: String,
    pub region: String,
    pub region_name: String,
    pub language: String,
    pub slot: usize,
    pub source: CopySource,
}

/// One region's finished copies, emitted as a unit.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct RegionBatch {
    pub region: String,
    pub region_name: String,
    pub language: String,
    pub source: CopySource,
    pub fallback_reason: Option<FallbackReason>,
    pub copies: Vec<GeneratedCopy>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: Option<Uuid>,
    pub generation: u64,
    pub in_progress: bool,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total: usize,
    pub copies: Vec<GeneratedCopy>,
    pub policy: Option<PolicyReport>,
}

#[derive(Debug, Serialize)]
pub struct StartRunResponse {
    pub run_id: Uuid,
    pub generation: u64,
    pub regions: Vec<String>,
    pub policy: PolicyReport,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::PipelineErrorKind;

    fn product(regions: &[&str]) -> ProductInfo {
        ProductInfo {
            name: "  Wireless Earbuds ".into(),
            features: "ANC, long battery".into(),
            target_audience: "commuters".into(),
            regions: regions.iter().map(|r| r.to_string()).collect(),
            style: AdStyle::Confident,
            promotion: Promotion::Discount,
        }
    }

    #[test]
    fn validate_normalizes_and_dedupes_regions() {
        let product = product(&["us", "TH", " US ", "", "th"]).validate().unwrap();
        assert_eq!(product.regions, vec!["US", "TH"]);
        assert_eq!(product.name, "Wireless Earbuds");
    }

    #[test]
    fn validate_rejects_missing_fields_and_regions() {
        let err = product(&[]).validate().unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
        assert_eq!(err.detail(), "no_regions_selected");

        let mut missing = product(&["US"]);
        missing.features = "   ".into();
        let err = missing.validate().unwrap_err();
        assert_eq!(err.detail(), "missing_features");
    }

    #[test]
    fn product_deserializes_with_defaults() {
        let value = serde_json::json!({
            "name": "Mug",
            "features": "ceramic",
            "target_audience": "coffee lovers",
            "regions": ["FR"],
        });
        let product: ProductInfo = serde_json::from_value(value).unwrap();
        assert_eq!(product.style, AdStyle::Friendly);
        assert_eq!(product.promotion, Promotion::None);
    }

    #[test]
    fn slot_seed_differs_per_slot_and_run() {
        let a = DiversitySeed::from("run-a");
        let b = DiversitySeed::from("run-b");
        assert_ne!(a.slot_seed("US", 0), a.slot_seed("US", 1));
        assert_ne!(a.slot_seed("US", 0), b.slot_seed("US", 0));
        assert_eq!(a.slot_seed("TH", 2), a.slot_seed("TH", 2));
        assert_ne!(DiversitySeed::generate(), DiversitySeed::generate());
    }

    #[test]
    fn fallback_reason_serializes_with_kind_tag() {
        let value = serde_json::to_value(FallbackReason::LanguageRejected { accepted: 2 }).unwrap();
        assert_eq!(value["kind"], "language_rejected");
        assert_eq!(value["accepted"], 2);
    }
}
