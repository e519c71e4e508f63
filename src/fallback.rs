use crate::catalog::{CatalogError, parse_yaml};
use crate::config::COPIES_PER_REGION;
use crate::locale::{DEFAULT_LANGUAGE, RegionTable, canonical_tag};
use crate::models::ProductInfo;
use serde::Deserialize;
use std::collections::HashMap;

const FILE: &str = "templates.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateBundle {
    pub call_to_action: String,
    pub templates: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(default = "default_language")]
    default_language: String,
    bundles: HashMap<String, TemplateBundle>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// Offline copy bundles keyed by normalized language tag.
#[derive(Debug)]
pub struct TemplateBook {
    default: TemplateBundle,
    bundles: HashMap<String, TemplateBundle>,
}

impl TemplateBook {
    pub fn from_yaml(raw: &str) -> Result<Self, CatalogError> {
        let file: TemplateFile = parse_yaml(FILE, raw)?;
        let bundles = file
            .bundles
            .into_iter()
            .map(|(tag, bundle)| (canonical_tag(&tag), bundle))
            .collect::<HashMap<_, _>>();

        for (tag, bundle) in &bundles {
            if bundle.templates.len() != COPIES_PER_REGION {
                return Err(CatalogError::invalid(
                    FILE,
                    format!("{tag} needs exactly {COPIES_PER_REGION} templates"),
                ));
            }
            if bundle.templates.iter().any(|t| t.trim().is_empty()) {
                return Err(CatalogError::invalid(FILE, format!("{tag} has an empty template")));
            }
        }

        let default_language = canonical_tag(&file.default_language);
        let default = bundles.get(&default_language).cloned().ok_or_else(|| {
            CatalogError::invalid(FILE, format!("default language {default_language} has no bundle"))
        })?;

        Ok(Self { default, bundles })
    }

    pub fn has_bundle(&self, language: &str) -> bool {
        self.bundles.contains_key(&canonical_tag(language))
    }

    fn bundle_for(&self, language: &str) -> &TemplateBundle {
        self.bundles.get(language).unwrap_or(&self.default)
    }

    /// Exactly three non-empty copies for `language`, offline. Unknown
    /// languages use the default bundle.
    pub fn fallback(
        &self,
        regions: &RegionTable,
        product: &ProductInfo,
        language: &str,
    ) -> [String; COPIES_PER_REGION] {
        let normalized = regions.normalize_language(language);
        let bundle = self.bundle_for(&normalized);
        std::array::from_fn(|slot| {
            let body = fill(&bundle.templates[slot], product);
            let copy = format!("{} {}", body.trim(), bundle.call_to_action.trim());
            if copy.trim().is_empty() {
                product.name.clone()
            } else {
                copy
            }
        })
    }
}

fn fill(template: &str, product: &ProductInfo) -> String {
    template
        .replace("{name}", &product.name)
        .replace("{features}", &product.features)
        .replace("{audience}", &product.target_audience)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::models::{AdStyle, Promotion};
    use crate::validator::{LanguageValidator, Script, coverage};

    fn product() -> ProductInfo {
        ProductInfo {
            name: "Wireless Earbuds".into(),
            features: "ANC, long battery".into(),
            target_audience: "commuters".into(),
            regions: vec!["US".into(), "TH".into()],
            style: AdStyle::Confident,
            promotion: Promotion::Discount,
        }
    }

    #[test]
    fn fallback_is_total_over_known_and_unknown_regions() {
        let catalog = Catalog::embedded().unwrap();
        let product = product();
        let mut codes: Vec<String> = catalog
            .regions
            .regions()
            .iter()
            .map(|r| r.code.clone())
            .collect();
        codes.push("ZZ".into());
        for code in codes {
            let language = catalog.regions.resolve(&code).language;
            let copies = catalog.templates.fallback(&catalog.regions, &product, &language);
            assert_eq!(copies.len(), 3);
            for copy in &copies {
                assert!(!copy.trim().is_empty(), "{code}");
                assert!(!copy.contains('{'), "unfilled placeholder for {code}: {copy}");
            }
        }
    }

    #[test]
    fn thai_fallback_meets_coverage() {
        let catalog = Catalog::embedded().unwrap();
        let copies = catalog.templates.fallback(&catalog.regions, &product(), "th-TH");
        for copy in &copies {
            assert!(coverage(copy, Script::Thai) >= 0.8, "{copy}");
            assert!(copy.contains("Wireless Earbuds"));
        }
    }

    #[test]
    fn fallback_copies_pass_the_validator_for_script_languages() {
        let catalog = Catalog::embedded().unwrap();
        let validator = LanguageValidator::default();
        for language in ["th-TH", "ko-KR", "ar-SA", "he-IL", "ru-RU", "el-GR", "ja-JP", "zh-CN", "lo-LA"] {
            for copy in catalog.templates.fallback(&catalog.regions, &product(), language) {
                assert!(validator.is_in_target_language(&copy, language), "{language}: {copy}");
            }
        }
    }

    #[test]
    fn dialects_use_the_normalized_bundle() {
        let catalog = Catalog::embedded().unwrap();
        let austria = catalog.templates.fallback(&catalog.regions, &product(), "de-AT");
        let germany = catalog.templates.fallback(&catalog.regions, &product(), "de-DE");
        assert_eq!(austria, germany);
    }

    #[test]
    fn unknown_language_uses_english() {
        let catalog = Catalog::embedded().unwrap();
        let copies = catalog.templates.fallback(&catalog.regions, &product(), "xx-XX");
        assert!(copies[0].starts_with("Meet Wireless Earbuds."));
    }

    #[test]
    fn template_count_is_enforced() {
        let raw = "bundles:\n  en-US:\n    call_to_action: Buy\n    templates: [\"only one {name}\"]\n";
        assert!(TemplateBook::from_yaml(raw).is_err());
    }

    #[test]
    fn default_bundle_must_exist() {
        let raw = "default_language: fr-FR\nbundles:\n  en-US:\n    call_to_action: Buy\n    templates: [a, b, c]\n";
        assert!(TemplateBook::from_yaml(raw).is_err());
    }
}
