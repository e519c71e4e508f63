use crate::emoji::PaletteBook;
use crate::fallback::TemplateBook;
use crate::locale::RegionTable;
use crate::policy::PolicyLexicon;
use serde::de::DeserializeOwned;
use thiserror::Error;

const REGIONS_YAML: &str = include_str!("../data/regions.yaml");
const TEMPLATES_YAML: &str = include_str!("../data/templates.yaml");
const PALETTES_YAML: &str = include_str!("../data/emoji_palettes.yaml");
const LEXICON_YAML: &str = include_str!("../data/policy_lexicon.yaml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse {file}: {source}")]
    Yaml {
        file: &'static str,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid {file}: {message}")]
    Invalid {
        file: &'static str,
        message: String,
    },
}

impl CatalogError {
    pub fn invalid(file: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            file,
            message: message.into(),
        }
    }
}

/// Static lookup data, loaded once and shared read-only by every run.
#[derive(Debug)]
pub struct Catalog {
    pub regions: RegionTable,
    pub templates: TemplateBook,
    pub palettes: PaletteBook,
    pub lexicon: PolicyLexicon,
}

impl Catalog {
    /// Catalog compiled into the binary from `data/`.
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_sources(REGIONS_YAML, TEMPLATES_YAML, PALETTES_YAML, LEXICON_YAML)
    }

    pub fn from_sources(
        regions: &str,
        templates: &str,
        palettes: &str,
        lexicon: &str,
    ) -> Result<Self, CatalogError> {
        let regions = RegionTable::from_yaml(regions)?;
        let templates = TemplateBook::from_yaml(templates)?;
        let palettes = PaletteBook::from_yaml(palettes)?;
        let lexicon = PolicyLexicon::from_yaml(lexicon)?;

        for region in regions.regions() {
            let normalized = regions.normalize_language(&region.language);
            if !templates.has_bundle(&normalized) {
                tracing::debug!(
                    target = "adcopy.catalog",
                    region = %region.code,
                    language = %normalized,
                    "region without template bundle uses the default bundle"
                );
            }
        }

        Ok(Self {
            regions,
            templates,
            palettes,
            lexicon,
        })
    }
}

pub(crate) fn parse_yaml<T: DeserializeOwned>(
    file: &'static str,
    raw: &str,
) -> Result<T, CatalogError> {
    serde_yaml::from_str(raw).map_err(|source| CatalogError::Yaml { file, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_loads() {
        let catalog = Catalog::embedded().expect("embedded catalog");
        assert!(catalog.regions.regions().len() >= 40);
        assert!(catalog.templates.has_bundle("en-US"));
        assert!(catalog.lexicon.entry_count() > 10);
    }

    #[test]
    fn every_region_has_a_dedicated_bundle() {
        let catalog = Catalog::embedded().unwrap();
        for region in catalog.regions.regions() {
            let normalized = catalog.regions.normalize_language(&region.language);
            assert!(
                catalog.templates.has_bundle(&normalized),
                "{} ({}) has no bundle",
                region.code,
                normalized
            );
        }
    }

    #[test]
    fn malformed_yaml_reports_the_file() {
        let err = parse_yaml::<serde_yaml::Value>("regions.yaml", "regions: [unclosed")
            .expect_err("should fail");
        assert!(err.to_string().contains("regions.yaml"));
    }
}
