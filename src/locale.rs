use crate::catalog::{CatalogError, parse_yaml};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_LANGUAGE: &str = "en-US";

const FILE: &str = "regions.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionInfo {
    pub code: String,
    pub name: String,
    pub language: String,
}

/// A region code resolved for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRegion {
    pub code: String,
    pub name: String,
    pub language: String,
    pub known: bool,
}

#[derive(Debug, Deserialize)]
struct RegionFile {
    regions: Vec<RegionInfo>,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

#[derive(Debug)]
pub struct RegionTable {
    regions: Vec<RegionInfo>,
    by_code: HashMap<String, usize>,
    aliases: HashMap<String, String>,
}

impl RegionTable {
    pub fn from_yaml(raw: &str) -> Result<Self, CatalogError> {
        let file: RegionFile = parse_yaml(FILE, raw)?;

        let mut by_code = HashMap::new();
        let mut regions = Vec::with_capacity(file.regions.len());
        for mut region in file.regions {
            region.code = region.code.trim().to_ascii_uppercase();
            region.language = canonical_tag(&region.language);
            if region.code.is_empty() || region.language.is_empty() {
                return Err(CatalogError::invalid(FILE, "region with empty code or language"));
            }
            if by_code.insert(region.code.clone(), regions.len()).is_some() {
                return Err(CatalogError::invalid(
                    FILE,
                    format!("duplicate region {}", region.code),
                ));
            }
            regions.push(region);
        }

        let aliases = file
            .aliases
            .into_iter()
            .map(|(from, to)| (canonical_tag(&from), canonical_tag(&to)))
            .collect::<HashMap<_, _>>();
        // Targets may not be aliases themselves, which keeps normalization idempotent.
        if let Some((from, to)) = aliases.iter().find(|(_, to)| aliases.contains_key(*to)) {
            return Err(CatalogError::invalid(
                FILE,
                format!("alias {from} -> {to} points at another alias"),
            ));
        }

        Ok(Self {
            regions,
            by_code,
            aliases,
        })
    }

    pub fn regions(&self) -> &[RegionInfo] {
        &self.regions
    }

    pub fn get(&self, code: &str) -> Option<&RegionInfo> {
        self.by_code
            .get(&code.trim().to_ascii_uppercase())
            .map(|idx| &self.regions[*idx])
    }

    /// Unknown codes resolve to `en-US` and keep the code as display name.
    pub fn resolve(&self, code: &str) -> ResolvedRegion {
        let code = code.trim().to_ascii_uppercase();
        match self.get(&code) {
            Some(info) => ResolvedRegion {
                code,
                name: info.name.clone(),
                language: info.language.clone(),
                known: true,
            },
            None => ResolvedRegion {
                name: code.clone(),
                code,
                language: DEFAULT_LANGUAGE.to_string(),
                known: false,
            },
        }
    }

    /// Collapses dialects onto the tag used for templates, e.g. `de-AT -> de-DE`.
    pub fn normalize_language(&self, tag: &str) -> String {
        let canonical = canonical_tag(tag);
        self.aliases.get(&canonical).cloned().unwrap_or(canonical)
    }
}

/// `EN_us` / `en-us` -> `en-US`.
pub fn canonical_tag(tag: &str) -> String {
    let mut parts = tag.trim().split(['-', '_']).filter(|p| !p.is_empty());
    let Some(primary) = parts.next() else {
        return String::new();
    };
    let mut out = primary.to_ascii_lowercase();
    for part in parts {
        out.push('-');
        if part.len() == 2 {
            out.push_str(&part.to_ascii_uppercase());
        } else {
            out.push_str(part);
        }
    }
    out
}

/// Primary language subtag: `th-TH -> th`.
pub fn primary_subtag(tag: &str) -> String {
    canonical_tag(tag)
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn table() -> RegionTable {
        Catalog::embedded().unwrap().regions
    }

    #[test]
    fn resolves_known_regions() {
        let table = table();
        assert_eq!(table.resolve("US").language, "en-US");
        assert_eq!(table.resolve("th").language, "th-TH");
        let jp = table.resolve(" jp ");
        assert_eq!(jp.code, "JP");
        assert_eq!(jp.name, "Japan");
        assert_eq!(jp.language, "ja-JP");
        assert!(jp.known);
    }

    #[test]
    fn unknown_region_falls_back_to_english() {
        let table = table();
        let resolved = table.resolve("ZZ");
        assert_eq!(resolved.language, DEFAULT_LANGUAGE);
        assert_eq!(resolved.name, "ZZ");
        assert!(!resolved.known);
    }

    #[test]
    fn aliases_collapse_dialects() {
        let table = table();
        assert_eq!(table.normalize_language("de-AT"), "de-DE");
        assert_eq!(table.normalize_language("de-ch"), "de-DE");
        assert_eq!(table.normalize_language("es-MX"), "es-ES");
        assert_eq!(table.normalize_language("ar_EG"), "ar-SA");
        assert_eq!(table.normalize_language("en-AU"), "en-US");
        assert_eq!(table.normalize_language("th-TH"), "th-TH");
    }

    #[test]
    fn normalization_is_idempotent() {
        let table = table();
        let mut tags: Vec<String> = table.regions().iter().map(|r| r.language.clone()).collect();
        tags.extend(["xx-YY".to_string(), "fr-CA".to_string(), "es-US".to_string()]);
        for tag in tags {
            let once = table.normalize_language(&tag);
            assert_eq!(table.normalize_language(&once), once, "{tag}");
        }
    }

    #[test]
    fn alias_chains_are_rejected() {
        let raw = "regions: []\naliases:\n  de-AT: de-CH\n  de-CH: de-DE\n";
        let err = RegionTable::from_yaml(raw).expect_err("chain");
        assert!(err.to_string().contains("points at another alias"));
    }

    #[test]
    fn duplicate_regions_are_rejected() {
        let raw = "regions:\n  - { code: US, name: A, language: en-US }\n  - { code: us, name: B, language: en-US }\n";
        assert!(RegionTable::from_yaml(raw).is_err());
    }

    #[test]
    fn canonical_tag_forms() {
        assert_eq!(canonical_tag("EN_us"), "en-US");
        assert_eq!(canonical_tag("zh-Hant-TW"), "zh-Hant-TW");
        assert_eq!(primary_subtag("pt-BR"), "pt");
        assert_eq!(canonical_tag("  "), "");
    }
}
