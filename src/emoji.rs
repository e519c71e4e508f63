use crate::catalog::{CatalogError, parse_yaml};
use crate::models::DiversitySeed;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::iter::Peekable;
use std::str::Chars;

const FILE: &str = "emoji_palettes.yaml";

const ZWJ: char = '\u{200D}';
const VARIATION_SELECTOR: char = '\u{FE0F}';

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmojiPalette {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
    pub cultural: Vec<String>,
    pub business: Vec<String>,
}

impl EmojiPalette {
    fn categories(&self) -> [&[String]; 4] {
        [
            self.primary.as_slice(),
            self.secondary.as_slice(),
            self.cultural.as_slice(),
            self.business.as_slice(),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
struct PaletteOverride {
    primary: Option<Vec<String>>,
    secondary: Option<Vec<String>>,
    cultural: Option<Vec<String>>,
    business: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct PaletteFile {
    default: EmojiPalette,
    #[serde(default)]
    regions: HashMap<String, PaletteOverride>,
}

/// Default palette plus per-region category overrides.
#[derive(Debug)]
pub struct PaletteBook {
    default: EmojiPalette,
    regions: HashMap<String, PaletteOverride>,
}

impl PaletteBook {
    pub fn from_yaml(raw: &str) -> Result<Self, CatalogError> {
        let file: PaletteFile = parse_yaml(FILE, raw)?;
        if file.default.categories().iter().any(|c| c.is_empty()) {
            return Err(CatalogError::invalid(FILE, "default palette has an empty category"));
        }

        let regions = file
            .regions
            .into_iter()
            .map(|(code, palette)| (code.trim().to_ascii_uppercase(), palette))
            .collect::<HashMap<_, _>>();

        if let Some(bad) = first_invalid_entry(&file.default, &regions) {
            return Err(CatalogError::invalid(
                FILE,
                format!("palette entry {bad:?} is not a single emoji"),
            ));
        }

        Ok(Self {
            default: file.default,
            regions,
        })
    }

    pub fn palette_for(&self, region: &str) -> EmojiPalette {
        let Some(custom) = self.regions.get(&region.trim().to_ascii_uppercase()) else {
            return self.default.clone();
        };
        let pick = |custom: &Option<Vec<String>>, fallback: &Vec<String>| {
            custom
                .as_ref()
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .clone()
        };
        EmojiPalette {
            primary: pick(&custom.primary, &self.default.primary),
            secondary: pick(&custom.secondary, &self.default.secondary),
            cultural: pick(&custom.cultural, &self.default.cultural),
            business: pick(&custom.business, &self.default.business),
        }
    }
}

fn first_invalid_entry(
    default: &EmojiPalette,
    regions: &HashMap<String, PaletteOverride>,
) -> Option<String> {
    let overrides = regions.values().flat_map(|o| {
        [&o.primary, &o.secondary, &o.cultural, &o.business]
            .into_iter()
            .flatten()
            .flatten()
    });
    default
        .categories()
        .into_iter()
        .flatten()
        .chain(overrides)
        .find(|e| count_emoji(e) != 1)
        .cloned()
}

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

fn is_skin_tone(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

/// Code points that render as emoji on their own.
fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F300..=0x1F64F
        | 0x1F680..=0x1F6FF
        | 0x1F7E0..=0x1F7EB
        | 0x1F900..=0x1F9FF
        | 0x1FA70..=0x1FAFF
        | 0x1F004 | 0x1F0CF | 0x1F18E | 0x1F191..=0x1F19A
        | 0x1F201 | 0x1F21A | 0x1F22F | 0x1F232..=0x1F23A | 0x1F250..=0x1F251
        | 0x231A..=0x231B | 0x23E9..=0x23EC | 0x23F0 | 0x23F3
        | 0x25FD..=0x25FE
        | 0x2614..=0x2615 | 0x2648..=0x2653 | 0x267F | 0x2693 | 0x26A1
        | 0x26AA..=0x26AB | 0x26BD..=0x26BE | 0x26C4..=0x26C5 | 0x26CE
        | 0x26D4 | 0x26EA | 0x26F2..=0x26F3 | 0x26F5 | 0x26FA | 0x26FD
        | 0x2705 | 0x270A..=0x270B | 0x2728 | 0x274C | 0x274E
        | 0x2753..=0x2755 | 0x2757 | 0x2795..=0x2797 | 0x27B0 | 0x27BF
        | 0x2B1B..=0x2B1C | 0x2B50 | 0x2B55)
}

/// Symbols that are plain text unless followed by U+FE0F, like ❤ or ✔.
fn is_text_symbol(c: char) -> bool {
    matches!(c as u32,
        0x00A9 | 0x00AE | 0x203C | 0x2049 | 0x2122 | 0x2139
        | 0x2194..=0x21AA | 0x2300..=0x23FF | 0x25AA..=0x25FE
        | 0x2600..=0x27BF | 0x2934..=0x2935 | 0x2B05..=0x2B55
        | 0x3030 | 0x303D | 0x3297 | 0x3299)
}

/// Emoji clusters in `text`. Flags count once, modifiers and ZWJ-joined
/// components are folded into the emoji they follow. Text symbols such as
/// ✓ or ★ only count with a variation selector.
pub fn emoji_in(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let mut cluster = c.to_string();
        if is_regional_indicator(c) {
            if let Some(second) = chars.next_if(|n| is_regional_indicator(*n)) {
                cluster.push(second);
            }
        } else if !is_emoji(c) && !(is_text_symbol(c) && chars.peek() == Some(&VARIATION_SELECTOR)) {
            continue;
        }
        extend_cluster(&mut chars, &mut cluster);
        found.push(cluster);
    }
    found
}

fn extend_cluster(chars: &mut Peekable<Chars<'_>>, cluster: &mut String) {
    loop {
        if let Some(modifier) = chars.next_if(|n| *n == VARIATION_SELECTOR || is_skin_tone(*n)) {
            cluster.push(modifier);
        } else if let Some(joiner) = chars.next_if_eq(&ZWJ) {
            cluster.push(joiner);
            match chars.next() {
                Some(joined) => cluster.push(joined),
                None => break,
            }
        } else {
            break;
        }
    }
}

pub fn count_emoji(text: &str) -> usize {
    emoji_in(text).len()
}

/// Raises a copy's emoji count into `[density, max_density]`, drawing from a
/// region palette. One instance serves one region's batch: emoji used by an
/// earlier slot are avoided until the palette runs out.
pub struct EmojiEnhancer {
    palette: EmojiPalette,
    density: usize,
    max_density: usize,
    seed: DiversitySeed,
    region: String,
    used: HashSet<String>,
}

impl EmojiEnhancer {
    pub fn new(
        palette: EmojiPalette,
        density: usize,
        max_density: usize,
        seed: &DiversitySeed,
        region: &str,
    ) -> Self {
        Self {
            palette,
            density,
            max_density: max_density.max(density),
            seed: seed.clone(),
            region: region.to_string(),
            used: HashSet::new(),
        }
    }

    pub fn enhance(&mut self, text: &str, slot: usize) -> String {
        let existing = count_emoji(text);
        if existing >= self.density {
            return text.to_string();
        }

        let mut rng = SmallRng::seed_from_u64(self.seed.slot_seed(&self.region, slot));
        let target = rng.random_range(self.density..=self.max_density);
        let picks = self.pick(target - existing, slot, &mut rng);
        place(text, &picks)
    }

    /// Palette ordered for `slot`: categories rotated so each slot leads with
    /// a different one, each category shuffled.
    fn pool(&self, slot: usize, rng: &mut SmallRng) -> Vec<String> {
        let mut categories = self.palette.categories();
        let len = categories.len();
        categories.rotate_left(slot % len);

        let mut seen = HashSet::new();
        let mut pool = Vec::new();
        for category in categories {
            let mut shuffled = category.to_vec();
            shuffled.shuffle(rng);
            for emoji in shuffled {
                if seen.insert(emoji.clone()) {
                    pool.push(emoji);
                }
            }
        }
        pool
    }

    fn pick(&mut self, needed: usize, slot: usize, rng: &mut SmallRng) -> Vec<String> {
        let pool = self.pool(slot, rng);
        let mut picks: Vec<String> = Vec::with_capacity(needed);
        if pool.is_empty() {
            return picks;
        }

        while picks.len() < needed {
            let fresh = pool
                .iter()
                .find(|e| !self.used.contains(*e) && !picks.contains(*e))
                .cloned();
            match fresh {
                Some(emoji) => {
                    self.used.insert(emoji.clone());
                    picks.push(emoji);
                }
                None if pool.iter().all(|e| picks.contains(e)) => {
                    // Palette smaller than one copy's need.
                    picks.push(pool[picks.len() % pool.len()].clone());
                }
                None => self.used.clear(),
            }
        }
        picks
    }
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

/// Scripts written without sentence punctuation, where a space ends a phrase.
fn spaces_phrases(c: char) -> bool {
    matches!(c as u32, 0x0E00..=0x0EFF | 0x1000..=0x109F | 0x1780..=0x17FF)
}

/// Byte offsets after which an emoji may go, and whether it needs a
/// separating space.
fn sentence_breaks(body: &str) -> Vec<(usize, bool)> {
    let mut breaks = Vec::new();
    let mut chars = body.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if !is_sentence_end(c) {
            continue;
        }
        let end = idx + c.len_utf8();
        match chars.peek() {
            // The end of the text is taken by the appended emoji.
            None => {}
            Some((_, next)) if c.is_ascii() && !next.is_whitespace() => {}
            Some((_, next)) if is_sentence_end(*next) => {}
            Some(_) => breaks.push((end, c.is_ascii())),
        }
    }
    breaks
}

/// Phrase gaps for Thai, Lao, Khmer and Burmese copy, spread evenly over
/// the text for `wanted` emoji.
fn phrase_breaks(body: &str, wanted: usize) -> Vec<(usize, bool)> {
    if wanted == 0 || !body.chars().any(spaces_phrases) {
        return Vec::new();
    }
    let gaps: Vec<usize> = body
        .char_indices()
        .zip(body.chars().skip(1))
        .filter(|((_, c), next)| !c.is_whitespace() && next.is_whitespace())
        .map(|((idx, c), _)| idx + c.len_utf8())
        .collect();
    if gaps.is_empty() {
        return Vec::new();
    }
    let mut chosen: Vec<usize> = (1..=wanted)
        .map(|i| gaps[i * gaps.len() / (wanted + 1)])
        .collect();
    chosen.dedup();
    chosen.into_iter().map(|end| (end, true)).collect()
}

/// First pick prepended, second appended, the rest after sentence-ending
/// punctuation (or between phrases in scripts that have none); whatever
/// finds no slot goes to the end.
fn place(text: &str, picks: &[String]) -> String {
    let Some((first, rest)) = picks.split_first() else {
        return text.to_string();
    };
    let (appended, middle) = match rest.split_first() {
        Some((second, middle)) => (Some(second), middle),
        None => (None, &[][..]),
    };

    let body = text.trim();
    let mut breaks = sentence_breaks(body);
    if breaks.is_empty() {
        breaks = phrase_breaks(body, middle.len());
    }

    let mut out = String::with_capacity(body.len() + picks.len() * 8);
    out.push_str(first);
    out.push(' ');

    let mut cursor = 0;
    let mut pending = middle.iter();
    for (end, ascii) in breaks {
        let Some(emoji) = pending.next() else { break };
        out.push_str(&body[cursor..end]);
        if ascii {
            out.push(' ');
        }
        out.push_str(emoji);
        cursor = end;
    }
    out.push_str(&body[cursor..]);

    for emoji in pending.chain(appended) {
        out.push(' ');
        out.push_str(emoji);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn palette() -> EmojiPalette {
        Catalog::embedded().unwrap().palettes.palette_for("TH")
    }

    fn enhancer(palette: EmojiPalette) -> EmojiEnhancer {
        EmojiEnhancer::new(palette, 4, 6, &DiversitySeed::from("run-1"), "TH")
    }

    const PLAIN: &str = "Wireless earbuds for commuters. Long battery life! Order today?";

    #[test]
    fn counts_clusters_not_codepoints() {
        assert_eq!(count_emoji("no emoji here"), 0);
        assert_eq!(count_emoji("🇹🇭 flag"), 1);
        assert_eq!(count_emoji("☕️ with selector"), 1);
        assert_eq!(count_emoji("👍🏽 toned"), 1);
        assert_eq!(count_emoji("👩‍💻 joined"), 1);
        assert_eq!(count_emoji("🔥✨🚀"), 3);
        assert_eq!(count_emoji("หูฟัง 。！"), 0);
        assert_eq!(count_emoji("❤️ love"), 1);
        assert_eq!(count_emoji("👨‍👩‍👧 family"), 1);
    }

    #[test]
    fn text_symbols_are_not_emoji() {
        assert_eq!(count_emoji("Sound ✓ Battery ★ Music ♪ Next ➜ ©"), 0);
        assert_eq!(count_emoji("Done ✔️ and ❤ plain"), 1);
    }

    #[test]
    fn checkmark_copy_still_gets_emoji() {
        let text = "Sound ✓ Battery ✓ Comfort ✓ Price ✓ for every commuter.";
        let out = enhancer(palette()).enhance(text, 0);
        assert_ne!(out, text);
        assert!((4..=6).contains(&count_emoji(&out)), "{out}");
        assert!(out.contains("Sound ✓ Battery ✓"));
    }

    #[test]
    fn every_palette_entry_is_one_emoji() {
        let catalog = Catalog::embedded().unwrap();
        for region in catalog.regions.regions() {
            let palette = catalog.palettes.palette_for(&region.code);
            for emoji in palette.categories().into_iter().flatten() {
                assert_eq!(count_emoji(emoji), 1, "{} {emoji}", region.code);
            }
        }
    }

    #[test]
    fn region_overrides_replace_only_their_category() {
        let catalog = Catalog::embedded().unwrap();
        let thai = catalog.palettes.palette_for("th");
        let unknown = catalog.palettes.palette_for("ZZ");
        assert!(thai.cultural.contains(&"🇹🇭".to_string()));
        assert_eq!(thai.primary, unknown.primary);
        assert_ne!(thai.cultural, unknown.cultural);
    }

    #[test]
    fn enhanced_copies_land_in_the_density_band() {
        let mut enhancer = enhancer(palette());
        for slot in 0..3 {
            let out = enhancer.enhance(PLAIN, slot);
            let count = count_emoji(&out);
            assert!((4..=6).contains(&count), "slot {slot}: {count} in {out}");
        }
    }

    #[test]
    fn copies_at_density_are_untouched() {
        let text = "🔥 Great deal ✨ on earbuds 🚀 today 💯";
        assert_eq!(enhancer(palette()).enhance(text, 0), text);
        let crowded = "🔥✨🚀💯🎉🌟⚡ too many already";
        assert_eq!(enhancer(palette()).enhance(crowded, 1), crowded);
    }

    #[test]
    fn slots_use_disjoint_emoji() {
        let mut enhancer = enhancer(palette());
        let mut seen = HashSet::new();
        for slot in 0..3 {
            for emoji in emoji_in(&enhancer.enhance(PLAIN, slot)) {
                assert!(seen.insert(emoji.clone()), "{emoji} reused");
            }
        }
    }

    #[test]
    fn enhancement_is_reproducible_per_seed() {
        let a = enhancer(palette()).enhance(PLAIN, 1);
        let b = enhancer(palette()).enhance(PLAIN, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn exhausted_palette_resets_instead_of_blocking() {
        let tiny = EmojiPalette {
            primary: vec!["🔥".into()],
            secondary: vec!["✨".into()],
            cultural: vec!["🔥".into()],
            business: vec!["✨".into()],
        };
        let mut enhancer = EmojiEnhancer::new(tiny, 3, 3, &DiversitySeed::from("x"), "US");
        for slot in 0..3 {
            assert_eq!(count_emoji(&enhancer.enhance(PLAIN, slot)), 3);
        }
    }

    #[test]
    fn placement_never_splits_words() {
        let picks: Vec<String> = ["🔥", "✨", "🚀", "💯"].iter().map(|s| s.to_string()).collect();
        let out = place("Version 2.0 is here. Buy now! Thanks", &picks);
        assert_eq!(out, "🔥 Version 2.0 is here. 🚀 Buy now! 💯 Thanks ✨");
    }

    #[test]
    fn placement_after_full_width_punctuation() {
        let picks: Vec<String> = ["🔥", "✨", "🚀"].iter().map(|s| s.to_string()).collect();
        let out = place("通勤にぴったり。今すぐ購入！", &picks);
        assert_eq!(out, "🔥 通勤にぴったり。🚀今すぐ購入！ ✨");
    }

    #[test]
    fn leftover_emoji_go_to_the_end() {
        let picks: Vec<String> = ["🔥", "✨", "🚀", "💯"].iter().map(|s| s.to_string()).collect();
        let out = place("no punctuation at all", &picks);
        assert_eq!(out, "🔥 no punctuation at all 🚀 💯 ✨");
    }

    #[test]
    fn thai_copy_takes_emoji_between_phrases() {
        let picks: Vec<String> = ["🔥", "✨", "🚀", "💯"].iter().map(|s| s.to_string()).collect();
        let out = place("หูฟังไร้สาย เสียงชัด แบตอึด ใช้ได้ทุกวัน", &picks);
        assert_eq!(out, "🔥 หูฟังไร้สาย เสียงชัด 🚀 แบตอึด 💯 ใช้ได้ทุกวัน ✨");
    }

    #[test]
    fn single_phrase_thai_copy_appends_leftovers() {
        let picks: Vec<String> = ["🔥", "✨", "🚀"].iter().map(|s| s.to_string()).collect();
        let out = place("หูฟังไร้สายคุณภาพสูง", &picks);
        assert_eq!(out, "🔥 หูฟังไร้สายคุณภาพสูง 🚀 ✨");
    }
}
