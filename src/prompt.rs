use crate::config::COPIES_PER_REGION;
use crate::emoji::EmojiPalette;
use crate::llm::ChatMessage;
use crate::locale::{ResolvedRegion, primary_subtag};
use crate::models::{DiversitySeed, ProductInfo};

const SYSTEM_PROMPT: &str = r#"
You are a senior performance-marketing copywriter who writes Facebook ad copy for local markets.
You write natively in the requested language, never mixing in another language or script except for
brand and product names. Each copy is a single short paragraph without hashtags, markdown or HTML.
Follow the exact output format you are given and output nothing else.
"#;

/// Everything one region's request needs.
#[derive(Debug, Clone)]
pub struct PromptSpec<'a> {
    pub product: &'a ProductInfo,
    pub region: &'a ResolvedRegion,
    pub emoji_rules: String,
    pub seed: &'a DiversitySeed,
}

impl PromptSpec<'_> {
    /// Ordered `[system, user]` messages.
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_PROMPT.trim()),
            ChatMessage::user(self.user_prompt()),
        ]
    }

    fn user_prompt(&self) -> String {
        let language = language_name(&self.region.language);
        let promotion = self
            .product
            .promotion
            .prompt_label()
            .map(|label| format!("Promotion to highlight: {label}.\n"))
            .unwrap_or_default();
        format!(
            "Write {count} different Facebook ad copies for customers in {region} ({code}).\n\
             Language: {language} ({tag}). Every sentence must be in {language}.\n\
             Product name: {name}\n\
             Key features: {features}\n\
             Target audience: {audience}\n\
             Tone: {style}.\n\
             {promotion}\
             Each copy must be between 60 and 300 characters and should read differently from the others: \
             vary the opening hook, the benefit you lead with and the call to action.\n\
             {emoji_rules}\n\
             Variation token: {seed}. Use it only to vary your wording, never print it.\n\
             Output format, exactly: Copy 1: <text> | Copy 2: <text> | Copy 3: <text>",
            count = COPIES_PER_REGION,
            region = self.region.name,
            code = self.region.code,
            tag = self.region.language,
            name = self.product.name,
            features = self.product.features,
            audience = self.product.target_audience,
            style = self.product.style.prompt_label(),
            emoji_rules = self.emoji_rules,
            seed = self.seed,
        )
    }
}

/// Emoji guidance for one region, derived from its palette.
pub fn emoji_rules(palette: &EmojiPalette, density: usize, max_density: usize) -> String {
    let sample = palette
        .cultural
        .iter()
        .chain(palette.primary.iter())
        .take(8)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "Emoji: use {density} to {max_density} emoji per copy, for example {sample}. \
         Do not reuse the same emoji across the three copies and never put an emoji inside a word."
    )
}

/// English name of a language tag, for the prompt.
pub fn language_name(tag: &str) -> &'static str {
    match primary_subtag(tag).as_str() {
        "en" => "English",
        "de" => "German",
        "fr" => "French",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "sv" => "Swedish",
        "nb" | "no" => "Norwegian",
        "da" => "Danish",
        "fi" => "Finnish",
        "pl" => "Polish",
        "cs" => "Czech",
        "tr" => "Turkish",
        "el" => "Greek",
        "ru" => "Russian",
        "uk" => "Ukrainian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" if tag.ends_with("TW") || tag.ends_with("HK") => "Traditional Chinese",
        "zh" => "Simplified Chinese",
        "th" => "Thai",
        "vi" => "Vietnamese",
        "id" => "Indonesian",
        "ms" => "Malay",
        "lo" => "Lao",
        "ar" => "Arabic",
        "he" => "Hebrew",
        "fa" => "Persian",
        "ur" => "Urdu",
        _ => "English",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdStyle, Promotion};

    fn product() -> ProductInfo {
        ProductInfo {
            name: "Wireless Earbuds".into(),
            features: "ANC, long battery".into(),
            target_audience: "commuters".into(),
            regions: vec!["TH".into()],
            style: AdStyle::Confident,
            promotion: Promotion::Discount,
        }
    }

    fn thailand() -> ResolvedRegion {
        ResolvedRegion {
            code: "TH".into(),
            name: "Thailand".into(),
            language: "th-TH".into(),
            known: true,
        }
    }

    #[test]
    fn messages_are_system_then_user() {
        let product = product();
        let region = thailand();
        let seed = DiversitySeed::from("seed-123");
        let prompt = PromptSpec {
            product: &product,
            region: &region,
            emoji_rules: "Emoji: use 4 to 6".into(),
            seed: &seed,
        };
        let messages = prompt.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");

        let user = &messages[1].content;
        assert!(user.contains("Thai (th-TH)"));
        assert!(user.contains("Wireless Earbuds"));
        assert!(user.contains("confident and bold"));
        assert!(user.contains("limited discount"));
        assert!(user.contains("seed-123"));
        assert!(user.contains("Emoji: use 4 to 6"));
        assert!(user.contains("Copy 1: <text> | Copy 2: <text> | Copy 3: <text>"));
    }

    #[test]
    fn no_promotion_line_without_promotion() {
        let mut product = product();
        product.promotion = Promotion::None;
        let region = thailand();
        let seed = DiversitySeed::from("s");
        let prompt = PromptSpec {
            product: &product,
            region: &region,
            emoji_rules: String::new(),
            seed: &seed,
        };
        assert!(!prompt.messages()[1].content.contains("Promotion to highlight"));
    }

    #[test]
    fn emoji_rules_mention_band_and_palette() {
        let palette = EmojiPalette {
            primary: vec!["✨".into()],
            secondary: vec![],
            cultural: vec!["🇹🇭".into(), "🐘".into()],
            business: vec![],
        };
        let rules = emoji_rules(&palette, 4, 6);
        assert!(rules.contains("4 to 6"));
        assert!(rules.contains("🇹🇭 🐘 ✨"));
    }

    #[test]
    fn language_names() {
        assert_eq!(language_name("zh-TW"), "Traditional Chinese");
        assert_eq!(language_name("zh-CN"), "Simplified Chinese");
        assert_eq!(language_name("xx-XX"), "English");
    }
}
