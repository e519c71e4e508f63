//! Script and stop-word heuristics deciding whether a candidate is written in
//! the requested language. False negatives are acceptable: a rejected
//! candidate only sends the region to templates.

use crate::locale::primary_subtag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Thai,
    Lao,
    Hangul,
    Arabic,
    Hebrew,
    Cyrillic,
    Greek,
}

impl Script {
    pub fn contains(self, c: char) -> bool {
        let cp = c as u32;
        match self {
            Script::Thai => (0x0E00..=0x0E7F).contains(&cp),
            Script::Lao => (0x0E80..=0x0EFF).contains(&cp),
            Script::Hangul => is_hangul(c),
            Script::Arabic => {
                (0x0600..=0x06FF).contains(&cp)
                    || (0x0750..=0x077F).contains(&cp)
                    || (0x08A0..=0x08FF).contains(&cp)
                    || (0xFB50..=0xFDFF).contains(&cp)
                    || (0xFE70..=0xFEFF).contains(&cp)
            }
            Script::Hebrew => (0x0590..=0x05FF).contains(&cp) || (0xFB1D..=0xFB4F).contains(&cp),
            Script::Cyrillic => (0x0400..=0x052F).contains(&cp),
            Script::Greek => (0x0370..=0x03FF).contains(&cp) || (0x1F00..=0x1FFF).contains(&cp),
        }
    }
}

struct LatinSignature {
    diacritics: &'static str,
    stop_words: &'static [&'static str],
}

enum Rule {
    English,
    Latin(LatinSignature),
    Dedicated(Script),
    Japanese,
    Chinese,
}

fn latin(diacritics: &'static str, stop_words: &'static [&'static str]) -> Rule {
    Rule::Latin(LatinSignature {
        diacritics,
        stop_words,
    })
}

fn rule_for(tag: &str) -> Rule {
    match primary_subtag(tag).as_str() {
        "th" => Rule::Dedicated(Script::Thai),
        "lo" => Rule::Dedicated(Script::Lao),
        "ko" => Rule::Dedicated(Script::Hangul),
        "ar" | "fa" | "ur" => Rule::Dedicated(Script::Arabic),
        "he" => Rule::Dedicated(Script::Hebrew),
        "ru" | "uk" | "bg" | "sr" => Rule::Dedicated(Script::Cyrillic),
        "el" => Rule::Dedicated(Script::Greek),
        "ja" => Rule::Japanese,
        "zh" => Rule::Chinese,
        "fr" => latin("àâçéèêëîïôûùüÿœ", &["le", "la", "les", "de", "des", "et", "que", "pour", "vous", "votre"]),
        "de" => latin("äöüß", &["der", "die", "das", "und", "mit", "für", "ist", "nicht", "dein", "ihr"]),
        "es" => latin("áéíóúñ¿¡", &["el", "la", "los", "las", "de", "que", "y", "para", "con", "tu"]),
        "it" => latin("àèéìòù", &["il", "la", "di", "che", "e", "per", "con", "un", "una", "tuo"]),
        "pt" => latin("ãõçáéíóúâêô", &["o", "a", "de", "que", "e", "para", "com", "um", "uma", "você"]),
        "nl" => latin("ëïé", &["de", "het", "een", "en", "van", "voor", "met", "is", "niet", "jouw"]),
        "sv" => latin("åäö", &["och", "att", "det", "för", "med", "är", "din", "en"]),
        "nb" | "no" | "da" => latin("æøå", &["og", "det", "for", "med", "er", "ikke", "din", "en"]),
        "fi" => latin("äö", &["ja", "on", "että", "kanssa", "sinun", "se"]),
        "pl" => latin("ąćęłńóśźż", &["i", "w", "na", "z", "dla", "jest", "nie", "się"]),
        "cs" => latin("áčďéěíňóřšťúůýž", &["a", "je", "na", "pro", "se", "s", "v"]),
        "tr" => latin("çğıöşü", &["ve", "bir", "için", "ile", "bu", "çok"]),
        "vi" => latin(
            "ăâđêôơưàáảãạèéẻẽẹìíỉĩịòóỏõọùúủũụỳýỷỹỵ",
            &["và", "của", "cho", "với", "bạn", "những", "một", "là"],
        ),
        "id" | "ms" => latin("", &["dan", "yang", "untuk", "dengan", "anda", "ini", "di", "kamu"]),
        _ => Rule::English,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LanguageValidator {
    min_coverage: f32,
}

impl Default for LanguageValidator {
    fn default() -> Self {
        Self { min_coverage: 0.8 }
    }
}

impl LanguageValidator {
    pub fn new(min_coverage: f32) -> Self {
        Self { min_coverage }
    }

    pub fn is_in_target_language(&self, text: &str, language: &str) -> bool {
        let rule = rule_for(language);
        if !matches!(rule, Rule::Japanese | Rule::Chinese) && text.chars().any(is_han) {
            return false;
        }

        match rule {
            Rule::Dedicated(script) => {
                let target = text.chars().filter(|c| script.contains(*c)).count();
                target > 0 && coverage(text, script) >= self.min_coverage
            }
            Rule::Japanese => {
                text.chars().any(is_kana) && !has_foreign_block(text, &[is_kana, is_han])
            }
            Rule::Chinese => text.chars().any(is_han) && !has_foreign_block(text, &[is_han]),
            Rule::English => {
                text.chars().any(|c| c.is_ascii_alphabetic()) && !has_foreign_block(text, &[])
            }
            Rule::Latin(signature) => {
                if has_foreign_block(text, &[]) {
                    return false;
                }
                let lowered = text.to_lowercase();
                let has_diacritic = lowered.chars().any(|c| signature.diacritics.contains(c));
                has_diacritic
                    || lowered
                        .split(|c: char| !c.is_alphabetic())
                        .any(|word| signature.stop_words.iter().any(|stop| *stop == word))
            }
        }
    }
}

/// Share of letter-like characters that belong to `script`; 0 when the
/// text has no letters.
pub fn coverage(text: &str, script: Script) -> f32 {
    let mut target = 0usize;
    let mut letters = 0usize;
    for c in text.chars() {
        if script.contains(c) {
            target += 1;
            letters += 1;
        } else if c.is_alphabetic() {
            letters += 1;
        }
    }
    if letters == 0 {
        0.0
    } else {
        target as f32 / letters as f32
    }
}

pub fn is_han(c: char) -> bool {
    let cp = c as u32;
    (0x4E00..=0x9FFF).contains(&cp)
        || (0x3400..=0x4DBF).contains(&cp)
        || (0xF900..=0xFAFF).contains(&cp)
        || (0x20000..=0x2A6DF).contains(&cp)
}

pub fn is_kana(c: char) -> bool {
    let cp = c as u32;
    (0x3040..=0x30FF).contains(&cp) || (0x31F0..=0x31FF).contains(&cp) || (0xFF66..=0xFF9D).contains(&cp)
}

fn is_hangul(c: char) -> bool {
    let cp = c as u32;
    (0xAC00..=0xD7AF).contains(&cp) || (0x1100..=0x11FF).contains(&cp) || (0x3130..=0x318F).contains(&cp)
}

fn is_devanagari(c: char) -> bool {
    (0x0900..=0x097F).contains(&(c as u32))
}

/// Any major non-Latin block present, except the ones in `allowed`.
fn has_foreign_block(text: &str, allowed: &[fn(char) -> bool]) -> bool {
    const SCRIPTS: [Script; 7] = [
        Script::Thai,
        Script::Lao,
        Script::Hangul,
        Script::Arabic,
        Script::Hebrew,
        Script::Cyrillic,
        Script::Greek,
    ];
    text.chars().any(|c| {
        if allowed.iter().any(|is_allowed| is_allowed(c)) {
            return false;
        }
        is_han(c) || is_kana(c) || is_devanagari(c) || SCRIPTS.iter().any(|s| s.contains(c))
    })
}
