use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("valid html tag regex"));
static COPY_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)copy\s*\d+\s*[:：]\s*").expect("valid copy label regex"));
static MARKDOWN_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*#{1,6}\s+").expect("valid heading regex"));
static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid link regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const BANNED: &[char] = &[
    '*', '#', '|', '~', '^', '`', '[', ']', '{', '}', '<', '>', '\u{200B}', '\u{200C}',
    '\u{2060}', '\u{FEFF}',
];

const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('“', '”'),
    ('「', '」'),
    ('『', '』'),
    ('«', '»'),
];

/// Strips markup, labels and banned characters from one candidate copy.
/// ZWJ is kept so joined emoji survive.
pub fn clean_copy(text: &str) -> String {
    let text = HTML_TAG.replace_all(text, " ");
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    let text = MARKDOWN_HEADING.replace_all(&text, "");
    let text = COPY_LABEL.replace(text.trim(), "");
    let stripped: String = text.chars().filter(|c| !BANNED.contains(c)).collect();
    let collapsed = WHITESPACE.replace_all(stripped.trim(), " ");
    unquote(&collapsed).to_string()
}

fn unquote(text: &str) -> &str {
    let mut current = text.trim();
    loop {
        let mut chars = current.chars();
        let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
            return current;
        };
        if !QUOTE_PAIRS.contains(&(first, last)) {
            return current;
        }
        current = current[first.len_utf8()..current.len() - last.len_utf8()].trim();
    }
}
