//! Text normalization for similarity signatures.
//!
//! All functions here are pure and deterministic. Signatures are only
//! comparable when both sides went through the same normalization, so any
//! change to these rules invalidates persisted signatures.

use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Default n-gram width for MinHash shingles.
pub const DEFAULT_NGRAM_SIZE: usize = 5;

/// Default maximum lead length in characters.
pub const DEFAULT_LEAD_MAX_CHARS: usize = 300;

static DOUBLE_QUOTES: LazyLock<Regex> = LazyLock::new(|| compile(r#"[“”„‟«»]"#));

static SINGLE_QUOTES: LazyLock<Regex> = LazyLock::new(|| compile(r"[‘’‚‛‹›]"));

static URLS: LazyLock<Regex> = LazyLock::new(|| compile(r"https?://\S+"));

static WIRE_TAGS: LazyLock<Regex> = LazyLock::new(|| compile(r"\((?:reuters|ap|afp|upi)\)"));

static BYLINES: LazyLock<Regex> = LazyLock::new(|| compile(r"\bby [a-z\s.'-]+? \| "));

static TIMESTAMPS: LazyLock<Regex> = LazyLock::new(|| {
    const DATE_WORD: &str = r"(?:\d{1,4}|(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?|mon(?:day)?|tue(?:s(?:day)?)?|wed(?:nesday)?|thu(?:r(?:s(?:day)?)?)?|fri(?:day)?|sat(?:urday)?|sun(?:day)?)\b\.?)";
    const TAIL_WORD: &str = r"(?:a\.?m\.?|p\.?m\.?|utc|gmt|bst|cet|cest|[ecmp][sd]?t)\b";
    compile(&format!(
        r"\b(?:published|updated)(?:\s+(?:on|at))?:?\s+{DATE_WORD}(?:[\s:,./-]+(?:{DATE_WORD}|{TAIL_WORD}))*"
    ))
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| compile(r"\s+"));

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => panic!("invalid built-in normalization pattern {pattern:?}: {e}"),
    }
}

/// Normalizes text for similarity comparison.
///
/// Lowercases, unifies quote characters, strips URLs, wire-service tags
/// such as `(reuters)`, `by ... | ` bylines and `published`/`updated`
/// timestamps, then collapses whitespace.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = text.to_lowercase();
    let text = DOUBLE_QUOTES.replace_all(&text, "\"");
    let text = SINGLE_QUOTES.replace_all(&text, "'");
    let text = URLS.replace_all(&text, "");
    let text = WIRE_TAGS.replace_all(&text, "");
    let text = BYLINES.replace_all(&text, "");
    let text = TIMESTAMPS.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Extracts the leading sentences of `content`, up to `max_len` characters.
///
/// Whole sentences are accumulated until the next one would exceed the
/// limit. If not even the first sentence fits, the first `max_len`
/// characters are returned instead.
pub fn extract_lead(content: &str, max_len: usize) -> String {
    let content = content.trim();
    if content.is_empty() || max_len == 0 {
        return String::new();
    }

    let mut lead = String::new();
    let mut lead_chars = 0;
    for sentence in content.unicode_sentences() {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        let sentence_chars = sentence.chars().count();
        let separator = usize::from(!lead.is_empty());
        if lead_chars + separator + sentence_chars > max_len {
            break;
        }
        if separator == 1 {
            lead.push(' ');
        }
        lead.push_str(sentence);
        lead_chars += separator + sentence_chars;
    }

    if lead.is_empty() {
        content.chars().take(max_len).collect()
    } else {
        lead
    }
}

/// Generates overlapping character n-grams from already normalized text.
///
/// Returns an empty vector when the text has fewer than `n` characters.
pub fn generate_ngrams(text: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if n == 0 || chars.len() < n {
        return Vec::new();
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// The normalized text an article's signatures are computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureText {
    pub normalized_title: String,
    pub normalized_lead: String,
}

impl SignatureText {
    /// Normalizes an article's title and the lead of its content.
    pub fn from_article(title: &str, content: &str, lead_max_chars: usize) -> Self {
        Self {
            normalized_title: normalize(title),
            normalized_lead: normalize(&extract_lead(content, lead_max_chars)),
        }
    }

    /// Title and lead joined by a single space.
    pub fn combined(&self) -> String {
        match (self.normalized_title.is_empty(), self.normalized_lead.is_empty()) {
            (false, false) => format!("{} {}", self.normalized_title, self.normalized_lead),
            (false, true) => self.normalized_title.clone(),
            (true, _) => self.normalized_lead.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize("  Hello\n\tWORLD  "), "hello world");
    }

    #[test]
    fn normalize_empty() {
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_unifies_quotes() {
        assert_eq!(normalize("“Quoted” ‘single’"), "\"quoted\" 'single'");
    }

    #[test]
    fn normalize_strips_urls() {
        assert_eq!(
            normalize("Read more at https://example.com/story?utm=1 today"),
            "read more at today"
        );
    }

    #[test]
    fn normalize_strips_wire_tags() {
        assert_eq!(
            normalize("LONDON (Reuters) - Markets fell (AP)"),
            "london - markets fell"
        );
    }

    #[test]
    fn normalize_strips_bylines() {
        assert_eq!(
            normalize("By Jane Doe | The council voted"),
            "the council voted"
        );
    }

    #[test]
    fn normalize_strips_timestamps() {
        assert_eq!(
            normalize("Published March 3, 2024 10:15 am ET The council voted"),
            "the council voted"
        );
        assert_eq!(
            normalize("Updated: 2024-03-03 Rates unchanged"),
            "rates unchanged"
        );
    }

    #[test]
    fn normalize_keeps_published_without_date() {
        assert_eq!(
            normalize("The study published results"),
            "the study published results"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("BREAKING: “Storm” hits (Reuters) https://x.io/a   coast");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn extract_lead_accumulates_whole_sentences() {
        let content = "First sentence here. Second one follows. Third is long enough to overflow.";
        assert_eq!(
            extract_lead(content, 45),
            "First sentence here. Second one follows."
        );
    }

    #[test]
    fn extract_lead_falls_back_to_hard_slice() {
        let content = "A single very long sentence without any break at all";
        assert_eq!(extract_lead(content, 10), "A single v");
    }

    #[test]
    fn extract_lead_handles_multibyte_slices() {
        let content = "Ünïcödé téxt wïthöüt ä stöp";
        let lead = extract_lead(content, 5);
        assert_eq!(lead.chars().count(), 5);
        assert_eq!(lead, "Ünïcö");
    }

    #[test]
    fn extract_lead_empty() {
        assert_eq!(extract_lead("", 300), "");
        assert_eq!(extract_lead("   ", 300), "");
    }

    #[test]
    fn ngrams_slide_over_chars() {
        assert_eq!(generate_ngrams("abcdef", 5), vec!["abcde", "bcdef"]);
    }

    #[test]
    fn ngrams_short_text_is_empty() {
        assert!(generate_ngrams("abcd", 5).is_empty());
        assert!(generate_ngrams("", 5).is_empty());
    }

    #[test]
    fn ngrams_count_matches_window() {
        let text = "the quick brown fox";
        assert_eq!(generate_ngrams(text, 5).len(), text.chars().count() - 4);
    }

    #[test]
    fn signature_text_combines_title_and_lead() {
        let text = SignatureText::from_article(
            "Storm Hits Coast",
            "A powerful storm made landfall. Thousands lost power.",
            DEFAULT_LEAD_MAX_CHARS,
        );
        assert_eq!(text.normalized_title, "storm hits coast");
        assert_eq!(
            text.combined(),
            "storm hits coast a powerful storm made landfall. thousands lost power."
        );
    }

    #[test]
    fn signature_text_without_content() {
        let text = SignatureText::from_article("Only A Title", "", DEFAULT_LEAD_MAX_CHARS);
        assert_eq!(text.combined(), "only a title");
    }
}
