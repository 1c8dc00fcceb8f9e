use std::collections::HashSet;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// matches `#token`, where `token` stops at whitespace or another `#`
fn hashtag_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([^\s#]+)").expect("static pattern"))
}

/// default cap on hashtags extracted per item during indexing
pub const DEFAULT_MAX_TAGS: usize = 80;

fn fold_fullwidth_hash(s: &str) -> String {
    s.replace('＃', "#")
}

fn nfkc(s: &str) -> String {
    s.nfkc().collect()
}

const LEADING_BRACKETS: &[(char, char)] = &[
    ('(', ')'),
    ('[', ']'),
    ('{', '}'),
    ('「', '」'),
    ('『', '』'),
    ('“', '”'),
    ('‘', '’'),
    ('<', '>'),
    ('《', '》'),
    ('〈', '〉'),
];

fn is_trailing_punct(c: char) -> bool {
    matches!(
        c,
        ',' | '.' | '!' | '?' | ':' | ';' | '、' | '，' | '．' | '！' | '？' | '：' | '；'
            | ')' | ']' | '}' | '」' | '』' | '”' | '’' | '>' | '》' | '〉'
    )
}

/// strip trailing punctuation/closing brackets, then a single matching
/// leading/trailing bracket pair, then trim whitespace
fn clean_token(raw: &str) -> String {
    let mut s = raw.trim();

    while let Some(c) = s.chars().next_back() {
        if is_trailing_punct(c) {
            s = &s[..s.len() - c.len_utf8()];
        } else {
            break;
        }
    }

    if let Some(first) = s.chars().next() {
        if let Some((_, close)) = LEADING_BRACKETS.iter().find(|(open, _)| *open == first) {
            if s.len() > first.len_utf8() && s.ends_with(*close) {
                s = &s[first.len_utf8()..s.len() - close.len_utf8()];
            }
        }
    }

    s.trim().to_owned()
}

/// extract up to `max` distinct (case-insensitively) hashtags from free text
pub fn extract_hashtags(text: &str, max: usize) -> Vec<String> {
    let normalized = nfkc(&fold_fullwidth_hash(text));

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for caps in hashtag_regex().captures_iter(&normalized) {
        if out.len() >= max {
            break;
        }

        let cleaned = clean_token(&caps[1]);
        if cleaned.is_empty() {
            continue;
        }

        let key = cleaned.to_lowercase();
        if seen.insert(key) {
            out.push(cleaned);
        }
    }

    out
}

/// remove whole hashtag tokens (preceded by start-of-string or whitespace)
/// from `text` and collapse the remaining whitespace runs
pub fn strip_hashtags(text: &str) -> String {
    let normalized = nfkc(&fold_fullwidth_hash(text));

    let mut out = String::with_capacity(normalized.len());
    let bytes = normalized.as_bytes();

    let mut i = 0;
    while i < normalized.len() {
        let at_boundary = i == 0 || normalized[..i].chars().next_back().is_some_and(|c| c.is_whitespace());
        if bytes[i] == b'#' && at_boundary {
            // skip the '#' plus the run of non-whitespace/non-# chars after it
            let rest = &normalized[i + 1..];
            let token_len: usize = rest
                .char_indices()
                .take_while(|(_, c)| !c.is_whitespace() && *c != '#')
                .map(|(idx, c)| idx + c.len_utf8())
                .last()
                .unwrap_or(0);
            i += 1 + token_len;
            continue;
        }

        let c = normalized[i..].chars().next().unwrap();
        out.push(c);
        i += c.len_utf8();
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// normalize a tag the same way storage does: NFKC, drop one leading `#`,
/// trim trailing punctuation, lowercase
pub fn normalize_tag_input(tag: &str) -> String {
    let normalized = nfkc(&fold_fullwidth_hash(tag.trim()));
    let without_hash = normalized.strip_prefix('#').unwrap_or(&normalized);
    clean_token(without_hash).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_folds_fullwidth_hash() {
        let tags = extract_hashtags("好看的风景 #旅行 #风景照 ＃周末", DEFAULT_MAX_TAGS);
        assert_eq!(tags, vec!["旅行", "风景照", "周末"]);
    }

    #[test]
    fn dedups_case_insensitively() {
        let tags = extract_hashtags("#Beach #beach #BEACH", DEFAULT_MAX_TAGS);
        assert_eq!(tags, vec!["Beach"]);
    }

    #[test]
    fn respects_max_cap() {
        let text = "#a #b #c #d";
        let tags = extract_hashtags(text, 2);
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[test]
    fn strips_trailing_punctuation() {
        let tags = extract_hashtags("#sunset, #rain.", DEFAULT_MAX_TAGS);
        assert_eq!(tags, vec!["sunset", "rain"]);
    }

    #[test]
    fn strip_hashtags_removes_tokens_and_collapses_whitespace() {
        let stripped = strip_hashtags("good day   #sunny  #warm   out there");
        assert_eq!(stripped, "good day out there");
    }

    #[test]
    fn normalize_tag_input_is_idempotent() {
        let once = normalize_tag_input("#Sunset!");
        let twice = normalize_tag_input(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "sunset");
    }

    #[test]
    fn extract_hashtags_is_idempotent_over_nfkc_input() {
        let normalized = nfkc("#Beach!");
        let first = extract_hashtags(&normalized, DEFAULT_MAX_TAGS);
        let rejoined = first.join(" ");
        let second = extract_hashtags(&format!("#{rejoined}"), DEFAULT_MAX_TAGS);
        assert_eq!(first, second);
    }
}
