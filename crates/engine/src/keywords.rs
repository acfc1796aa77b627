//! Local keyword heuristic for stock-media search.
//!
//! Turns a segment's text into at most [`MAX_KEYWORDS`] search terms. Compound
//! terms built from a domain suffix ("치킨 맛집", "Samsung phone") rank above
//! single tokens because they search more precisely. The function keeps no
//! state between calls.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

pub const MAX_KEYWORDS: usize = 3;

const STOP_WORDS: &[&str] = &[
    // Korean
    "그리고", "그러나", "하지만", "그래서", "또한", "그런데", "이것", "그것", "저것", "여기", "거기",
    "정말", "너무", "아주", "매우", "진짜", "오늘", "지금", "이제", "우리", "여러분", "저희", "당신",
    "추천", "인기", "소개", "함께", "위한", "있는", "하는", "되는", "같은", "모든", "가장", "다양한",
    "합니다", "입니다", "있습니다", "했습니다", "됩니다", "하세요", "해요", "이에요", "예요", "보세요",
    "이번", "다음", "많은", "좋은", "바로", "먼저", "마지막", "때문", "정도", "부분", "경우", "방법",
    // English
    "the", "a", "an", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with", "from", "by",
    "is", "are", "was", "were", "be", "been", "it", "its", "this", "that", "these", "those", "you",
    "your", "we", "our", "they", "their", "he", "she", "his", "her", "i", "my", "me", "so", "very",
    "just", "really", "today", "now", "here", "there", "best", "top", "popular", "recommended",
    "about", "into", "how", "what", "why", "when", "which", "who", "will", "can", "all", "more",
];

/// Suffixes that turn the preceding noun into a more searchable compound.
const COMPOUND_SUFFIXES: &[&str] = &[
    // food
    "맛집", "요리", "레시피", "카페", "디저트", "음식", "식당",
    // devices
    "폰", "스마트폰", "노트북", "태블릿", "카메라",
    // media and genres
    "영화", "드라마", "애니", "게임", "음악", "공연", "웹툰",
    // professions
    "선생님", "의사", "요리사", "배우", "가수", "작가", "선수", "기자", "감독",
    // English
    "phone", "phones", "movie", "movies", "film", "recipe", "recipes", "restaurant", "cafe",
    "chef", "doctor", "teacher", "actor", "singer", "player", "game", "games", "drama",
];

const TIME_UNITS: &[&str] = &[
    "초", "분", "시간", "일", "주", "개월", "달", "년", "second", "seconds", "minute", "minutes",
    "hour", "hours", "day", "days", "week", "weeks", "month", "months", "year", "years",
];

/// Korean particles stripped from the end of a token, longest first.
const PARTICLES: &[&str] = &[
    "에서", "으로", "에게", "까지", "부터", "처럼", "이랑", "을", "를", "은", "는",
    "의", "에", "로", "와", "과", "도", "만", "랑",
];

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\p{Hangul}]+|[A-Za-z][A-Za-z'\-]*|[0-9]+(?:[.,][0-9]+)?[\p{Hangul}A-Za-z]*")
            .expect("token pattern is valid")
    })
}

fn numeric_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]+(?:[.,][0-9]+)?").expect("numeric pattern is valid"))
}

#[derive(Debug, Clone)]
struct Token {
    text: String,
    position: usize,
    hangul: bool,
    capitalized: bool,
}

#[derive(Debug, Clone)]
struct Candidate {
    text: String,
    position: usize,
    compound: bool,
}

fn is_stop_word(word: &str) -> bool {
    let lowered = word.to_lowercase();
    STOP_WORDS.contains(&lowered.as_str())
}

fn is_time_unit(word: &str) -> bool {
    let lowered = word.to_lowercase();
    TIME_UNITS.contains(&lowered.as_str())
}

/// Pure numbers and quantities such as "3분" or "10years".
fn is_numeric_or_duration(word: &str) -> bool {
    match numeric_regex().find(word) {
        Some(m) => {
            let rest = &word[m.end()..];
            rest.is_empty() || is_time_unit(rest)
        }
        None => false,
    }
}

fn strip_particle(word: &str) -> &str {
    if word.chars().count() <= 2 {
        return word;
    }
    for particle in PARTICLES {
        if let Some(stem) = word.strip_suffix(particle) {
            if stem.chars().count() >= 2 {
                return stem;
            }
        }
    }
    word
}

fn tokenize(text: &str) -> Vec<Token> {
    token_regex()
        .find_iter(text)
        .enumerate()
        .map(|(position, m)| {
            let raw = m.as_str();
            let hangul = raw.chars().next().is_some_and(is_hangul);
            let word = if hangul { strip_particle(raw) } else { raw };
            Token {
                text: word.to_string(),
                position,
                hangul,
                capitalized: raw.chars().next().is_some_and(|c| c.is_ascii_uppercase()),
            }
        })
        .collect()
}

fn is_hangul(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}')
}

fn is_compound_suffix(word: &str) -> bool {
    let lowered = word.to_lowercase();
    COMPOUND_SUFFIXES.contains(&lowered.as_str())
}

fn usable(token: &Token) -> bool {
    !is_stop_word(&token.text) && !is_numeric_or_duration(&token.text) && !is_time_unit(&token.text)
}

fn compound_candidates(tokens: &[Token]) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for pair in tokens.windows(2) {
        let (head, suffix) = (&pair[0], &pair[1]);
        if usable(head) && is_compound_suffix(&suffix.text) && !is_compound_suffix(&head.text) {
            candidates.push(Candidate {
                text: format!("{} {}", head.text, suffix.text),
                position: head.position,
                compound: true,
            });
        }
    }

    // Already-fused compounds such as "아이폰" or "한식요리".
    for token in tokens.iter().filter(|t| t.hangul && usable(t)) {
        let fused = COMPOUND_SUFFIXES.iter().any(|suffix| {
            token.text.ends_with(suffix) && token.text.chars().count() > suffix.chars().count()
        });
        if fused {
            candidates.push(Candidate {
                text: token.text.clone(),
                position: token.position,
                compound: true,
            });
        }
    }

    candidates
}

fn proper_noun_candidates(tokens: &[Token]) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut idx = 0;

    while idx < tokens.len() {
        let token = &tokens[idx];
        if token.capitalized && usable(token) {
            // Join runs of capitalized words: "New York", "Galaxy Tab".
            let mut words = vec![token.text.clone()];
            let mut next = idx + 1;
            while next < tokens.len() && tokens[next].capitalized && usable(&tokens[next]) {
                words.push(tokens[next].text.clone());
                next += 1;
            }
            candidates.push(Candidate {
                text: words.join(" "),
                position: token.position,
                compound: false,
            });
            idx = next;
            continue;
        }
        if token.hangul && token.text.chars().count() >= 2 && usable(token) {
            candidates.push(Candidate {
                text: token.text.clone(),
                position: token.position,
                compound: false,
            });
        }
        idx += 1;
    }

    candidates
}

fn fallback_keywords(text: &str, tokens: &[Token]) -> Vec<String> {
    let nouns: Vec<String> = tokens
        .iter()
        .filter(|t| t.text.chars().count() >= 2 && usable(t))
        .take(2)
        .map(|t| t.text.clone())
        .collect();
    if !nouns.is_empty() {
        return nouns;
    }
    text.split_whitespace()
        .next()
        .map(|first| vec![first.to_string()])
        .unwrap_or_default()
}

/// Extract up to three ranked, de-duplicated search keywords from segment text.
///
/// Empty text yields an empty list.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let tokens = tokenize(text);
    let mut candidates = compound_candidates(&tokens);
    candidates.extend(proper_noun_candidates(&tokens));

    let mut unique: Vec<Candidate> = Vec::new();
    candidates.sort_by_key(|c| c.position);
    for candidate in candidates {
        let key = candidate.text.to_lowercase();
        match unique.iter_mut().find(|c| c.text.to_lowercase() == key) {
            Some(existing) => existing.compound |= candidate.compound,
            None => unique.push(candidate),
        }
    }

    if unique.is_empty() {
        return fallback_keywords(text, &tokens);
    }

    unique.sort_by(|a, b| {
        b.compound
            .cmp(&a.compound)
            .then_with(|| b.text.chars().count().cmp(&a.text.chars().count()))
            .then_with(|| a.position.cmp(&b.position))
    });

    unique.into_iter().take(MAX_KEYWORDS).map(|c| c.text).collect()
}

/// Trim, de-duplicate and cap a keyword list produced elsewhere (e.g. a remote model).
pub fn normalize_keywords<I, S>(keywords: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .map(|k| k.as_ref().trim().to_string())
        .filter(|k| !k.is_empty() && seen.insert(k.to_lowercase()))
        .take(limit.min(MAX_KEYWORDS))
        .collect()
}
