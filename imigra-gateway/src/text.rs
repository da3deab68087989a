//! Keyword matching over user messages.
//!
//! Messages are lowercased and split on anything that is not a letter or a
//! digit. Keywords match whole tokens (or runs of tokens for phrases);
//! stems match token prefixes.

/// Greetings across ru/en/pt.
pub const GREETINGS: &[&str] = &[
    "привет",
    "здравствуй",
    "здравствуйте",
    "добрый день",
    "добрый вечер",
    "доброе утро",
    "как дела",
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "how are you",
    "ola",
    "olá",
    "bom dia",
    "boa tarde",
    "boa noite",
    "como está",
    "como esta",
];

/// Thanks and short confirmations.
pub const ACKNOWLEDGEMENTS: &[&str] = &[
    "спасибо",
    "благодарю",
    "понятно",
    "ясно",
    "да",
    "нет",
    "thanks",
    "thank you",
    "got it",
    "ok",
    "okay",
    "yes",
    "no",
    "obrigado",
    "obrigada",
    "sim",
    "não",
    "nao",
];

/// Small talk that never needs an operator.
pub const PLEASANTRIES: &[&str] = &[
    "привет",
    "здравствуй",
    "здравствуйте",
    "спасибо",
    "благодарю",
    "пока",
    "hi",
    "hello",
    "thanks",
    "thank you",
    "bye",
    "ola",
    "olá",
    "obrigado",
    "obrigada",
    "tchau",
];

/// Stems of legally sensitive topics: deportation, refusal, court, appeal.
pub const HIGH_STAKES_STEMS: &[&str] = &[
    "депортац",
    "выдвор",
    "отказ",
    "суд",
    "апелляц",
    "обжал",
    "deport",
    "refus",
    "court",
    "appeal",
    "deportaç",
    "deportac",
    "recus",
    "tribunal",
    "recurso",
];

/// Lowercased word tokens.
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Whether any keyword (single token or space separated phrase) occurs.
pub fn contains_keyword(tokens: &[String], keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| {
        let phrase: Vec<&str> = keyword.split(' ').collect();
        tokens
            .windows(phrase.len())
            .any(|window| {
                window
                    .iter()
                    .zip(&phrase)
                    .all(|(token, word)| token.as_str() == *word)
            })
    })
}

/// Whether any token starts with one of the stems.
pub fn contains_stem(tokens: &[String], stems: &[&str]) -> bool {
    tokens
        .iter()
        .any(|token| stems.iter().any(|stem| token.starts_with(stem)))
}

pub fn is_greeting(text: &str) -> bool {
    word_count(text) < 5 && contains_keyword(&tokens(text), GREETINGS)
}

/// Short thanks or confirmation. A message ending in `?` is a question.
pub fn is_acknowledgement(text: &str) -> bool {
    let trimmed = text.trim();
    word_count(trimmed) < 10
        && !trimmed.ends_with('?')
        && contains_keyword(&tokens(trimmed), ACKNOWLEDGEMENTS)
}

pub fn is_pleasantry(text: &str) -> bool {
    word_count(text) < 10 && contains_keyword(&tokens(text), PLEASANTRIES)
}

pub fn is_high_stakes(text: &str) -> bool {
    contains_stem(&tokens(text), HIGH_STAKES_STEMS)
}
