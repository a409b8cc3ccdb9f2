//! Text normalization for speech synthesis.
//!
//! Spoken text needs different surface forms than written text: common
//! abbreviations are expanded, symbols are spelled out, and pause markers
//! are inserted at sentence boundaries so the synthesizer breathes between
//! sentences.

/// Ordered expansion table. Longer/more specific forms first so e.g.
/// `"Mrs."` is expanded before `"Mr."` can match inside it.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("Mrs.", "Missus"),
    ("Ms.", "Miss"),
    ("Mr.", "Mister"),
    ("Dr.", "Doctor"),
    ("Prof.", "Professor"),
    ("St.", "Street"),
    ("Ave.", "Avenue"),
    ("approx.", "approximately"),
    ("e.g.", "for example"),
    ("i.e.", "that is"),
    ("etc.", "et cetera"),
    ("vs.", "versus"),
    ("no.", "number"),
    ("No.", "number"),
];

const SYMBOLS: &[(&str, &str)] = &[("&", " and "), ("%", " percent"), ("@", " at "), ("#", " number ")];

/// Pause marker inserted between sentences; synthesizers render an
/// ellipsis as a short breath.
const PAUSE: &str = " ... ";

/// Expand written abbreviations and symbols into speakable words.
pub fn expand_abbreviations(text: &str) -> String {
    let mut out = text.to_string();
    for (written, spoken) in ABBREVIATIONS {
        out = out.replace(written, spoken);
    }
    for (symbol, spoken) in SYMBOLS {
        out = out.replace(symbol, spoken);
    }
    out
}

/// Split text into sentences on terminal punctuation. Call after
/// [`expand_abbreviations`] so abbreviation periods don't split.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// Full normalization: expand abbreviations/symbols, then rejoin sentences
/// with pause markers at the boundaries.
pub fn normalize_for_speech(text: &str) -> String {
    let expanded = expand_abbreviations(text);
    let sentences = split_sentences(&expanded);
    if sentences.len() <= 1 {
        return expanded.trim().to_string();
    }
    sentences.join(PAUSE)
}
