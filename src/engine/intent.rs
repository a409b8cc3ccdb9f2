//! Ordered-rule classifiers for intent and sentiment.
//!
//! Both classifiers are explicit rule tables (predicate → category): the
//! table is data, the classifier a pure function over it, so a model-backed
//! implementation can replace either without changing the interface. Rules
//! are evaluated in priority order — the first match wins, and escalation
//! is always checked first.

use crate::session::{Intent, Sentiment};

/// One classification rule: any matching keyword assigns the intent.
pub struct IntentRule {
    pub intent: Intent,
    pub keywords: &'static [&'static str],
}

/// Intent rules in priority order. Escalation first.
pub const INTENT_RULES: &[IntentRule] = &[
    IntentRule {
        intent: Intent::EscalationRequest,
        keywords: &[
            "human",
            "agent",
            "representative",
            "real person",
            "speak to someone",
            "manager",
            "supervisor",
            "operator",
            "transfer me",
        ],
    },
    IntentRule {
        intent: Intent::Closing,
        keywords: &[
            "goodbye",
            "bye",
            "that's all",
            "that is all",
            "nothing else",
            "hang up",
            "see you",
        ],
    },
    IntentRule {
        intent: Intent::Greeting,
        keywords: &[
            "hello",
            "hi",
            "hey",
            "good morning",
            "good afternoon",
            "good evening",
        ],
    },
    IntentRule {
        intent: Intent::HelpRequest,
        keywords: &[
            "help",
            "support",
            "how do i",
            "how can i",
            "problem",
            "issue",
            "not working",
            "trouble",
        ],
    },
];

/// Negative-sentiment keywords (checked first — a turn that is both angry
/// and polite reads as negative).
const NEGATIVE_KEYWORDS: &[&str] = &[
    "angry",
    "frustrated",
    "frustrating",
    "terrible",
    "awful",
    "horrible",
    "worst",
    "useless",
    "unacceptable",
    "ridiculous",
    "annoyed",
    "annoying",
    "hate",
    "broken",
    "not working",
    "waste of time",
];

const POSITIVE_KEYWORDS: &[&str] = &[
    "thanks",
    "thank you",
    "great",
    "perfect",
    "awesome",
    "excellent",
    "wonderful",
    "love",
    "appreciate",
    "helpful",
];

/// True when `text` (already lowercased) contains `keyword`.
///
/// Multi-word keywords match as substrings; single words match on word
/// boundaries so `"hi"` does not fire inside `"this"`.
fn contains_keyword(text: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        return text.contains(keyword);
    }
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|word| word.trim_matches('\'') == keyword)
}

/// Classify the intent of a participant utterance.
///
/// First matching rule in priority order wins; no match means
/// [`Intent::GeneralInquiry`].
pub fn classify_intent(text: &str) -> Intent {
    let lower = text.to_lowercase();
    for rule in INTENT_RULES {
        if rule.keywords.iter().any(|kw| contains_keyword(&lower, kw)) {
            return rule.intent;
        }
    }
    Intent::GeneralInquiry
}

/// Classify the sentiment of an utterance.
pub fn classify_sentiment(text: &str) -> Sentiment {
    let lower = text.to_lowercase();
    if NEGATIVE_KEYWORDS.iter().any(|kw| contains_keyword(&lower, kw)) {
        return Sentiment::Negative;
    }
    if POSITIVE_KEYWORDS.iter().any(|kw| contains_keyword(&lower, kw)) {
        return Sentiment::Positive;
    }
    Sentiment::Neutral
}
