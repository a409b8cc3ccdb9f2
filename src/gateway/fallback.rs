//! Deterministic canned responses for provider failures.
//!
//! When the reasoning provider times out, errors, rejects the prompt, or
//! returns empty output, the gateway selects a topic-matched response from
//! this ordered rule table. First matching rule wins.

/// One fallback rule: any matching keyword selects the response.
pub struct FallbackRule {
    pub topic: &'static str,
    pub keywords: &'static [&'static str],
    pub response: &'static str,
}

pub const FALLBACK_RULES: &[FallbackRule] = &[
    FallbackRule {
        topic: "escalation",
        keywords: &["human", "agent", "representative", "manager", "supervisor"],
        response: "Of course — let me connect you with a member of our team. \
                   Please hold for just a moment.",
    },
    FallbackRule {
        topic: "hours",
        keywords: &["hour", "hours", "open", "closed", "schedule", "when"],
        response: "Our automated assistant is available around the clock, and our \
                   team is reachable during regular business hours.",
    },
    FallbackRule {
        topic: "pricing",
        keywords: &["price", "pricing", "cost", "charge", "fee", "billing", "invoice"],
        response: "I'd be happy to help with pricing questions. Could you tell me \
                   which product or plan you're asking about?",
    },
    FallbackRule {
        topic: "greeting",
        keywords: &["hello", "hi", "hey", "good morning", "good afternoon"],
        response: "Hello! Thanks for reaching out. How can I help you today?",
    },
    FallbackRule {
        topic: "closing",
        keywords: &["bye", "goodbye", "thanks", "thank you"],
        response: "Thank you for the conversation. Is there anything else I can \
                   help you with before you go?",
    },
    FallbackRule {
        topic: "help",
        keywords: &["help", "support", "problem", "issue", "trouble"],
        response: "I'm here to help. Could you describe what's going on in a bit \
                   more detail?",
    },
];

const DEFAULT_FALLBACK: &str = "I'm sorry, I'm having a little trouble processing that right \
now. Could you say that again, or rephrase it?";

/// True when `text` (already lowercased) contains `keyword`; single words
/// match on word boundaries.
fn contains_keyword(text: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        return text.contains(keyword);
    }
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|word| word.trim_matches('\'') == keyword)
}

/// Select the canned response for a participant utterance. Total — always
/// returns something usable.
pub fn fallback_response(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    for rule in FALLBACK_RULES {
        if rule.keywords.iter().any(|kw| contains_keyword(&lower, kw)) {
            return rule.response;
        }
    }
    DEFAULT_FALLBACK
}
