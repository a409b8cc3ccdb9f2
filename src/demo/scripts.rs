//! Scripted demo conversations.
//!
//! Fixed ordered scripts replayed by the simulator through the same
//! contracts as live calls. Useful for exercising the pipeline without a
//! telephony connection.

use crate::session::Speaker;

/// One scripted utterance.
pub struct ScriptLine {
    pub speaker: Speaker,
    pub text: &'static str,
}

/// A replayable conversation template.
pub struct ScriptTemplate {
    pub id: &'static str,
    pub title: &'static str,
    pub lines: &'static [ScriptLine],
}

pub const TEMPLATES: &[ScriptTemplate] = &[
    ScriptTemplate {
        id: "support",
        title: "Support inquiry",
        lines: &[
            ScriptLine {
                speaker: Speaker::Participant,
                text: "Hi there!",
            },
            ScriptLine {
                speaker: Speaker::Agent,
                text: "Hello! Thanks for calling. How can I help you today?",
            },
            ScriptLine {
                speaker: Speaker::Participant,
                text: "I was wondering what your support hours are.",
            },
            ScriptLine {
                speaker: Speaker::Agent,
                text: "Our assistant is available around the clock, and the support team \
                       answers weekdays from nine to six.",
            },
            ScriptLine {
                speaker: Speaker::Participant,
                text: "Perfect, that's all I needed. Goodbye!",
            },
            ScriptLine {
                speaker: Speaker::Agent,
                text: "Happy to help. Have a great day!",
            },
        ],
    },
    ScriptTemplate {
        id: "escalation",
        title: "Frustrated caller escalation",
        lines: &[
            ScriptLine {
                speaker: Speaker::Participant,
                text: "Hello, my order still hasn't arrived.",
            },
            ScriptLine {
                speaker: Speaker::Agent,
                text: "I'm sorry to hear that. Could you give me the order number?",
            },
            ScriptLine {
                speaker: Speaker::Participant,
                text: "This is the third time I'm calling, it's really frustrating.",
            },
            ScriptLine {
                speaker: Speaker::Agent,
                text: "I understand. Let me check what happened with the delivery.",
            },
            ScriptLine {
                speaker: Speaker::Participant,
                text: "No, just let me speak to a real person please.",
            },
            ScriptLine {
                speaker: Speaker::Agent,
                text: "Of course — connecting you with a member of our team now.",
            },
        ],
    },
];

/// Look up a template by id.
pub fn template(id: &str) -> Option<&'static ScriptTemplate> {
    TEMPLATES.iter().find(|t| t.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_template() {
        let t = template("support").unwrap();
        assert_eq!(t.title, "Support inquiry");
        assert!(!t.lines.is_empty());
    }

    #[test]
    fn test_lookup_unknown_template() {
        assert!(template("does-not-exist").is_none());
    }

    #[test]
    fn test_scripts_alternate_speakers() {
        for t in TEMPLATES {
            for pair in t.lines.windows(2) {
                assert_ne!(
                    pair[0].speaker, pair[1].speaker,
                    "template {} should alternate speakers",
                    t.id
                );
            }
        }
    }
}
