//! Conversation phase state machine.

use crate::session::{ConversationPhase, Intent};

/// Explicit transition table: greeting → inquiry → (resolution | escalation)
/// → closing. Any combination not listed defaults to `Inquiry`.
pub fn decide_phase(current: ConversationPhase, intent: Intent) -> ConversationPhase {
    use ConversationPhase::*;
    use Intent::*;

    match (current, intent) {
        // Escalation and closing intents override the current phase.
        (_, EscalationRequest) => Escalation,
        (_, Intent::Closing) => ConversationPhase::Closing,

        // Opening.
        (ConversationPhase::Greeting, Intent::Greeting) => ConversationPhase::Greeting,
        (ConversationPhase::Greeting, HelpRequest) | (ConversationPhase::Greeting, GeneralInquiry) => Inquiry,

        // Working the request: a plain inquiry after questions means the
        // participant is getting answers; a fresh help request reopens
        // the inquiry.
        (Inquiry, GeneralInquiry) => Resolution,
        (Inquiry, HelpRequest) => Inquiry,
        (Resolution, GeneralInquiry) => Resolution,
        (Resolution, HelpRequest) => Inquiry,

        // A greeting after closing restarts the conversation.
        (ConversationPhase::Closing, Intent::Greeting) => ConversationPhase::Greeting,

        // Everything else (including anything said while escalated).
        _ => Inquiry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConversationPhase::*;
    use Intent::*;

    #[test]
    fn test_greeting_to_inquiry() {
        assert_eq!(decide_phase(ConversationPhase::Greeting, GeneralInquiry), Inquiry);
        assert_eq!(decide_phase(ConversationPhase::Greeting, HelpRequest), Inquiry);
        assert_eq!(decide_phase(ConversationPhase::Greeting, Intent::Greeting), ConversationPhase::Greeting);
    }

    #[test]
    fn test_escalation_from_any_phase() {
        for phase in [ConversationPhase::Greeting, Inquiry, Resolution, Escalation, ConversationPhase::Closing] {
            assert_eq!(decide_phase(phase, EscalationRequest), Escalation);
        }
    }

    #[test]
    fn test_closing_from_any_phase() {
        for phase in [ConversationPhase::Greeting, Inquiry, Resolution, Escalation] {
            assert_eq!(decide_phase(phase, Intent::Closing), ConversationPhase::Closing);
        }
    }

    #[test]
    fn test_inquiry_progresses_to_resolution() {
        assert_eq!(decide_phase(Inquiry, GeneralInquiry), Resolution);
        assert_eq!(decide_phase(Resolution, GeneralInquiry), Resolution);
    }

    #[test]
    fn test_help_request_reopens_inquiry() {
        assert_eq!(decide_phase(Resolution, HelpRequest), Inquiry);
    }

    #[test]
    fn test_unlisted_transition_defaults_to_inquiry() {
        assert_eq!(decide_phase(Escalation, GeneralInquiry), Inquiry);
        assert_eq!(decide_phase(ConversationPhase::Closing, HelpRequest), Inquiry);
    }

    #[test]
    fn test_greeting_after_closing_restarts() {
        assert_eq!(decide_phase(ConversationPhase::Closing, Intent::Greeting), ConversationPhase::Greeting);
    }
}
