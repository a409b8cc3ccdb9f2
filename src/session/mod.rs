//! Per-call session state and lifecycle.
//!
//! [`SessionRegistry`] owns every live [`CallSession`]; the turn engine
//! mutates sessions only through registry methods. Sessions are destroyed
//! on explicit end or after the inactivity timeout.

mod registry;
mod types;

pub use registry::{SessionRegistry, SessionSummary};
pub use types::{
    CallSession, ConversationPhase, Intent, Sentiment, SessionMetrics, SessionOptions,
    SessionState, Speaker, Turn,
};
