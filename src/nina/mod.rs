//! Nina: the conversational decision engine.
//!
//! Per turn: guardrail → pending-state resolution → intent classification →
//! handler. The engine is stateless between calls; multi-turn flows are
//! carried in the metadata of the last assistant message.

pub mod availability;
pub mod diet;
pub mod faq;
pub mod guardrail;
pub mod intent;
pub mod keywords;
pub mod orchestrator;
pub mod response;
pub mod scheduling;
pub mod state;
pub mod templates;

pub use availability::{AvailabilitySlotGenerator, Clock, FixedClock, SystemClock};
pub use diet::DietQaHandler;
pub use faq::{FaqMatcher, FaqTopic};
pub use guardrail::{BlockReason, GuardrailEngine, GuardrailVerdict};
pub use intent::IntentClassifier;
pub use orchestrator::{ConversationContext, Nina};
pub use response::{HandoffReason, Intent, NinaResponse, ResponseMetadata, SchedulingSubIntent};
pub use scheduling::SchedulingFlowHandler;
pub use state::{ConversationStateResolver, PendingState};
