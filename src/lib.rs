//! Nina: virtual assistant for nutrition practices.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod model;
pub mod nina;
pub mod ratelimit;
pub mod store;

pub use config::NinaConfig;
pub use conversation::{ConversationService, TurnOutcome};
pub use error::{Error, Result};
pub use nina::{ConversationContext, Nina, NinaResponse};
