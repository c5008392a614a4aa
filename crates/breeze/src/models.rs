//! These models represent the objects passed around by the agent
//!
//! There are a few different related formats we need to interact with:
//! - openai chat completion messages/tools, sent from the agent to the LLM
//! - model context protocol tools and tool results, exchanged with the tool server
//!
//! These overlap to varying degrees. We always immediately convert those data models
//! into the internal structs using to/from helpers, so the internal models are not an
//! exact match to either format.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
