//! These models represent the objects passed around by the orchestrator
//!
//! There are a few related formats we need to interact with:
//! - chat messages and tool definitions, sent from the orchestrator to the LLM
//! - streamed completion chunks carrying text and tool-call fragments, sent back by the LLM
//! - confidence-tagged answer sections and their citations, returned to the caller
//!
//! The internal models are deliberately transport-neutral; providers convert them
//! to and from their own wire formats.
pub mod message;
pub mod source;
pub mod tool;
