//! Conversational layer of the calendar assistant.
//!
//! This crate turns chat messages into calendar events:
//! - Builds the oracle prompt from the user's time context (`prompt`)
//! - Decodes the oracle's answer into a typed intent or a parse failure (`intent`)
//! - Classifies short replies with a keyword table (`classifier`)
//! - Drives the create-event dialogue one turn at a time (`runtime`)
//! - Renders every user-facing reply (`render`)
//!
//! # Key Types
//!
//! - `DialogueRuntime` - turn handler; conversation state is passed in and returned
//! - `LlmClient` - pluggable trait for OpenAI or Ollama compatible endpoints
//! - `KeywordTable` - confirmation, cancel, decline and create phrases
//!
//! # Safety Principle
//!
//! The LLM only translates text into an intent. Whether an event is created,
//! and with which payload, is decided by the flow engine and the builder.

pub mod classifier;
pub mod intent;
pub mod llm;
pub mod prompt;
pub mod render;
pub mod runtime;

pub use classifier::{ConfirmationReply, KeywordClassifier, KeywordTable};
pub use intent::{decode_intent, IntentParser, ParseFailure};
pub use llm::{LlmClient, LlmError, OpenAiCompatibleClient, ScriptedLlmClient};
pub use prompt::{DraftContext, PromptBuilder};
pub use runtime::{
    AssistantSettings, ConversationState, DialogueError, DialogueRuntime, TurnOutcome,
};
