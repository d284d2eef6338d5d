// Secure career guidance: resume text is anonymized, wrapped in a short-lived
// bundle, sent once to the chat-completion provider and destroyed.
// All LLM calls go through llm_client; no direct provider calls here.

pub mod anonymizer;
pub mod bundle;
pub mod clock;
pub mod extractor;
pub mod handlers;
pub mod prompts;
pub mod service;
pub mod store;
