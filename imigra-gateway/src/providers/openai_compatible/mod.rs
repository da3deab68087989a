//! OpenAI-compatible provider used for OpenAI, Groq, Ollama and custom endpoints.

pub mod client;

pub use client::OpenAiCompatibleClient;
