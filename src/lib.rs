pub mod chat;
pub mod config;
pub mod constants;
pub mod evaluation;
pub mod llm_interaction;
pub mod prompts;
pub mod session;
pub mod storage;
pub mod styles;
pub mod therapist;
pub mod transcript;
pub mod web_server;
