pub mod accumulator;
pub mod compaction;
pub mod confidence;
pub mod config;
pub mod context;
pub mod conversation;
pub mod errors;
pub mod gateway;
pub mod knowledge;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod prompts;
pub mod providers;
pub mod streamer;
pub mod token_counter;
pub mod tools;
pub mod utils;
pub mod web;
