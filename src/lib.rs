// ABOUTME: Library root for the chat-platform to agent-server bridge core.
// ABOUTME: Event classification, fan-out, turn coordination, and sub-agent tracking.

pub mod agent_api;
pub mod card;
pub mod classifier;
pub mod config;
pub mod context;
pub mod interactive;
pub mod observer;
pub mod protocol;
pub mod registry;
pub mod subagent;
pub mod traits;
pub mod turn;
pub mod utils;
