//! Vyntra Relay - matchmaking queue and signaling relay for Vyntra video chat
//!
//! This library pairs anonymous participants one-to-one and forwards the
//! session negotiation traffic they need to open a direct peer link.
//! A single broker task owns the waiting queue and the connection registry;
//! one session task per socket talks to it over channels.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{Matcher, SessionLifecycle};
pub use models::{ClientEvent, ConnectionId, ConnectionState, Filter, MatchPolicy, Profile, ServerEvent};
pub use services::{Broker, BrokerHandle, ClientSession};
