// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{ConnectionId, ConnectionState, Filter, MatchPolicy, Profile};
pub use requests::ClientEvent;
pub use responses::{ErrorResponse, HealthResponse, ServerEvent, StatsResponse};
