// Core algorithm exports
pub mod filters;
pub mod lifecycle;
pub mod matcher;
pub mod queue;
pub mod registry;

pub use filters::{accepts, is_compatible, matches_filter, WILDCARD};
pub use lifecycle::{InvariantViolation, LifecycleStats, Notice, SessionLifecycle};
pub use matcher::Matcher;
pub use queue::MatchingQueue;
pub use registry::{ConnectionEntry, ConnectionRegistry, Unpaired};
