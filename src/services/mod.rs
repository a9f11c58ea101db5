// Service exports
pub mod broker;
pub mod relay;
pub mod session;

pub use broker::{Broker, BrokerCommand, BrokerError, BrokerHandle, ConnectionSnapshot};
pub use relay::{RelayOutcome, SignalingRelay};
pub use session::{ClientSession, Mailbox, PartnerLink, SessionSignal, DEFAULT_RELAY_BUFFER};
