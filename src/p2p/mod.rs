//! The P2P overlay: node identity, gossip membership, transport, routing,
//! and the peer runtime that ties them together.

pub mod envelope;
pub mod gossip;
pub mod node;
pub mod routing;
pub mod transport;
pub mod types;

pub use envelope::{Envelope, MsgType};
pub use node::{EventListener, PeerNode};
pub use routing::{method_capabilities, RoutingTable};
pub use transport::{TransportClient, TransportServer};
pub use types::{Capability, CapabilitySet, PeerInfo, PeerState, PeerStatus};
