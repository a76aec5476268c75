//! Network Layer
//!
//! Client side of a server-authoritative room: wire messages, the snapshot
//! ring, reconciliation, and the queued link to the transport. The transport
//! itself (WebSocket, reconnects) lives outside this crate.

pub mod link;
pub mod protocol;
pub mod reconcile;
pub mod snapshot;

pub use link::{link, NetworkLink, TransportEndpoint};
pub use protocol::{ClientMessage, ServerMessage, WireSnapshot};
pub use reconcile::{networked_tick, ReconcileMode, Reconciler};
pub use snapshot::{InterpolatedFrame, Snapshot, SnapshotBuffer};
