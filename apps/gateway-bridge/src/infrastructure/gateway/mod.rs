//! Gateway Adapters
//!
//! Everything that speaks the execution gateway's protocol:
//!
//! - **Transport**: ZeroMQ request/reply and publish/subscribe sockets
//! - **Codec / Messages**: FIX-tag keyed JSON requests, replies and frames
//! - **Auth**: credentials and logon errors
//! - **Client**: the assembled bridge (subscriber, reconciler, supervisor)
//! - **Mock**: in-memory gateway for tests

pub mod auth;
pub mod client;
pub mod codec;
pub mod messages;
pub mod mock;
pub mod reconnect;
pub mod transport;

pub use auth::{AuthError, Credentials};
pub use client::{BridgeSnapshot, GatewayClient, GatewayClientConfig};
pub use codec::{CodecError, JsonCodec};
pub use messages::*;
pub use reconnect::{Backoff, BackoffConfig};
pub use transport::{ZmqTransport, ZmqTransportConfig};
