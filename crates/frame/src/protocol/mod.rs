//! Core protocol types shared by every connection kind.
//!
//! - [`scope`]: per-connection metadata ([`Scope`], [`ConnectionKind`])
//! - [`message`]: the tagged records flowing in ([`Incoming`]) and out ([`Outgoing`])
//! - [`error`]: [`ProtocolError`], raised while reading from or writing to a connection
//!
//! All message types derive `serde` traits with the `type` field as discriminator, so a server
//! bridging a real socket can decode them straight from its wire representation.

mod scope;
pub use scope::ConnectionKind;
pub use scope::DEFAULT_METHOD;
pub use scope::Scope;

mod message;
pub use message::Incoming;
pub use message::Outgoing;

mod error;
pub use error::ProtocolError;
