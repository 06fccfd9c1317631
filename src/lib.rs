//! rust-netconf - NETCONF (RFC 6241) server operations core
//!
//! This library implements the operations layer of a NETCONF server:
//! it takes parsed RPC request trees from a transport (SSH/TLS framing,
//! hello and capability exchange stay outside), translates the standard
//! configuration operations into calls against a generic datastore
//! back-end speaking in instance paths and typed values, and builds the
//! replies.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_netconf::{MemoryBackend, SchemaContext, Server};
//! use rust_netconf::xml::XmlNode;
//!
//! // Compiled schema description produced by the YANG engine
//! let schema = Arc::new(SchemaContext::from_file("context.json").unwrap());
//!
//! // Any Backend implementation; the in-memory engine works for tests
//! let server = Server::new(schema, Arc::new(MemoryBackend::new()));
//!
//! // One session record per NETCONF session
//! let mut session = server.new_session(1).unwrap();
//!
//! // Handle parsed RPCs as the transport delivers them
//! let rpc = XmlNode::new("get");
//! let reply = server.handle(&mut session, &rpc);
//! ```

pub mod backend;
pub mod dispatch;
pub mod edit;
mod error;
pub mod filter;
pub mod lock;
pub mod memory;
pub mod monitoring;
pub mod protocol;
pub mod schema;
pub mod session;
pub mod tree;
pub mod value;
pub mod with_defaults;
pub mod xml;

pub use dispatch::Server;
pub use error::{NetconfError, Result};
pub use memory::MemoryBackend;
pub use protocol::{Datastore, RpcReply, WithDefaults};
pub use schema::SchemaContext;
pub use session::NetconfSession;
pub use value::DsValue;
