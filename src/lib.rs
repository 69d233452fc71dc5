//! Tracing instrumentation for callback-style request/response RPC
//! frameworks.
//!
//! This crate wraps the client call sites and server dispatch sites of an
//! RPC framework so that every call produces a distributed-tracing span,
//! trace context travels across the wire inside the call's header map, and
//! each span is ended exactly once regardless of which completion path fires
//! first: a completion callback, the transport write that flushes the
//! response, a synchronous failure, or the require-parent short-circuit.
//!
//! The framework itself stays an external collaborator. Its call and
//! dispatch surfaces are modeled by the traits in [`rpc`]; hosts implement
//! those for their framework's types and decorate them:
//!
//! * [`TracedClient`] wraps an [`rpc::RpcClient`], tracing `connect` and
//!   `call` and injecting the active context into the outgoing header slot.
//! * [`TracedDispatcher`] wraps an [`rpc::Dispatcher`], extracting the
//!   parent context from inbound headers and ending the SERVER span when the
//!   response is flushed.
//!
//! The instrumentation never converts success into failure or vice versa:
//! results and errors pass through unchanged, and aside from the injected
//! headers and wrapped callbacks the inner operations see the arguments they
//! would have seen undecorated.
//!
//! # Getting started
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use opentelemetry_rpc::rpc::{CallArg, Callback, Peer, RpcClient, RpcError};
//! use opentelemetry_rpc::{Config, RpcInstrumentation};
//!
//! // The host's binding to its RPC framework.
//! struct WireClient {
//!     peer: Peer,
//! }
//!
//! impl RpcClient for WireClient {
//!     type Connection = ();
//!     type Reply = Vec<u8>;
//!
//!     fn peer(&self) -> &Peer {
//!         &self.peer
//!     }
//!
//!     fn connect(&self, callback: Option<Callback<()>>) -> Result<(), RpcError> {
//!         if let Some(callback) = callback {
//!             callback(Ok(()));
//!         }
//!         Ok(())
//!     }
//!
//!     fn call(&self, args: Vec<CallArg<Vec<u8>>>) -> Result<(), RpcError> {
//!         # drop(args);
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), RpcError> {
//! let instrumentation = Arc::new(RpcInstrumentation::new(Config::default()));
//! let client = instrumentation.instrument_client(WireClient {
//!     peer: Peer {
//!         host: "127.0.0.1".to_owned(),
//!         port: 4730,
//!     },
//! });
//!
//! // Produces a CLIENT span named "rpc.client/Echo" and injects the trace
//! // context into the call's header slot before the wire sees it.
//! client.call(vec![
//!     CallArg::Text("Echo".to_owned()),
//!     CallArg::Bytes(b"ping".to_vec()),
//!     CallArg::Callback(Box::new(|reply| {
//!         let _ = reply;
//!     })),
//! ])?;
//! # Ok(())
//! # }
//! ```

mod instrumentation;

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod propagation;
pub mod registry;
pub mod rpc;
pub mod server;

pub use client::TracedClient;
pub use config::{Config, ConfigBuilder};
pub use context::{RpcCallKind, RpcContextExt, RpcMetadata};
pub use instrumentation::RpcInstrumentation;
pub use registry::SpanRegistry;
pub use server::TracedDispatcher;

/// Value of the `rpc.system` attribute recorded on server spans.
pub const RPC_SYSTEM_VALUE: &str = "callback_rpc";
