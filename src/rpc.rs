//! Interface model of the instrumented RPC framework.
//!
//! The instrumentation does not link against a concrete framework. It
//! decorates the seams defined here, which mirror the call and dispatch
//! surfaces of callback-style request/response frameworks: a client exposing
//! `connect` and `call`, and a server dispatching named events to handlers.
//! Hosts implement these traits for their framework's types and wrap them
//! with [`TracedClient`] and [`TracedDispatcher`].
//!
//! [`TracedClient`]: crate::TracedClient
//! [`TracedDispatcher`]: crate::TracedDispatcher

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use opentelemetry::Context;
use thiserror::Error;

/// Flat string-keyed header map attached to a call, used bidirectionally as
/// the trace-context carrier on the wire.
pub type Headers = HashMap<String, String>;

/// Completion callback for an asynchronous operation.
///
/// `Err` is the "first argument carries an error" completion path; `Ok`
/// delivers the operation's result value.
pub type Callback<T> = Box<dyn FnOnce(Result<T, RpcError>) + Send>;

/// Remote endpoint a client is bound to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Peer {
    pub host: String,
    pub port: u16,
}

/// Error shape surfaced by the instrumented framework.
///
/// Mirrors exception-style errors: a kind name (`"Error"` unless overridden),
/// a message, and optional stack text. Errors decoded from in-band response
/// status markers are plain data and carry a message only.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{name}: {message}")]
pub struct RpcError {
    name: Cow<'static, str>,
    message: String,
    stack: Option<String>,
}

impl RpcError {
    pub fn new(message: impl Into<String>) -> Self {
        RpcError {
            name: Cow::Borrowed("Error"),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Error kind name, e.g. `"Error"` or a framework-specific subclass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stack or trace text, when the error carries one.
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }
}

/// One slot in a client call's positional argument list.
///
/// The instrumented framework takes call arguments as a heterogeneous list.
/// By its calling convention slot 0 carries the method name, the first
/// callback slot the completion callback, and the slot after the callback
/// (slot 3 when the callback sits in slot 2, slot 2 otherwise) an optional
/// header map.
pub enum CallArg<T> {
    /// An unoccupied slot.
    Nil,
    /// Method name or other textual argument.
    Text(String),
    /// Opaque request payload.
    Bytes(Vec<u8>),
    /// Completion callback.
    Callback(Callback<T>),
    /// Header map used as the trace-context carrier.
    Headers(Headers),
}

impl<T> fmt::Debug for CallArg<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallArg::Nil => f.write_str("Nil"),
            CallArg::Text(text) => f.debug_tuple("Text").field(text).finish(),
            CallArg::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            CallArg::Callback(_) => f.write_str("Callback"),
            CallArg::Headers(headers) => f.debug_tuple("Headers").field(headers).finish(),
        }
    }
}

/// Client-side surface of the instrumented framework.
pub trait RpcClient {
    /// Handle delivered to a successful `connect` callback.
    type Connection: Send + 'static;
    /// Reply payload delivered to a successful `call` callback.
    type Reply: Send + 'static;

    /// The remote endpoint this client talks to.
    fn peer(&self) -> &Peer;

    /// Opens the underlying connection.
    ///
    /// When `callback` is given the operation completes asynchronously and
    /// the callback observes the outcome; without one the call is
    /// synchronous and the returned result is the outcome.
    fn connect(&self, callback: Option<Callback<Self::Connection>>) -> Result<(), RpcError>;

    /// Invokes a remote method with a positional argument list.
    fn call(&self, args: Vec<CallArg<Self::Reply>>) -> Result<(), RpcError>;
}

/// One outgoing response frame as handed to the server transport.
///
/// Slot 1 carries the frame's in-band status marker; when it equals
/// [`Frame::ERROR_MARKER`], slot 2 carries the error text.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Frame(Vec<String>);

impl Frame {
    /// Status marker value signalling an in-band error.
    pub const ERROR_MARKER: &'static str = "error";

    pub fn new(parts: Vec<String>) -> Self {
        Frame(parts)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// The in-band status marker, when the frame carries one.
    pub fn status(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    /// The in-band error text, when the frame carries one.
    pub fn error_text(&self) -> Option<&str> {
        self.0.get(2).map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Frame {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Frame(iter.into_iter().map(Into::into).collect())
    }
}

/// Low-level connection a server response is flushed through.
pub trait Transport: Send {
    /// Writes one response frame.
    fn write(&mut self, frame: &Frame) -> Result<(), RpcError>;
}

/// Inbound request half of a dispatched call.
pub trait ServerRequest: Send {
    /// Headers the call arrived with.
    fn headers(&self) -> &Headers;

    /// Associates the call's context with this request so continuations
    /// registered on it observe the same active span.
    fn bind_context(&mut self, cx: &Context);
}

/// Outbound response half of a dispatched call.
pub trait ServerResponse: Send {
    /// RPC method this response answers.
    fn method(&self) -> &str;

    /// Detaches the underlying transport from the response.
    fn take_transport(&mut self) -> Box<dyn Transport>;

    /// Re-attaches a (possibly decorated) transport.
    fn set_transport(&mut self, transport: Box<dyn Transport>);

    /// Associates the call's context with this response.
    fn bind_context(&mut self, cx: &Context);
}

/// Server-side event-dispatch entry point of the instrumented framework.
pub trait Dispatcher {
    /// Dispatches one incoming event to the registered handler. The request
    /// and response halves accompany every user-visible call event.
    fn dispatch(
        &self,
        event: &str,
        request: &mut dyn ServerRequest,
        response: &mut dyn ServerResponse,
    ) -> Result<(), RpcError>;
}
