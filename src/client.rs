//! Client-side interception of outgoing RPC operations.

use std::sync::Arc;

use opentelemetry::trace::{SpanKind, TraceContextExt};
use opentelemetry::{otel_debug, Context, KeyValue};
use opentelemetry_semantic_conventions::attribute::{
    CLIENT_ADDRESS, RPC_METHOD, SERVER_ADDRESS, SERVER_PORT,
};

use crate::error::annotate_error;
use crate::instrumentation::RpcInstrumentation;
use crate::propagation;
use crate::rpc::{CallArg, Callback, Headers, Peer, RpcClient, RpcError};

/// Span name used for connection establishment.
const CONNECT_SPAN_NAME: &str = "rpc.client/connect";

/// Decorates an [`RpcClient`] so every outgoing operation produces a CLIENT
/// span.
///
/// The decorated operations keep the signatures of the originals. `connect`
/// and `call` forward to the inner client after arranging span closure on
/// the eventual completion callback (or on the synchronous result when no
/// callback is involved), and `call` additionally serializes the active
/// trace context into the call's header slot.
pub struct TracedClient<C> {
    inner: C,
    instrumentation: Arc<RpcInstrumentation>,
}

impl<C> TracedClient<C>
where
    C: RpcClient,
{
    pub fn new(inner: C, instrumentation: Arc<RpcInstrumentation>) -> Self {
        TracedClient {
            inner,
            instrumentation,
        }
    }

    /// Consumes the decorator, returning the inner client.
    pub fn into_inner(self) -> C {
        self.inner
    }

    fn peer_attributes(&self) -> Vec<KeyValue> {
        let Peer { host, port } = self.inner.peer();
        vec![
            KeyValue::new(
                CLIENT_ADDRESS,
                self.instrumentation.config().hostname().to_owned(),
            ),
            KeyValue::new(SERVER_ADDRESS, host.clone()),
            KeyValue::new(SERVER_PORT, i64::from(*port)),
        ]
    }

    /// Wraps a completion callback so it annotates a reported error, closes
    /// the span, and only then runs the original under the span's context.
    fn close_on_completion<T>(&self, cx: &Context, original: Callback<T>) -> Callback<T>
    where
        T: Send + 'static,
    {
        let registry = self.instrumentation.registry_handle();
        let cx = cx.clone();
        Box::new(move |result| {
            if let Err(error) = &result {
                annotate_error(&cx.span(), Some(error));
            }
            registry.close(&cx);
            let _guard = cx.clone().attach();
            original(result)
        })
    }
}

impl<C> RpcClient for TracedClient<C>
where
    C: RpcClient,
{
    type Connection = C::Connection;
    type Reply = C::Reply;

    fn peer(&self) -> &Peer {
        self.inner.peer()
    }

    fn connect(&self, callback: Option<Callback<Self::Connection>>) -> Result<(), RpcError> {
        otel_debug!(name: "TracedClient.Connect");
        let cx = self.instrumentation.start_rpc_span(
            CONNECT_SPAN_NAME.to_owned(),
            SpanKind::Client,
            self.peer_attributes(),
            &Context::current(),
        );

        let have_callback = callback.is_some();
        let callback = callback.map(|original| self.close_on_completion(&cx, original));

        match self.inner.connect(callback) {
            Ok(()) => {
                // Without a callback the operation is synchronous and done.
                if !have_callback {
                    self.instrumentation.registry().close(&cx);
                }
                Ok(())
            }
            Err(error) => {
                annotate_error(&cx.span(), Some(&error));
                self.instrumentation.registry().close(&cx);
                Err(error)
            }
        }
    }

    fn call(&self, mut args: Vec<CallArg<Self::Reply>>) -> Result<(), RpcError> {
        otel_debug!(name: "TracedClient.Call");
        let method = match args.first() {
            Some(CallArg::Text(method)) => method.clone(),
            _ => String::new(),
        };

        let mut attributes = self.peer_attributes();
        attributes.push(KeyValue::new(RPC_METHOD, method.clone()));

        let cx = self.instrumentation.start_rpc_span(
            format!("rpc.client/{method}"),
            SpanKind::Client,
            attributes,
            &Context::current(),
        );

        // Calls without a callback are never auto-closed; there is no
        // completion event to anchor the span end to.
        let callback_idx = args
            .iter()
            .position(|arg| matches!(arg, CallArg::Callback(_)));
        if let Some(idx) = callback_idx {
            if let CallArg::Callback(original) = std::mem::replace(&mut args[idx], CallArg::Nil) {
                args[idx] = CallArg::Callback(self.close_on_completion(&cx, original));
            }
        }

        // call(method, payload, callback?, headers?): the header slot trails
        // the callback when the callback sits in slot 2, otherwise it is
        // slot 2.
        let headers_idx = if callback_idx == Some(2) { 3 } else { 2 };
        if args.len() <= headers_idx {
            args.resize_with(headers_idx + 1, || CallArg::Nil);
        }
        if !matches!(args[headers_idx], CallArg::Headers(_)) {
            args[headers_idx] = CallArg::Headers(Headers::new());
        }
        if let CallArg::Headers(headers) = &mut args[headers_idx] {
            propagation::inject_context(&cx, headers);
        }

        let _guard = cx.clone().attach();
        self.inner.call(args)
    }
}
