//! Server-side interception of incoming event dispatch.

use std::sync::Arc;

use opentelemetry::trace::{SpanKind, TraceContextExt};
use opentelemetry::{otel_debug, Context, KeyValue};
use opentelemetry_semantic_conventions::attribute::{RPC_METHOD, RPC_SYSTEM};

use crate::context::{RpcCallKind, RpcContextExt, RpcMetadata};
use crate::error::annotate_error;
use crate::instrumentation::RpcInstrumentation;
use crate::propagation;
use crate::registry::SpanRegistry;
use crate::rpc::{Dispatcher, Frame, RpcError, ServerRequest, ServerResponse, Transport};
use crate::RPC_SYSTEM_VALUE;

/// Framework-internal control events that never correspond to a user-visible
/// RPC call; they pass through undecorated.
const CONTROL_EVENTS: &[&str] = &["done"];

/// Decorates a [`Dispatcher`] so every dispatched call produces a SERVER
/// span.
///
/// The span is parented to the trace context extracted from the request
/// headers and ends when the response is flushed through the transport, not
/// when the handler returns: handlers may hand control back long before the
/// response is written. Synchronous dispatch failures end the span at the
/// dispatch boundary instead, since no write will follow.
pub struct TracedDispatcher<D> {
    inner: D,
    instrumentation: Arc<RpcInstrumentation>,
}

impl<D> TracedDispatcher<D>
where
    D: Dispatcher,
{
    pub fn new(inner: D, instrumentation: Arc<RpcInstrumentation>) -> Self {
        TracedDispatcher {
            inner,
            instrumentation,
        }
    }

    /// Consumes the decorator, returning the inner dispatcher.
    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D> Dispatcher for TracedDispatcher<D>
where
    D: Dispatcher,
{
    fn dispatch(
        &self,
        event: &str,
        request: &mut dyn ServerRequest,
        response: &mut dyn ServerResponse,
    ) -> Result<(), RpcError> {
        if CONTROL_EVENTS.contains(&event) {
            return self.inner.dispatch(event, request, response);
        }
        otel_debug!(name: "TracedDispatcher.Dispatch");

        let parent_cx = propagation::extract_context(request.headers());
        let method = response.method().to_owned();

        let attributes = vec![
            KeyValue::new(RPC_SYSTEM, RPC_SYSTEM_VALUE),
            KeyValue::new(RPC_METHOD, method.clone()),
        ];
        let cx = self.instrumentation.start_rpc_span(
            format!("rpc.server/{method}"),
            SpanKind::Server,
            attributes,
            &parent_cx,
        );
        let cx = cx.with_rpc_metadata(RpcMetadata::new(
            RpcCallKind::RequestResponse,
            cx.span().span_context().clone(),
        ));

        // Span end is anchored to the response flush.
        let transport = response.take_transport();
        response.set_transport(Box::new(TracedTransport::armed(
            transport,
            cx.clone(),
            self.instrumentation.registry_handle(),
        )));

        let _guard = cx.clone().attach();
        request.bind_context(&cx);
        response.bind_context(&cx);

        match self.inner.dispatch(event, request, response) {
            Ok(()) => Ok(()),
            Err(error) => {
                annotate_error(&cx.span(), Some(&error));
                self.instrumentation.registry().close(&cx);
                Err(error)
            }
        }
    }
}

/// One-shot write decorator anchoring span closure to the response flush.
///
/// The first write performs the span bookkeeping and disarms itself; later
/// writes pass straight through to the inner transport.
struct TracedTransport {
    inner: Box<dyn Transport>,
    hook: Option<WriteHook>,
}

struct WriteHook {
    cx: Context,
    registry: Arc<SpanRegistry>,
}

impl TracedTransport {
    fn armed(inner: Box<dyn Transport>, cx: Context, registry: Arc<SpanRegistry>) -> Self {
        TracedTransport {
            inner,
            hook: Some(WriteHook { cx, registry }),
        }
    }
}

impl Transport for TracedTransport {
    fn write(&mut self, frame: &Frame) -> Result<(), RpcError> {
        let Some(hook) = self.hook.take() else {
            return self.inner.write(frame);
        };

        if let Err(error) = self.inner.write(frame) {
            annotate_error(&hook.cx.span(), Some(&error));
            hook.registry.close(&hook.cx);
            return Err(error);
        }

        // The write itself can succeed while the frame reports a failed call.
        if frame.status() == Some(Frame::ERROR_MARKER) {
            let error = RpcError::new(frame.error_text().unwrap_or_default());
            annotate_error(&hook.cx.span(), Some(&error));
        }

        hook.registry.close(&hook.cx);
        Ok(())
    }
}
