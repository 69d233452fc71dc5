//! Context extensions carrying RPC call metadata.

use opentelemetry::trace::SpanContext;
use opentelemetry::Context;

/// Shape of the RPC exchange the active context belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RpcCallKind {
    /// A unary request answered by a single response.
    RequestResponse,
}

/// Call metadata installed on the active context by the server interceptor.
///
/// Instrumentation further down the handler chain can use it to discover the
/// identity of the active RPC span without being able to end it.
#[derive(Clone, Debug)]
pub struct RpcMetadata {
    kind: RpcCallKind,
    span_context: SpanContext,
}

impl RpcMetadata {
    pub fn new(kind: RpcCallKind, span_context: SpanContext) -> Self {
        RpcMetadata { kind, span_context }
    }

    pub fn kind(&self) -> RpcCallKind {
        self.kind
    }

    /// Identity of the span owning the call.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }
}

/// Methods for storing and retrieving [`RpcMetadata`] in a [`Context`].
pub trait RpcContextExt {
    /// Returns a copy of this context with the metadata included.
    fn with_rpc_metadata(&self, metadata: RpcMetadata) -> Context;

    /// The RPC metadata of this context, if any.
    fn rpc_metadata(&self) -> Option<&RpcMetadata>;
}

impl RpcContextExt for Context {
    fn with_rpc_metadata(&self, metadata: RpcMetadata) -> Context {
        self.with_value(metadata)
    }

    fn rpc_metadata(&self) -> Option<&RpcMetadata> {
        self.get::<RpcMetadata>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trips_through_context() {
        let cx = Context::new();
        assert!(cx.rpc_metadata().is_none());

        let cx = cx.with_rpc_metadata(RpcMetadata::new(
            RpcCallKind::RequestResponse,
            SpanContext::empty_context(),
        ));
        let metadata = cx.rpc_metadata().expect("metadata set");
        assert_eq!(metadata.kind(), RpcCallKind::RequestResponse);
        assert_eq!(metadata.span_context(), &SpanContext::empty_context());
    }
}
