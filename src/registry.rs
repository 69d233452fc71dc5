//! Lifecycle tracking for spans that have been started but not yet ended.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use opentelemetry::trace::{SpanId, TraceContextExt, TraceId};
use opentelemetry::Context;

/// Identity of a live span.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct SpanKey {
    trace_id: TraceId,
    span_id: SpanId,
}

impl SpanKey {
    fn of(cx: &Context) -> Self {
        let span = cx.span();
        let span_context = span.span_context();
        SpanKey {
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
        }
    }
}

/// The set of spans started by the instrumentation and not yet ended.
///
/// [`close`] forwards exactly one `end` to the tracing backend per registered
/// span no matter how many completion paths race to call it; the second and
/// later closes are silent no-ops. Every operation is infallible so the
/// registry can be driven from error-unwinding paths.
///
/// [`close`]: SpanRegistry::close
#[derive(Debug, Default)]
pub struct SpanRegistry {
    live: Mutex<HashSet<SpanKey>>,
}

impl SpanRegistry {
    /// Registers the span carried by `cx` and returns `cx` for chaining.
    pub fn start(&self, cx: Context) -> Context {
        self.live().insert(SpanKey::of(&cx));
        cx
    }

    /// Ends the span carried by `cx` if it is still registered, deregistering
    /// it; on an unregistered span this does nothing.
    pub fn close(&self, cx: &Context) {
        if self.live().remove(&SpanKey::of(cx)) {
            cx.span().end();
        }
    }

    /// Whether the span carried by `cx` has been started and not yet closed.
    pub fn is_open(&self, cx: &Context) -> bool {
        self.live().contains(&SpanKey::of(cx))
    }

    /// Number of spans currently started and not yet closed.
    ///
    /// A span that never completes stays counted here until an external
    /// timeout policy deals with it.
    pub fn open_count(&self) -> usize {
        self.live().len()
    }

    fn live(&self) -> MutexGuard<'_, HashSet<SpanKey>> {
        // A poisoned set still has to serve closes running on unwind paths.
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Tracer, TracerProvider};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    fn test_tracer() -> (InMemorySpanExporter, SdkTracerProvider) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (exporter, provider)
    }

    #[test]
    fn close_is_idempotent() {
        let (exporter, provider) = test_tracer();
        let tracer = provider.tracer("registry");
        let registry = SpanRegistry::default();

        let cx = registry.start(Context::new().with_span(tracer.start("op")));
        assert!(registry.is_open(&cx));

        registry.close(&cx);
        registry.close(&cx);
        registry.close(&cx);

        assert!(!registry.is_open(&cx));
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn close_of_unregistered_span_is_a_noop() {
        let (exporter, provider) = test_tracer();
        let tracer = provider.tracer("registry");
        let registry = SpanRegistry::default();

        let cx = Context::new().with_span(tracer.start("op"));
        registry.close(&cx);

        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[test]
    fn start_returns_the_same_context() {
        let (_exporter, provider) = test_tracer();
        let tracer = provider.tracer("registry");
        let registry = SpanRegistry::default();

        let cx = Context::new().with_span(tracer.start("op"));
        let span_id = cx.span().span_context().span_id();
        let cx = registry.start(cx);

        assert_eq!(cx.span().span_context().span_id(), span_id);
    }

    #[test]
    fn contexts_share_one_registration() {
        let (exporter, provider) = test_tracer();
        let tracer = provider.tracer("registry");
        let registry = SpanRegistry::default();

        let cx = registry.start(Context::new().with_span(tracer.start("op")));
        let other = cx.with_value(42_u8);

        registry.close(&other);
        registry.close(&cx);

        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }
}
