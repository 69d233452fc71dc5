//! Structured error annotation for RPC spans.

use opentelemetry::trace::{SpanRef, Status};
use opentelemetry::KeyValue;

use crate::rpc::RpcError;

/// Span attribute carrying the error kind reported by the framework.
pub const RPC_ERROR_NAME: &str = "rpc.error.name";
/// Span attribute carrying the error message.
pub const RPC_ERROR_MESSAGE: &str = "rpc.error.message";
/// Span attribute carrying the error stack text, when one exists.
pub const RPC_ERROR_STACK: &str = "rpc.error.stack";

/// Records `error` on `span` and marks the span failed.
///
/// Passing `None` leaves the span untouched, so completion paths can report
/// their possibly-empty error value unconditionally. The span is never ended
/// here; ending is the caller's responsibility.
pub fn annotate_error(span: &SpanRef<'_>, error: Option<&RpcError>) {
    let Some(error) = error else {
        return;
    };

    let mut attributes = vec![
        KeyValue::new(RPC_ERROR_NAME, error.name().to_owned()),
        KeyValue::new(RPC_ERROR_MESSAGE, error.message().to_owned()),
    ];
    if let Some(stack) = error.stack() {
        attributes.push(KeyValue::new(RPC_ERROR_STACK, stack.to_owned()));
    }
    span.set_attributes(attributes);
    span.set_status(Status::error(error.message().to_owned()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{TraceContextExt, Tracer, TracerProvider};
    use opentelemetry::Context;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};

    fn finished_span(
        annotate: impl FnOnce(&SpanRef<'_>),
    ) -> SpanData {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("annotator");

        let cx = Context::new().with_span(tracer.start("op"));
        annotate(&cx.span());
        cx.span().end();

        exporter
            .get_finished_spans()
            .unwrap()
            .pop()
            .expect("span exported")
    }

    fn attribute(span: &SpanData, key: &str) -> Option<String> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.as_str().into_owned())
    }

    #[test]
    fn absent_error_changes_nothing() {
        let span = finished_span(|span| annotate_error(span, None));

        assert_eq!(span.status, Status::Unset);
        assert_eq!(attribute(&span, RPC_ERROR_NAME), None);
        assert_eq!(attribute(&span, RPC_ERROR_MESSAGE), None);
        assert_eq!(attribute(&span, RPC_ERROR_STACK), None);
    }

    #[test]
    fn error_sets_attributes_and_status() {
        let error = RpcError::new("boom").with_stack("at handler()");
        let span = finished_span(|span| annotate_error(span, Some(&error)));

        assert_eq!(span.status, Status::error("boom"));
        assert_eq!(attribute(&span, RPC_ERROR_NAME), Some("Error".to_owned()));
        assert_eq!(attribute(&span, RPC_ERROR_MESSAGE), Some("boom".to_owned()));
        assert_eq!(
            attribute(&span, RPC_ERROR_STACK),
            Some("at handler()".to_owned())
        );
    }

    #[test]
    fn plain_data_error_has_no_stack_attribute() {
        let error = RpcError::new("bad request");
        let span = finished_span(|span| annotate_error(span, Some(&error)));

        assert_eq!(span.status, Status::error("bad request"));
        assert_eq!(attribute(&span, RPC_ERROR_STACK), None);
    }

    #[test]
    fn annotation_does_not_end_the_span() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("annotator");

        let cx = Context::new().with_span(tracer.start("op"));
        annotate_error(&cx.span(), Some(&RpcError::new("boom")));

        assert!(exporter.get_finished_spans().unwrap().is_empty());
        cx.span().end();
    }
}
