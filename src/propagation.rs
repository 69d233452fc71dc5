//! Trace-context serialization over the RPC header carrier.
//!
//! The wrapped framework carries call metadata as a flat string-keyed map.
//! These adapters let the globally configured [`TextMapPropagator`] read and
//! write that map directly, so the client interceptor can serialize the
//! active context into outgoing headers and the server interceptor can
//! recover a parent context from inbound ones.
//!
//! [`TextMapPropagator`]: opentelemetry::propagation::TextMapPropagator

use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::{global, Context};

use crate::rpc::Headers;

/// Helper for injecting the trace context into an RPC header map.
pub struct HeaderInjector<'a>(pub &'a mut Headers);

impl Injector for HeaderInjector<'_> {
    /// Set a key and value in the header map.
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_owned(), value);
    }
}

/// Helper for extracting the trace context from an RPC header map.
pub struct HeaderExtractor<'a>(pub &'a Headers);

impl Extractor for HeaderExtractor<'_> {
    /// Get a value for a key from the header map.
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Collect all the keys from the header map.
    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// Injects the trace context of `cx` into `headers` through the globally
/// configured propagator.
///
/// A context without a valid span injects nothing observable.
pub fn inject_context(cx: &Context, headers: &mut Headers) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut HeaderInjector(headers))
    });
}

/// Extracts a parent context from inbound `headers`, rooted in an empty
/// context rather than the caller's current one.
///
/// Headers carrying no valid trace context yield a context with no parent;
/// this is not an error.
pub fn extract_context(headers: &Headers) -> Context {
    global::get_text_map_propagator(|propagator| {
        propagator.extract_with_context(&Context::new(), &HeaderExtractor(headers))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };
    use opentelemetry_sdk::propagation::TraceContextPropagator;

    fn remote_context() -> Context {
        let span_context = SpanContext::new(
            TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
            SpanId::from(0x00f0_67aa_0ba9_02b7),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }

    #[test]
    fn round_trip_preserves_parent_identity() {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let cx = remote_context();
        let mut headers = Headers::new();
        inject_context(&cx, &mut headers);
        assert!(headers.contains_key("traceparent"));

        let extracted = extract_context(&headers);
        assert_eq!(
            extracted.span().span_context().trace_id(),
            cx.span().span_context().trace_id()
        );
        assert_eq!(
            extracted.span().span_context().span_id(),
            cx.span().span_context().span_id()
        );
        assert!(extracted.span().span_context().is_remote());
    }

    #[test]
    fn empty_context_injects_nothing() {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let mut headers = Headers::new();
        inject_context(&Context::new(), &mut headers);

        assert!(headers.is_empty());
    }

    #[test]
    fn headers_without_trace_context_yield_no_parent() {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let mut headers = Headers::new();
        headers.insert("content-type".to_owned(), "application/json".to_owned());

        let extracted = extract_context(&headers);
        assert!(!extracted.has_active_span());
    }

    #[test]
    fn carrier_adapters_read_back_what_they_wrote() {
        let mut headers = Headers::new();
        HeaderInjector(&mut headers).set("traceparent", "value".to_owned());

        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some("value"));
        assert_eq!(extractor.keys(), vec!["traceparent"]);
    }
}
