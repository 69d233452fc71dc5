//! Shared state behind the client and server interceptors.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{SpanContext, SpanKind, TraceContextExt, Tracer, TracerProvider};
use opentelemetry::{Context, InstrumentationScope, KeyValue};

use crate::client::TracedClient;
use crate::config::Config;
use crate::registry::SpanRegistry;
use crate::rpc::{Dispatcher, RpcClient};
use crate::server::TracedDispatcher;

/// Scope name under which all RPC spans are produced.
const INSTRUMENTATION_NAME: &str = "opentelemetry-rpc";

/// Entry point of the instrumentation: owns the tracer, the configuration,
/// and the registry of spans that are still open.
///
/// One instance is shared by every [`TracedClient`] and [`TracedDispatcher`]
/// derived from it, so all of them agree on which spans are live and on the
/// current configuration.
pub struct RpcInstrumentation {
    tracer: BoxedTracer,
    config: RwLock<Config>,
    registry: Arc<SpanRegistry>,
}

impl RpcInstrumentation {
    /// Creates the instrumentation against the globally registered tracer
    /// provider.
    pub fn new(config: Config) -> Self {
        let scope = InstrumentationScope::builder(INSTRUMENTATION_NAME)
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        RpcInstrumentation {
            tracer: global::tracer_provider().tracer_with_scope(scope),
            config: RwLock::new(config),
            registry: Arc::new(SpanRegistry::default()),
        }
    }

    /// Wraps a client so its outgoing operations are traced.
    pub fn instrument_client<C>(self: Arc<Self>, client: C) -> TracedClient<C>
    where
        C: RpcClient,
    {
        TracedClient::new(client, self)
    }

    /// Wraps a dispatcher so its incoming calls are traced.
    pub fn instrument_dispatcher<D>(self: Arc<Self>, dispatcher: D) -> TracedDispatcher<D>
    where
        D: Dispatcher,
    {
        TracedDispatcher::new(dispatcher, self)
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the configuration wholesale.
    pub fn set_config(&self, config: Config) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// The registry of spans started by this instrumentation and not yet
    /// ended.
    pub fn registry(&self) -> &SpanRegistry {
        &self.registry
    }

    pub(crate) fn registry_handle(&self) -> Arc<SpanRegistry> {
        self.registry.clone()
    }

    /// Starts an RPC span of the given kind, honoring the require-parent
    /// policy, and registers it for lifecycle tracking.
    ///
    /// With require-parent set and no active parent the call proceeds under a
    /// non-recording span instead of failing; a remote (cross-process) parent
    /// is reused rather than shadowed by a hop-less child.
    pub(crate) fn start_rpc_span(
        &self,
        name: String,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
        parent_cx: &Context,
    ) -> Context {
        let require_parent = match kind {
            SpanKind::Client => self.config().require_parent_for_client_spans(),
            _ => self.config().require_parent_for_server_spans(),
        };

        let cx = if require_parent && !parent_cx.has_active_span() {
            parent_cx.with_remote_span_context(SpanContext::empty_context())
        } else if require_parent && parent_cx.span().span_context().is_remote() {
            parent_cx.clone()
        } else {
            let span = self
                .tracer
                .span_builder(name)
                .with_kind(kind)
                .with_attributes(attributes)
                .start_with_context(&self.tracer, parent_cx);
            parent_cx.with_span(span)
        };

        self.registry.start(cx)
    }
}

impl Default for RpcInstrumentation {
    fn default() -> Self {
        RpcInstrumentation::new(Config::default())
    }
}

impl fmt::Debug for RpcInstrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcInstrumentation")
            .field("config", &self.config())
            .finish_non_exhaustive()
    }
}
