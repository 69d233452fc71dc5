//! Instrumentation configuration.

/// Options accepted by [`RpcInstrumentation`](crate::RpcInstrumentation).
///
/// A configuration is built once, merged over the defaults, and read-only
/// afterwards; replacing it swaps the whole record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    hostname: String,
    require_parent_for_client_spans: bool,
    require_parent_for_server_spans: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hostname: "localhost".to_owned(),
            require_parent_for_client_spans: false,
            require_parent_for_server_spans: false,
        }
    }
}

impl Config {
    /// Returns a builder seeded with the defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Host name recorded as the client-side address attribute on outgoing
    /// call spans.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Whether client spans are only recorded under an existing parent span.
    pub fn require_parent_for_client_spans(&self) -> bool {
        self.require_parent_for_client_spans
    }

    /// Whether server spans are only recorded under an existing parent span.
    pub fn require_parent_for_server_spans(&self) -> bool {
        self.require_parent_for_server_spans
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Config::builder()
    }
}

impl ConfigBuilder {
    /// Assign the host name reported on client spans.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    /// Suppress client spans that would have no parent.
    pub fn with_require_parent_for_client_spans(mut self, require: bool) -> Self {
        self.config.require_parent_for_client_spans = require;
        self
    }

    /// Suppress server spans that would have no parent.
    pub fn with_require_parent_for_server_spans(mut self, require: bool) -> Self {
        self.config.require_parent_for_server_spans = require;
        self
    }

    /// Build the immutable configuration record.
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.hostname(), "localhost");
        assert!(!config.require_parent_for_client_spans());
        assert!(!config.require_parent_for_server_spans());
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::builder()
            .with_hostname("gateway-1")
            .with_require_parent_for_server_spans(true)
            .build();

        assert_eq!(config.hostname(), "gateway-1");
        assert!(!config.require_parent_for_client_spans());
        assert!(config.require_parent_for_server_spans());
    }
}
