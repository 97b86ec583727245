//! Client configuration.
//!
//! All types deserialize with `#[serde(default)]`, so a partial YAML document or
//! a handful of environment variables is enough to override a single knob.

use crate::error::HttpError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment prefix used by [`HttpClientConfig::figment`].
pub const ENV_PREFIX: &str = "LEGO_HTTP_";

/// Default overall timeout of one call (connect, headers and body read).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Default cap on the decoded response body (10 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Which transport strategy a configured client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Pooled keep-alive transport, HTTP/1.1 with h2 over TLS via ALPN
    #[default]
    Pooled,
    /// HTTP/2 over cleartext TCP with prior knowledge
    H2c,
}

/// TLS root certificate source for the pooled transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsRootConfig {
    /// Mozilla root certificates compiled into the binary
    #[default]
    WebPki,
    /// Certificates from the OS trust store
    Native,
}

/// Tunables of the pooled transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PooledConfig {
    /// TCP connect timeout
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Duration,

    /// TCP keep-alive probe interval
    #[serde(with = "humantime_serde")]
    pub keep_alive: Duration,

    /// How long an idle pooled connection is kept
    #[serde(with = "humantime_serde")]
    pub idle_conn_timeout: Duration,

    /// Upper bound for the TLS handshake; the whole connect step is limited
    /// to `dial_timeout + tls_handshake_timeout`
    #[serde(with = "humantime_serde")]
    pub tls_handshake_timeout: Duration,

    /// Overall idle connection budget. The pool only supports a per-host
    /// limit, so the effective per-host cap is `min(max_idle_conns, max_idle_conns_per_host)`.
    pub max_idle_conns: usize,

    /// Idle connections kept per host
    pub max_idle_conns_per_host: usize,

    /// Close every connection after one exchange
    pub disable_keep_alives: bool,

    /// Honor `HTTP_PROXY` / `NO_PROXY` from the environment
    pub use_env_proxy: bool,

    /// Root certificates for HTTPS targets
    pub tls_roots: TlsRootConfig,
}

impl Default for PooledConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(3),
            keep_alive: Duration::from_secs(15),
            idle_conn_timeout: Duration::from_secs(90),
            tls_handshake_timeout: Duration::from_secs(10),
            max_idle_conns: 512,
            max_idle_conns_per_host: 100,
            disable_keep_alives: false,
            use_env_proxy: true,
            tls_roots: TlsRootConfig::WebPki,
        }
    }
}

impl PooledConfig {
    /// Idle connections the pool may keep for one host.
    #[must_use]
    pub fn effective_idle_per_host(&self) -> usize {
        if self.disable_keep_alives {
            0
        } else {
            self.max_idle_conns.min(self.max_idle_conns_per_host)
        }
    }

    /// Upper bound of one connect step (TCP dial plus TLS handshake).
    #[must_use]
    pub fn connect_budget(&self) -> Duration {
        self.dial_timeout + self.tls_handshake_timeout
    }
}

/// Tunables of the cleartext HTTP/2 transport.
///
/// Only the dial timeout is configurable: the h2c client ignores proxies and
/// pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct H2cConfig {
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Duration,
}

impl Default for H2cConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(6),
        }
    }
}

/// Complete client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpClientConfig {
    /// Transport strategy
    pub transport: TransportKind,

    /// Pooled transport tunables (ignored for h2c)
    pub pooled: PooledConfig,

    /// h2c transport tunables (ignored for pooled)
    pub h2c: H2cConfig,

    /// Overall timeout of one call, including the body read
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,

    /// Maximum decoded response body size
    pub max_body_size: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Pooled,
            pooled: PooledConfig::default(),
            h2c: H2cConfig::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl HttpClientConfig {
    /// Default configuration using the h2c transport.
    #[must_use]
    pub fn h2c() -> Self {
        Self {
            transport: TransportKind::H2c,
            ..Default::default()
        }
    }

    /// Pooled configuration with the given call timeout, idle budget and keep-alive mode.
    #[must_use]
    pub fn pooled(call_timeout: Duration, max_idle_conns: usize, disable_keep_alives: bool) -> Self {
        Self {
            transport: TransportKind::Pooled,
            pooled: PooledConfig {
                max_idle_conns,
                disable_keep_alives,
                ..Default::default()
            },
            call_timeout,
            ..Default::default()
        }
    }

    /// Standard provider chain: defaults, then an optional YAML file, then
    /// `LEGO_HTTP_*` environment variables (`__` separates nested keys).
    #[must_use]
    pub fn figment(yaml_path: Option<&std::path::Path>) -> figment::Figment {
        use figment::Figment;
        use figment::providers::{Env, Format, Serialized, Yaml};

        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = yaml_path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract the configuration from a figment.
    ///
    /// # Errors
    /// Returns `HttpError::Config` if a provider fails or a value has the wrong shape.
    pub fn from_figment(figment: &figment::Figment) -> Result<Self, HttpError> {
        figment
            .extract()
            .map_err(|e| HttpError::Config(std::sync::Arc::new(e)))
    }
}
