//! Staged connectivity probing.
//!
//! Two entry points share one pipeline. `quick_probe` measures DNS
//! resolution and TCP connect only and is meant as a fast pre-filter;
//! `full_probe` additionally stands up a real proxy session through the
//! launcher collaborator and measures an application-level round trip
//! through it. Every stage is independently timed and failures are
//! classified by the stage that produced them, so a failed probe still
//! returns a fully populated [`ProbeResult`] with partial timings.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::{self, DEFAULT_HTTP_PORT, DEFAULT_SOCKS_PORT};
use crate::launcher::ProxyLauncher;
use crate::parser::ConnectionDescriptor;

pub mod result;
pub mod score;

pub use result::{ProbeErrorKind, ProbeResult, TtfbMeasurement};
pub use score::score;

// ============================================================================
// Engine Configuration
// ============================================================================

/// Reachability endpoints: one primary and two fallbacks. The engine probes
/// the primary; callers switch to a fallback only if the primary repeatedly
/// fails.
pub const PROBE_ENDPOINTS: [&str; 3] = [
    "https://www.google.com/generate_204",
    "https://www.cloudflare.com/cdn-cgi/trace",
    "https://detectportal.firefox.com/success.txt",
];

/// Upper bound on the caller-requested retry budget.
pub const MAX_PROBE_ATTEMPTS: u32 = 5;

/// Read-only engine settings shared by all probe calls.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub dns_timeout: Duration,
    pub tcp_timeout: Duration,
    pub tls_timeout: Duration,
    pub transport_timeout: Duration,
    pub ttfb_timeout: Duration,
    /// How long to wait after `start` before the proxy listener is usable
    pub startup_delay: Duration,
    /// Local HTTP inbound port written into config artifacts
    pub http_port: u16,
    /// Local SOCKS inbound port written into config artifacts
    pub socks_port: u16,
    pub endpoints: Vec<String>,
    /// Concurrency cap for parallel probing; enforcement is the caller's
    /// responsibility, individual engine calls are sequential
    pub max_concurrent_probes: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            dns_timeout: Duration::from_millis(1000),
            tcp_timeout: Duration::from_millis(2500),
            tls_timeout: Duration::from_millis(3000),
            transport_timeout: Duration::from_millis(3000),
            ttfb_timeout: Duration::from_millis(5000),
            startup_delay: Duration::from_millis(2000),
            http_port: DEFAULT_HTTP_PORT,
            socks_port: DEFAULT_SOCKS_PORT,
            endpoints: PROBE_ENDPOINTS.iter().map(ToString::to_string).collect(),
            max_concurrent_probes: 50,
        }
    }
}

// ============================================================================
// Probe Engine
// ============================================================================

/// Stateless probe pipeline; holds nothing but read-only configuration, so
/// concurrent probes against different descriptors are independent.
pub struct ProbeEngine {
    config: ProbeConfig,
}

impl ProbeEngine {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ProbeConfig::default())
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    fn primary_endpoint(&self) -> &str {
        self.config
            .endpoints
            .first()
            .map(String::as_str)
            .unwrap_or(PROBE_ENDPOINTS[0])
    }

    // ========================================================================
    // Quick Probe (DNS + TCP)
    // ========================================================================

    /// Measures DNS resolution and TCP connect against the descriptor's
    /// target. Used as a fast pre-filter: callers should skip the full probe
    /// for any descriptor whose quick probe fails.
    pub async fn quick_probe(&self, descriptor: &ConnectionDescriptor) -> ProbeResult {
        let mut result = ProbeResult::default();
        let target = format!("{}:{}", descriptor.address, descriptor.port);
        debug!("Quick probe: resolving {}", target);

        // Stage 1: DNS resolution (protocol-agnostic, IPv4/IPv6)
        let dns_start = Instant::now();
        let resolved = timeout(
            self.config.dns_timeout,
            lookup_host((descriptor.address.as_str(), descriptor.port)),
        )
        .await;
        result.dns_ms = measured_millis(dns_start.elapsed());

        let addrs: Vec<SocketAddr> = match resolved {
            Ok(Ok(addrs)) => addrs.collect(),
            Ok(Err(e)) => {
                return stage_failure(
                    result,
                    ProbeErrorKind::DnsFailure,
                    format!("DNS resolution failed for {target}: {e}"),
                );
            }
            Err(_) => {
                return stage_failure(
                    result,
                    ProbeErrorKind::DnsFailure,
                    format!(
                        "DNS resolution for {target} timed out after {}ms",
                        self.config.dns_timeout.as_millis()
                    ),
                );
            }
        };
        let Some(&first) = addrs.first() else {
            return stage_failure(
                result,
                ProbeErrorKind::DnsFailure,
                format!("DNS resolution for {target} returned no addresses"),
            );
        };

        // Stage 2: TCP connect
        debug!("Quick probe: connecting to {}", first);
        let tcp_start = Instant::now();
        let connected = timeout(self.config.tcp_timeout, TcpStream::connect(first)).await;
        result.tcp_connect_ms = measured_millis(tcp_start.elapsed());

        match connected {
            Ok(Ok(_stream)) => {}
            Ok(Err(e)) => {
                return stage_failure(
                    result,
                    ProbeErrorKind::TcpTimeout,
                    format!("TCP connect failed to {target}: {e}"),
                );
            }
            Err(_) => {
                return stage_failure(
                    result,
                    ProbeErrorKind::TcpTimeout,
                    format!(
                        "TCP connect to {target} timed out after {}ms",
                        self.config.tcp_timeout.as_millis()
                    ),
                );
            }
        }

        result.success = true;
        result.total_ms = result.dns_ms + result.tcp_connect_ms;
        // No TTFB measurement at this depth; only transport timing contributes
        result.score = score(result.tcp_connect_ms, result.tcp_connect_ms, true);

        debug!(
            "Quick probe complete: dns={}ms tcp={}ms score={:.3}",
            result.dns_ms, result.tcp_connect_ms, result.score
        );
        result
    }

    // ========================================================================
    // Full Probe (Quick + Proxied App-Level Round Trip)
    // ========================================================================

    /// Runs the quick probe, then stands up a real proxy session and
    /// measures one HTTP round trip through it.
    ///
    /// `attempts` is clamped to 1..=5 and surfaced in the result; the engine
    /// performs exactly one measurement pass per call — looping across
    /// attempts is caller-level policy.
    pub async fn full_probe<L: ProxyLauncher>(
        &self,
        descriptor: &ConnectionDescriptor,
        launcher: &L,
        attempts: u32,
    ) -> ProbeResult {
        let attempts = attempts.clamp(1, MAX_PROBE_ATTEMPTS);

        let mut result = self.quick_probe(descriptor).await;
        result.attempts = attempts;
        if !result.success {
            debug!("Quick probe failed, skipping app-level stage");
            return result;
        }

        // Stage 3: proxy setup + proxied round trip. The temp artifact is
        // removed when `artifact` drops, on every exit path.
        let artifact = match self.write_temp_artifact(descriptor) {
            Ok(file) => file,
            Err(e) => {
                return app_stage_failure(
                    result,
                    ProbeErrorKind::Unknown,
                    format!("failed to write config artifact: {e:#}"),
                );
            }
        };

        let mut session = match launcher.start(artifact.path()) {
            Ok(session) => session,
            Err(e) => {
                return app_stage_failure(
                    result,
                    ProbeErrorKind::TransportError,
                    format!("proxy launcher failed: {e:#}"),
                );
            }
        };

        sleep(self.config.startup_delay).await;

        let outcome = self
            .proxied_request(self.config.http_port, self.primary_endpoint())
            .await;

        if let Err(e) = launcher.stop(&mut session) {
            warn!("Failed to stop proxy session: {e:#}");
        }
        drop(artifact);

        match outcome {
            Ok((ttfb_ms, status)) if reachable_status(status) => {
                result.ttfb_ms = ttfb_ms;
                // Proxy-setup time is not separately distinguishable from the
                // single measured round trip
                result.proxy_setup_ms = ttfb_ms;
                result.total_ms = result.dns_ms + result.tcp_connect_ms + ttfb_ms;
                result.score = score(ttfb_ms, result.tcp_connect_ms, true);
                debug!(
                    "Full probe complete: dns={}ms tcp={}ms ttfb={}ms score={:.3}",
                    result.dns_ms, result.tcp_connect_ms, result.ttfb_ms, result.score
                );
                result
            }
            Ok((ttfb_ms, status)) => {
                result.ttfb_ms = ttfb_ms;
                let kind = if status == 407 {
                    ProbeErrorKind::AuthError
                } else {
                    ProbeErrorKind::UpstreamBlocked
                };
                app_stage_failure(result, kind, format!("endpoint returned HTTP {status}"))
            }
            Err((kind, detail)) => app_stage_failure(result, kind, detail),
        }
    }

    // ========================================================================
    // TTFB Health Check
    // ========================================================================

    /// Measures a single proxied GET through an already-running local proxy
    /// listener — a lighter-weight health check than a full probe, with no
    /// DNS/TCP re-measurement. A port of 0 uses the engine's configured
    /// HTTP port.
    pub async fn measure_ttfb(&self, http_port: u16) -> TtfbMeasurement {
        let port = if http_port == 0 {
            self.config.http_port
        } else {
            http_port
        };
        let platform = std::env::consts::OS.to_string();

        match self.proxied_request(port, self.primary_endpoint()).await {
            Ok((ttfb_ms, status)) => TtfbMeasurement {
                platform,
                success: true,
                ttfb_ms: Some(ttfb_ms),
                http_status: Some(status),
                error_message: None,
            },
            Err((_, detail)) => TtfbMeasurement {
                platform,
                success: false,
                ttfb_ms: None,
                http_status: None,
                error_message: Some(detail),
            },
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// One GET through the local HTTP proxy listener, timed from request
    /// send to response headers (first byte). Returns the measured TTFB and
    /// HTTP status for any response at all; errors are classified by the
    /// failing layer.
    async fn proxied_request(
        &self,
        http_port: u16,
        endpoint: &str,
    ) -> Result<(u64, u16), (ProbeErrorKind, String)> {
        let proxy_url = format!("http://127.0.0.1:{http_port}");
        let proxy = reqwest::Proxy::all(&proxy_url)
            .map_err(|e| (ProbeErrorKind::Unknown, format!("invalid proxy URL: {e}")))?;

        // The endpoint's certificate is not the subject under test, the
        // tunnel is
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .danger_accept_invalid_certs(true)
            .connect_timeout(self.config.transport_timeout)
            .timeout(self.config.ttfb_timeout)
            .user_agent(format!("rayprobe/{}", crate::get_version()))
            .build()
            .map_err(|e| {
                (
                    ProbeErrorKind::Unknown,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        debug!("Proxied GET {} via {}", endpoint, proxy_url);
        let start = Instant::now();
        match client.get(endpoint).send().await {
            Ok(response) => {
                let ttfb_ms = measured_millis(start.elapsed());
                Ok((ttfb_ms, response.status().as_u16()))
            }
            Err(e) => Err(classify_request_error(&e)),
        }
    }

    fn write_temp_artifact(&self, descriptor: &ConnectionDescriptor) -> Result<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix("rayprobe-")
            .suffix(".json")
            .tempfile()
            .context("Failed to create temp config artifact")?;
        config::write_config_artifact(
            descriptor,
            self.config.http_port,
            self.config.socks_port,
            file.path(),
        )?;
        Ok(file)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A measured stage duration of 0 ms would read as "never ran"; clamp to 1.
fn measured_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// 2xx and 3xx (including 204) count as reachable.
fn reachable_status(status: u16) -> bool {
    (200..400).contains(&status)
}

fn stage_failure(mut result: ProbeResult, kind: ProbeErrorKind, detail: String) -> ProbeResult {
    result.success = false;
    result.score = 0.0;
    result.error_kind = kind;
    result.error_detail = Some(detail);
    result.total_ms = result.dns_ms + result.tcp_connect_ms;
    result
}

fn app_stage_failure(mut result: ProbeResult, kind: ProbeErrorKind, detail: String) -> ProbeResult {
    result.success = false;
    result.score = 0.0;
    result.error_kind = kind;
    result.error_detail = Some(detail);
    result.total_ms = result.dns_ms + result.tcp_connect_ms + result.ttfb_ms;
    result
}

fn classify_request_error(error: &reqwest::Error) -> (ProbeErrorKind, String) {
    let detail = error.to_string();
    if error.is_timeout() {
        return (ProbeErrorKind::Timeout, detail);
    }
    if error_chain_mentions_tls(error) {
        return (ProbeErrorKind::TlsError, detail);
    }
    (ProbeErrorKind::TransportError, detail)
}

fn error_chain_mentions_tls(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return true;
        }
        source = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::launcher::ProxySession;
    use crate::parser::Protocol;

    use super::*;

    fn descriptor(address: &str, port: u16) -> ConnectionDescriptor {
        ConnectionDescriptor {
            protocol: Protocol::Vless,
            address: address.to_string(),
            port,
            identity: "a1b2c3d4-e5f6-7890-abcd-ef1234567890".to_string(),
            params: BTreeMap::new(),
            raw_uri: format!("vless://uuid@{address}:{port}"),
        }
    }

    /// Launcher stub that records start calls and spawns nothing.
    #[derive(Default)]
    struct CountingLauncher {
        starts: AtomicUsize,
    }

    impl ProxyLauncher for CountingLauncher {
        fn start(&self, config_path: &Path) -> anyhow::Result<ProxySession> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(ProxySession::detached(config_path))
        }

        fn stop(&self, _session: &mut ProxySession) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn assert_result_invariants(result: &ProbeResult) {
        assert_eq!(result.success, result.error_kind == ProbeErrorKind::None);
        if result.success {
            assert!(result.score > 0.0);
        } else {
            assert_eq!(result.score, 0.0);
        }
        assert!((0.0..=1.0).contains(&result.score));
        let stages = [
            result.dns_ms,
            result.tcp_connect_ms,
            result.tls_handshake_ms,
            result.transport_handshake_ms,
            result.ttfb_ms,
        ];
        assert!(result.total_ms >= stages.iter().copied().max().unwrap_or(0));
    }

    #[tokio::test]
    async fn test_quick_probe_success_on_loopback_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let engine = ProbeEngine::with_defaults();
        let result = engine.quick_probe(&descriptor("127.0.0.1", port)).await;

        assert!(result.success, "expected success: {:?}", result.error_detail);
        assert_eq!(result.error_kind, ProbeErrorKind::None);
        assert!(result.dns_ms >= 1);
        assert!(result.tcp_connect_ms >= 1);
        assert_eq!(result.total_ms, result.dns_ms + result.tcp_connect_ms);
        assert_eq!(result.ttfb_ms, 0);
        assert_result_invariants(&result);
    }

    #[tokio::test]
    async fn test_quick_probe_refused_connection_is_tcp_failure() {
        // Bind to learn a free port, then drop the listener so connects are
        // refused
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let engine = ProbeEngine::with_defaults();
        let result = engine.quick_probe(&descriptor("127.0.0.1", port)).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, ProbeErrorKind::TcpTimeout);
        assert!(result.dns_ms >= 1);
        assert!(result.tcp_connect_ms >= 1);
        assert!(result.error_detail.is_some());
        assert_result_invariants(&result);
    }

    #[tokio::test]
    async fn test_quick_probe_dns_failure() {
        let engine = ProbeEngine::with_defaults();
        let result = engine
            .quick_probe(&descriptor("definitely-not-a-real-host.invalid", 443))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, ProbeErrorKind::DnsFailure);
        assert!(result.dns_ms >= 1);
        assert_eq!(result.tcp_connect_ms, 0);
        assert_result_invariants(&result);
    }

    #[tokio::test]
    async fn test_full_probe_copies_quick_failure_and_skips_launcher() {
        let engine = ProbeEngine::with_defaults();
        let launcher = CountingLauncher::default();

        let result = engine
            .full_probe(&descriptor("definitely-not-a-real-host.invalid", 443), &launcher, 3)
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, ProbeErrorKind::DnsFailure);
        assert_eq!(result.attempts, 3);
        assert_eq!(launcher.starts.load(Ordering::SeqCst), 0);
        assert_result_invariants(&result);
    }

    #[tokio::test]
    async fn test_full_probe_clamps_attempts() {
        let engine = ProbeEngine::with_defaults();
        let launcher = CountingLauncher::default();
        let target = descriptor("definitely-not-a-real-host.invalid", 443);

        let high = engine.full_probe(&target, &launcher, 99).await;
        assert_eq!(high.attempts, MAX_PROBE_ATTEMPTS);

        let low = engine.full_probe(&target, &launcher, 0).await;
        assert_eq!(low.attempts, 1);
    }

    #[tokio::test]
    async fn test_measure_ttfb_against_dead_listener() {
        // Nothing listens on the reserved port below, so the proxied request
        // fails at the connect layer
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ProbeConfig {
            ttfb_timeout: Duration::from_millis(2000),
            ..Default::default()
        };
        let engine = ProbeEngine::new(config);
        let measurement = engine.measure_ttfb(port).await;

        assert_eq!(measurement.platform, std::env::consts::OS);
        assert!(!measurement.success);
        assert!(measurement.ttfb_ms.is_none());
        assert!(measurement.http_status.is_none());
        assert!(measurement.error_message.is_some());
    }

    #[test]
    fn test_reachable_status() {
        assert!(reachable_status(200));
        assert!(reachable_status(204));
        assert!(reachable_status(301));
        assert!(!reachable_status(404));
        assert!(!reachable_status(407));
        assert!(!reachable_status(500));
    }

    #[test]
    fn test_measured_millis_floor() {
        assert_eq!(measured_millis(Duration::from_micros(5)), 1);
        assert_eq!(measured_millis(Duration::from_millis(42)), 42);
    }

    #[test]
    fn test_probe_config_defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.dns_timeout, Duration::from_millis(1000));
        assert_eq!(config.tcp_timeout, Duration::from_millis(2500));
        assert_eq!(config.ttfb_timeout, Duration::from_millis(5000));
        assert_eq!(config.http_port, 2300);
        assert_eq!(config.socks_port, 2301);
        assert_eq!(config.max_concurrent_probes, 50);
        assert_eq!(config.endpoints.len(), 3);
        assert_eq!(config.endpoints[0], "https://www.google.com/generate_204");
    }
}
