use crate::error::Result;
use crate::metrics::LookupMetrics;
use crate::model::{
    GeoLocation, LookupRequest, LookupResult, NetworkErrorKind, LOOKUP_FAILED_MESSAGE, NOT_AVAILABLE,
};
use crate::service::channel::ResultSender;
use crate::service::validator::validate;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "http://ip-api.com/json";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// Hard deadline slack on top of the HTTP client timeout.
const DEADLINE_GRACE: Duration = Duration::from_millis(500);

/// Body returned by the provider. Everything is optional here so that a
/// missing required field surfaces as a malformed-body error.
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    status: Option<String>,
    message: Option<String>,
    country: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    isp: Option<String>,
    org: Option<String>,
    timezone: Option<String>,
}

struct FetchFailure {
    kind: NetworkErrorKind,
    message: String,
}

impl FetchFailure {
    fn malformed(detail: impl std::fmt::Display) -> Self {
        Self {
            kind: NetworkErrorKind::MalformedBody,
            message: format!("Error: malformed response: {}", detail),
        }
    }
}

impl From<reqwest::Error> for FetchFailure {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if err.is_status() {
            NetworkErrorKind::HttpStatus
        } else if err.is_decode() {
            NetworkErrorKind::MalformedBody
        } else {
            NetworkErrorKind::Transport
        };
        Self {
            kind,
            message: format!("Error: {}", err),
        }
    }
}

impl ProviderResponse {
    fn into_location(self, ip: &str) -> std::result::Result<GeoLocation, FetchFailure> {
        if self.status.as_deref() != Some("success") {
            let status = self.status.as_deref().unwrap_or("<missing>");
            debug!(
                "Provider rejected {}: status={} message={}",
                ip,
                status,
                self.message.as_deref().unwrap_or("")
            );
            return Err(FetchFailure {
                kind: NetworkErrorKind::ProviderRejected,
                message: LOOKUP_FAILED_MESSAGE.to_string(),
            });
        }

        let country = self.country.ok_or_else(|| FetchFailure::malformed("missing field `country`"))?;
        let city = self.city.ok_or_else(|| FetchFailure::malformed("missing field `city`"))?;
        let lat = self.lat.ok_or_else(|| FetchFailure::malformed("missing field `lat`"))?;
        let lon = self.lon.ok_or_else(|| FetchFailure::malformed("missing field `lon`"))?;

        Ok(GeoLocation {
            ip: ip.to_string(),
            country,
            city,
            lat,
            lon,
            isp: self.isp.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            org: self.org.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            timezone: self.timezone.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        })
    }
}

/// Handle to one in-flight lookup.
#[derive(Debug)]
pub struct LookupHandle {
    cancel: Arc<Notify>,
    task: JoinHandle<()>,
}

impl LookupHandle {
    /// Ask the lookup to stop. It still delivers exactly one result
    /// (a `Cancelled` network error) unless it already finished.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Dispatches geolocation lookups onto the tokio runtime.
#[derive(Clone)]
pub struct GeoService {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    runtime: Handle,
    metrics: LookupMetrics,
}

impl GeoService {
    pub fn new(endpoint: &str, timeout: Duration, runtime: Handle) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
            runtime,
            metrics: LookupMetrics::new(),
        })
    }

    /// Client that ignores system proxy settings, for talking to local stubs.
    #[cfg(test)]
    pub(crate) fn for_tests(endpoint: &str, timeout: Duration, runtime: &Handle) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .unwrap();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
            runtime: runtime.clone(),
            metrics: LookupMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &LookupMetrics {
        &self.metrics
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Spawn one background task for `request`. Its single terminal result
    /// is pushed onto `sender`; nothing is returned synchronously.
    pub fn dispatch(&self, request: LookupRequest, sender: ResultSender) -> LookupHandle {
        self.metrics.increment_dispatched();
        let cancel = Arc::new(Notify::new());
        let service = self.clone();
        let signal = cancel.clone();

        let task = self.runtime.spawn(async move {
            let ip = request.ip.clone();
            let submitted_at = request.submitted_at;
            let result = service.run_guarded(request, signal).await;
            debug!(
                "Lookup for {} resolved as {} in {}ms",
                ip,
                result.status(),
                (chrono::Local::now() - submitted_at).num_milliseconds()
            );
            service.metrics.record(&result);
            if !sender.push(result) {
                warn!("Result for {} dropped: receiver closed", ip);
            }
        });

        LookupHandle { cancel, task }
    }

    /// Deliver a `ValidationError` for input that failed validation before dispatch.
    pub fn reject(&self, request: LookupRequest, sender: &ResultSender) {
        self.metrics.increment_dispatched();
        let result = LookupResult::invalid(request.ip);
        self.metrics.record(&result);
        if !sender.push(result) {
            warn!("Validation result dropped: receiver closed");
        }
    }

    // Every failure mode, including a panic in the request future, ends in
    // exactly one LookupResult.
    async fn run_guarded(&self, request: LookupRequest, cancel: Arc<Notify>) -> LookupResult {
        let ip = request.ip;
        if !validate(&ip) {
            return LookupResult::invalid(ip);
        }

        let service = self.clone();
        let lookup_ip = ip.clone();
        let inner = tokio::spawn(async move { service.lookup(&lookup_ip).await });
        let abort = inner.abort_handle();
        let deadline = self.timeout + DEADLINE_GRACE;

        tokio::select! {
            joined = tokio::time::timeout(deadline, inner) => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => LookupResult::network(
                    ip,
                    format!("Error: lookup task failed: {}", e),
                    NetworkErrorKind::TaskFailed,
                ),
                Err(_) => {
                    abort.abort();
                    LookupResult::network(
                        ip,
                        format!("Error: request timed out after {:.1}s", self.timeout.as_secs_f64()),
                        NetworkErrorKind::Timeout,
                    )
                }
            },
            _ = cancel.notified() => {
                abort.abort();
                LookupResult::network(ip, "Lookup cancelled", NetworkErrorKind::Cancelled)
            }
        }
    }

    /// Perform one lookup against the provider and classify the outcome.
    pub async fn lookup(&self, ip: &str) -> LookupResult {
        match self.fetch(ip).await {
            Ok(location) => LookupResult::Success(location),
            Err(failure) => LookupResult::network(ip, failure.message, failure.kind),
        }
    }

    async fn fetch(&self, ip: &str) -> std::result::Result<GeoLocation, FetchFailure> {
        let url = format!("{}/{}", self.endpoint, ip);
        debug!("GET {}", url);

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let resp: ProviderResponse = serde_json::from_str(&body).map_err(FetchFailure::malformed)?;
        resp.into_location(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::channel::result_channel;
    use crate::test_support::{spawn_stub, test_runtime, StubReply, GOOGLE_DNS_BODY};
    use std::time::Instant;

    fn drain(rx: &mut crate::service::channel::ResultReceiver, n: usize, limit: Duration) -> Vec<LookupResult> {
        let start = Instant::now();
        let mut out = Vec::new();
        while out.len() < n && start.elapsed() < limit {
            match rx.try_pop() {
                Some(result) => out.push(result),
                None => std::thread::sleep(Duration::from_millis(10)),
            }
        }
        out
    }

    #[test]
    fn test_success_populates_all_fields() {
        let rt = test_runtime();
        let stub = spawn_stub(rt.handle(), |_| StubReply::ok(GOOGLE_DNS_BODY));
        let service = GeoService::for_tests(&stub.endpoint, DEFAULT_TIMEOUT, rt.handle());

        let result = rt.block_on(service.lookup("8.8.8.8"));
        match result {
            LookupResult::Success(location) => {
                assert_eq!(location.ip, "8.8.8.8");
                assert_eq!(location.country, "United States");
                assert_eq!(location.city, "Mountain View");
                assert_eq!(location.lat, 37.4056);
                assert_eq!(location.lon, -122.0775);
                assert_eq!(location.isp, "Google LLC");
                assert_eq!(location.org, "Google Public DNS");
                assert_eq!(location.timezone, "America/Los_Angeles");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(stub.paths(), vec!["/json/8.8.8.8".to_string()]);
    }

    #[test]
    fn test_missing_optional_fields_become_na() {
        let rt = test_runtime();
        let stub = spawn_stub(rt.handle(), |_| {
            StubReply::ok(r#"{"status":"success","country":"Germany","city":"Berlin","lat":52.52,"lon":13.405}"#)
        });
        let service = GeoService::for_tests(&stub.endpoint, DEFAULT_TIMEOUT, rt.handle());

        let LookupResult::Success(location) = rt.block_on(service.lookup("5.5.5.5")) else {
            panic!("expected success");
        };
        assert_eq!(location.isp, NOT_AVAILABLE);
        assert_eq!(location.org, NOT_AVAILABLE);
        assert_eq!(location.timezone, NOT_AVAILABLE);
        assert!(location.display_text().contains("ISP: N/A"));
        assert!(location.display_text().contains("Timezone: N/A"));
    }

    #[test]
    fn test_provider_failure_status() {
        let rt = test_runtime();
        let stub = spawn_stub(rt.handle(), |_| {
            StubReply::ok(r#"{"status":"fail","message":"private range","query":"10.0.0.1"}"#)
        });
        let service = GeoService::for_tests(&stub.endpoint, DEFAULT_TIMEOUT, rt.handle());

        let result = rt.block_on(service.lookup("10.0.0.1"));
        assert_eq!(
            result,
            LookupResult::network("10.0.0.1", LOOKUP_FAILED_MESSAGE, NetworkErrorKind::ProviderRejected)
        );
    }

    #[test]
    fn test_http_error_and_malformed_body() {
        let rt = test_runtime();
        let stub = spawn_stub(rt.handle(), |path| {
            if path.ends_with("1.1.1.1") {
                StubReply::with_status(503, "{}")
            } else if path.ends_with("2.2.2.2") {
                StubReply::ok("<html>not json</html>")
            } else {
                StubReply::ok(r#"{"status":"success","country":"X","lat":1.0,"lon":2.0}"#)
            }
        });
        let service = GeoService::for_tests(&stub.endpoint, DEFAULT_TIMEOUT, rt.handle());

        let kind_of = |result: LookupResult| match result {
            LookupResult::NetworkError { kind, message, .. } => {
                assert!(message.starts_with("Error:"), "{}", message);
                kind
            }
            other => panic!("unexpected result: {:?}", other),
        };

        assert_eq!(kind_of(rt.block_on(service.lookup("1.1.1.1"))), NetworkErrorKind::HttpStatus);
        assert_eq!(kind_of(rt.block_on(service.lookup("2.2.2.2"))), NetworkErrorKind::MalformedBody);
        assert_eq!(kind_of(rt.block_on(service.lookup("3.3.3.3"))), NetworkErrorKind::MalformedBody);
    }

    #[test]
    fn test_transport_failure() {
        let rt = test_runtime();
        // Bind then drop to get a port with nothing listening
        let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let endpoint = format!("http://{}/json", addr);
        let service = GeoService::for_tests(&endpoint, DEFAULT_TIMEOUT, rt.handle());

        match rt.block_on(service.lookup("8.8.8.8")) {
            LookupResult::NetworkError { ip, kind, .. } => {
                assert_eq!(ip, "8.8.8.8");
                assert_eq!(kind, NetworkErrorKind::Transport);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_invalid_never_hits_network() {
        let rt = test_runtime();
        let stub = spawn_stub(rt.handle(), |_| StubReply::ok(GOOGLE_DNS_BODY));
        let service = GeoService::for_tests(&stub.endpoint, DEFAULT_TIMEOUT, rt.handle());
        let (tx, mut rx) = result_channel();

        service.dispatch(LookupRequest::new("999.1.1.1"), tx.clone());
        service.reject(LookupRequest::new("abc"), &tx);

        let results = drain(&mut rx, 2, Duration::from_secs(2));
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, LookupResult::ValidationError { .. })));
        assert_eq!(stub.hits(), 0);
        assert_eq!(service.metrics().get_invalid(), 2);
    }

    #[test]
    fn test_timeout_yields_single_result() {
        let rt = test_runtime();
        let stub = spawn_stub(rt.handle(), |_| StubReply::ok(GOOGLE_DNS_BODY).delayed(Duration::from_secs(10)));
        let service =
            GeoService::for_tests(&stub.endpoint, Duration::from_millis(300), rt.handle());
        let (tx, mut rx) = result_channel();

        let start = Instant::now();
        let handle = service.dispatch(LookupRequest::new("8.8.8.8"), tx);
        let results = drain(&mut rx, 1, Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            LookupResult::NetworkError { kind: NetworkErrorKind::Timeout, .. }
        ));

        // Nothing else arrives later
        std::thread::sleep(Duration::from_millis(900));
        assert!(rx.try_pop().is_none());
        assert!(handle.is_finished());
        assert_eq!(service.metrics().get_timeouts(), 1);
    }

    #[test]
    fn test_cancel_delivers_cancelled_result() {
        let rt = test_runtime();
        let stub = spawn_stub(rt.handle(), |_| StubReply::ok(GOOGLE_DNS_BODY).delayed(Duration::from_secs(10)));
        let service = GeoService::for_tests(&stub.endpoint, DEFAULT_TIMEOUT, rt.handle());
        let (tx, mut rx) = result_channel();

        let handle = service.dispatch(LookupRequest::new("8.8.8.8"), tx);
        std::thread::sleep(Duration::from_millis(100));
        handle.cancel();

        let results = drain(&mut rx, 1, Duration::from_secs(2));
        assert_eq!(
            results,
            vec![LookupResult::network("8.8.8.8", "Lookup cancelled", NetworkErrorKind::Cancelled)]
        );
        std::thread::sleep(Duration::from_millis(200));
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn test_concurrent_dispatches_each_deliver_once() {
        let rt = test_runtime();
        let stub = spawn_stub(rt.handle(), |_| StubReply::ok(GOOGLE_DNS_BODY).delayed(Duration::from_millis(50)));
        let service = GeoService::for_tests(&stub.endpoint, DEFAULT_TIMEOUT, rt.handle());
        let (tx, mut rx) = result_channel();

        for i in 1..=10 {
            service.dispatch(LookupRequest::new(format!("8.8.8.{}", i)), tx.clone());
        }

        let results = drain(&mut rx, 10, Duration::from_secs(5));
        let mut ips: Vec<String> = results.iter().map(|r| r.ip().to_string()).collect();
        ips.sort();
        ips.dedup();
        assert_eq!(ips.len(), 10);
        assert_eq!(stub.hits(), 10);
    }
}
