//! Client telemetry: in-process counters plus optional `metrics` facade emission.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
#[cfg(feature = "metrics")] use ::metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "metrics")] use smallvec::SmallVec;
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")]
type LabelSet = SmallVec<[Label; 2]>;

#[cfg(feature = "metrics")]
const METRIC_CACHE_LOOKUPS_TOTAL: &str = "esi_client_cache_lookups_total";
#[cfg(feature = "metrics")]
const METRIC_REQUESTS_TOTAL: &str = "esi_client_requests_total";
#[cfg(feature = "metrics")]
const METRIC_REQUEST_DURATION: &str = "esi_client_request_duration_seconds";
#[cfg(feature = "metrics")]
const METRIC_TOKEN_REFRESH_TOTAL: &str = "esi_client_token_refresh_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Outcome of a cache lookup made by the request pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOutcome {
	/// A fresh entry answered the call.
	Hit,
	/// No usable entry; the call went to the network.
	Miss,
	/// An expired entry was confirmed by a `304 Not Modified`.
	Revalidated,
}
impl CacheOutcome {
	/// Label value used in exported metrics.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Hit => "hit",
			Self::Miss => "miss",
			Self::Revalidated => "revalidated",
		}
	}
}

/// Thread-safe counters shared by every clone of a client.
#[derive(Debug, Default)]
pub struct ClientMetrics {
	requests: AtomicU64,
	cache_hits: AtomicU64,
	cache_misses: AtomicU64,
	revalidations: AtomicU64,
	token_refreshes: AtomicU64,
	token_refresh_errors: AtomicU64,
	last_request_micros: AtomicU64,
}
impl ClientMetrics {
	/// Create a new accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record the outcome of a cache lookup.
	pub fn record_cache(&self, outcome: CacheOutcome) {
		let counter = match outcome {
			CacheOutcome::Hit => &self.cache_hits,
			CacheOutcome::Miss => &self.cache_misses,
			CacheOutcome::Revalidated => &self.revalidations,
		};

		counter.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		record_cache_lookup(outcome);
	}

	/// Record a completed network exchange.
	pub fn record_request(&self, method: &http::Method, status: u16, elapsed: Duration) {
		self.requests.fetch_add(1, Ordering::Relaxed);
		self.last_request_micros.store(elapsed.as_micros() as u64, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		record_request(method, status, elapsed);
		#[cfg(not(feature = "metrics"))]
		let _ = (method, status);
	}

	/// Record a token refresh exchange.
	pub fn record_token_refresh(&self, success: bool) {
		if success {
			self.token_refreshes.fetch_add(1, Ordering::Relaxed);
		} else {
			self.token_refresh_errors.fetch_add(1, Ordering::Relaxed);
		}

		#[cfg(feature = "metrics")]
		record_token_refresh(success);
	}

	/// Take a point-in-time snapshot.
	pub fn snapshot(&self) -> ClientMetricsSnapshot {
		ClientMetricsSnapshot {
			requests: self.requests.load(Ordering::Relaxed),
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			cache_misses: self.cache_misses.load(Ordering::Relaxed),
			revalidations: self.revalidations.load(Ordering::Relaxed),
			token_refreshes: self.token_refreshes.load(Ordering::Relaxed),
			token_refresh_errors: self.token_refresh_errors.load(Ordering::Relaxed),
			last_request_micros: match self.last_request_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only view of [`ClientMetrics`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientMetricsSnapshot {
	/// Network exchanges performed, including token refreshes.
	pub requests: u64,
	/// Calls answered from a fresh cache entry.
	pub cache_hits: u64,
	/// Cacheable calls that found no usable entry.
	pub cache_misses: u64,
	/// Expired entries confirmed by `304 Not Modified`.
	pub revalidations: u64,
	/// Successful token refreshes.
	pub token_refreshes: u64,
	/// Failed token refreshes.
	pub token_refresh_errors: u64,
	/// Latency of the most recent exchange in microseconds.
	pub last_request_micros: Option<u64>,
}
impl ClientMetricsSnapshot {
	/// Share of cacheable calls answered without downloading a body.
	pub fn hit_rate(&self) -> f64 {
		let lookups = self.cache_hits + self.cache_misses + self.revalidations;

		if lookups == 0 {
			0.0
		} else {
			(self.cache_hits + self.revalidations) as f64 / lookups as f64
		}
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Subsequent calls are no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Global Prometheus handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

#[cfg(feature = "metrics")]
fn record_cache_lookup(outcome: CacheOutcome) {
	let mut labels = LabelSet::new();

	labels.push(Label::new("outcome", outcome.as_str()));

	::metrics::counter!(METRIC_CACHE_LOOKUPS_TOTAL, labels.iter()).increment(1);
}

#[cfg(feature = "metrics")]
fn record_request(method: &http::Method, status: u16, elapsed: Duration) {
	let mut labels = LabelSet::new();

	labels.push(Label::new("method", method.as_str().to_owned()));
	::metrics::histogram!(METRIC_REQUEST_DURATION, labels.iter()).record(elapsed.as_secs_f64());
	labels.push(Label::new("status", status.to_string()));
	::metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);
}

#[cfg(feature = "metrics")]
fn record_token_refresh(success: bool) {
	let mut labels = LabelSet::new();

	labels.push(Label::new("status", if success { "success" } else { "error" }));

	::metrics::counter!(METRIC_TOKEN_REFRESH_TOTAL, labels.iter()).increment(1);
}


#[cfg(all(test, feature = "metrics"))]
mod facade_tests {
	// std
	use std::borrow::Borrow;
	// crates.io
	use metrics_util::{
		CompositeKey, MetricKind,
		debugging::{DebugValue, DebuggingRecorder},
	};
	// self
	use super::*;

	fn capture_metrics<F>(f: F) -> Vec<(CompositeKey, DebugValue)>
	where
		F: FnOnce(),
	{
		let recorder = DebuggingRecorder::new();
		let snapshotter = recorder.snapshotter();

		::metrics::with_local_recorder(&recorder, f);

		snapshotter
			.snapshot()
			.into_vec()
			.into_iter()
			.map(|(key, _, _, value)| (key, value))
			.collect()
	}

	fn find<'a>(
		snapshot: &'a [(CompositeKey, DebugValue)],
		kind: MetricKind,
		name: &str,
		labels: &[(&str, &str)],
	) -> Option<&'a DebugValue> {
		snapshot.iter().find_map(|(key, value)| {
			let mut actual: Vec<_> =
				key.key().labels().map(|label| (label.key(), label.value())).collect();
			let mut expected = labels.to_vec();

			actual.sort_unstable();
			expected.sort_unstable();

			(key.kind() == kind
				&& Borrow::<str>::borrow(key.key().name()) == name
				&& actual == expected)
				.then_some(value)
		})
	}

	fn counter(
		snapshot: &[(CompositeKey, DebugValue)],
		name: &str,
		labels: &[(&str, &str)],
	) -> u64 {
		match find(snapshot, MetricKind::Counter, name, labels) {
			Some(DebugValue::Counter(value)) => *value,
			_ => 0,
		}
	}

	#[test]
	fn emits_cache_and_refresh_counters() {
		let snapshot = capture_metrics(|| {
			let metrics = ClientMetrics::new();

			metrics.record_cache(CacheOutcome::Hit);
			metrics.record_cache(CacheOutcome::Hit);
			metrics.record_cache(CacheOutcome::Miss);
			metrics.record_token_refresh(false);
		});

		assert_eq!(counter(&snapshot, METRIC_CACHE_LOOKUPS_TOTAL, &[("outcome", "hit")]), 2);
		assert_eq!(counter(&snapshot, METRIC_CACHE_LOOKUPS_TOTAL, &[("outcome", "miss")]), 1);
		assert_eq!(counter(&snapshot, METRIC_TOKEN_REFRESH_TOTAL, &[("status", "error")]), 1);
	}

	#[test]
	#[cfg_attr(miri, ignore)]
	fn emits_request_counter_and_latency() {
		let snapshot = capture_metrics(|| {
			ClientMetrics::new().record_request(&http::Method::GET, 304, Duration::from_millis(20));
		});

		assert_eq!(
			counter(&snapshot, METRIC_REQUESTS_TOTAL, &[("method", "GET"), ("status", "304")]),
			1
		);

		let Some(DebugValue::Histogram(values)) =
			find(&snapshot, MetricKind::Histogram, METRIC_REQUEST_DURATION, &[("method", "GET")])
		else {
			panic!("request duration not recorded");
		};
		let duration = values.last().map(|v| v.into_inner()).expect("histogram sample");

		assert!((duration - 0.020).abs() < 1e-6, "expected ~20ms histogram, got {duration}");
	}
}
