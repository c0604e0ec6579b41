//! Async ESI client pipeline with ETag revalidation, pluggable response caches, and verified
//! OAuth2 token refresh.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod http;
pub mod metrics;
pub mod response;
pub mod security;

mod client;
mod error;
mod _prelude {
	pub use std::{
		sync::Arc,
		time::{Duration, SystemTime},
	};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}
#[cfg(test)]
mod _test {
	use metrics_util as _;
	use testcontainers as _;
	use testcontainers_modules as _;
	use tracing_subscriber as _;
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	auth::{AccessCheck, Credential, ScopeMap, TokenClaims},
	cache::{CacheBackend, CacheStore},
	client::{Client, ClientBuilder},
	config::{CacheSettings, Configuration},
	error::{Error, Result},
	metrics::{ClientMetrics, ClientMetricsSnapshot},
	response::{EsiResponse, Provenance},
};
