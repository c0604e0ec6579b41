//! Client configuration and validation.
//!
//! A [`Configuration`] is an explicit value handed to [`Client`](crate::Client) at construction;
//! nothing in the crate reads process-wide settings.

// std
use std::path::PathBuf;
// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::_prelude::*;

/// Default ESI datasource.
pub const DEFAULT_DATASOURCE: &str = "tranquility";
/// Default API version prefix.
pub const DEFAULT_VERSION: &str = "/latest";
/// Default per-call network timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default lead time before token expiry that triggers a refresh.
pub const DEFAULT_TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Default size cap for identity-provider documents (1 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 1_048_576;
/// Minimum accepted network timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Response cache backend selection, resolved once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheSettings {
	/// Caching disabled; every lookup misses and writes are discarded.
	None,
	/// In-process map, lost on restart.
	#[default]
	Memory,
	/// One JSON file per cache key below `path`.
	File {
		/// Directory holding cache entries.
		path: PathBuf,
	},
	/// Redis server reachable at `url`, keys namespaced by `prefix`.
	Redis {
		/// Connection URL, e.g. `redis://127.0.0.1/`.
		url: String,
		/// Key namespace.
		#[serde(default = "default_redis_prefix")]
		prefix: String,
	},
}

/// Static settings for the API host, the SSO provider, and the response cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Configuration {
	/// Datasource appended to every API call.
	#[serde(default = "default_datasource")]
	pub datasource: String,
	/// Scheme of the API host.
	#[serde(default = "default_https")]
	pub esi_scheme: String,
	/// API host name.
	#[serde(default = "default_esi_host")]
	pub esi_host: String,
	/// API port.
	#[serde(default = "default_port")]
	pub esi_port: u16,
	/// Version prefix used until a client overrides it.
	#[serde(default = "default_version")]
	pub default_version: String,
	/// Scheme of the SSO host.
	#[serde(default = "default_https")]
	pub sso_scheme: String,
	/// SSO host name; also the expected token issuer.
	#[serde(default = "default_sso_host")]
	pub sso_host: String,
	/// SSO port.
	#[serde(default = "default_port")]
	pub sso_port: u16,
	/// Path of the token endpoint on the SSO host.
	#[serde(default = "default_sso_token_path")]
	pub sso_token_path: String,
	/// Path of the authorization server metadata document on the SSO host.
	#[serde(default = "default_sso_discovery_path")]
	pub sso_discovery_path: String,
	/// Caller-supplied suffix of the `User-Agent` header.
	#[serde(default = "default_http_user_agent")]
	pub http_user_agent: String,
	/// Timeout applied to each network call.
	#[serde(default = "default_timeout")]
	pub timeout: Duration,
	/// Lead time before token expiry at which a refresh is performed.
	#[serde(default = "default_token_refresh_margin")]
	pub token_refresh_margin: Duration,
	/// Largest discovery or key set document accepted, in bytes.
	#[serde(default = "default_max_response_bytes")]
	pub max_response_bytes: u64,
	/// Whether SSO, discovery, and key set URLs must use HTTPS.
	#[serde(default = "default_true")]
	pub require_https: bool,
	/// Response cache backend.
	#[serde(default)]
	pub cache: CacheSettings,
}
impl Configuration {
	/// Point API calls at a different base URL (scheme, host, and port).
	pub fn with_esi_base(mut self, base: &Url) -> Self {
		self.esi_scheme = base.scheme().into();
		self.esi_host = base.host_str().unwrap_or_default().into();
		self.esi_port = base.port_or_known_default().unwrap_or(443);

		self
	}

	/// Point SSO calls at a different base URL (scheme, host, and port).
	pub fn with_sso_base(mut self, base: &Url) -> Self {
		self.sso_scheme = base.scheme().into();
		self.sso_host = base.host_str().unwrap_or_default().into();
		self.sso_port = base.port_or_known_default().unwrap_or(443);

		self
	}

	/// Override the datasource.
	pub fn with_datasource(mut self, datasource: impl Into<String>) -> Self {
		self.datasource = datasource.into();

		self
	}

	/// Override the `User-Agent` suffix.
	pub fn with_http_user_agent(mut self, agent: impl Into<String>) -> Self {
		self.http_user_agent = agent.into();

		self
	}

	/// Override the per-call network timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Set HTTPS requirement to the desired value.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Select the cache backend.
	pub fn with_cache(mut self, cache: CacheSettings) -> Self {
		self.cache = cache;

		self
	}

	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		non_empty("datasource", &self.datasource)?;
		non_empty("esi_scheme", &self.esi_scheme)?;
		non_empty("esi_host", &self.esi_host)?;
		non_empty("sso_scheme", &self.sso_scheme)?;
		non_empty("sso_host", &self.sso_host)?;
		non_empty("http_user_agent", &self.http_user_agent)?;

		if self.esi_port == 0 {
			return Err(Error::Validation {
				field: "esi_port",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.sso_port == 0 {
			return Err(Error::Validation {
				field: "sso_port",
				reason: "Must be greater than zero.".into(),
			});
		}
		if !self.default_version.starts_with('/') {
			return Err(Error::Validation {
				field: "default_version",
				reason: "Must start with '/'.".into(),
			});
		}
		if !self.sso_token_path.starts_with('/') {
			return Err(Error::Validation {
				field: "sso_token_path",
				reason: "Must start with '/'.".into(),
			});
		}
		if !self.sso_discovery_path.starts_with('/') {
			return Err(Error::Validation {
				field: "sso_discovery_path",
				reason: "Must start with '/'.".into(),
			});
		}
		if self.timeout < MIN_TIMEOUT {
			return Err(Error::Validation {
				field: "timeout",
				reason: format!("Must be at least {MIN_TIMEOUT:?}."),
			});
		}
		if self.max_response_bytes == 0 {
			return Err(Error::Validation {
				field: "max_response_bytes",
				reason: "Must be greater than zero.".into(),
			});
		}

		if let CacheSettings::Redis { url, .. } = &self.cache {
			non_empty("cache.url", url)?;
		}

		self.token_url()?;
		self.discovery_url()?;

		Ok(())
	}

	/// Base URL of the API, without version or path.
	pub fn esi_base(&self) -> String {
		format!("{}://{}:{}", self.esi_scheme, self.esi_host, self.esi_port)
	}

	/// Base URL of the SSO provider.
	pub fn sso_base(&self) -> String {
		format!("{}://{}:{}", self.sso_scheme, self.sso_host, self.sso_port)
	}

	/// Token endpoint URL.
	pub fn token_url(&self) -> Result<Url> {
		Ok(Url::parse(&format!("{}{}", self.sso_base(), self.sso_token_path))?)
	}

	/// Authorization server metadata URL.
	pub fn discovery_url(&self) -> Result<Url> {
		Ok(Url::parse(&format!("{}{}", self.sso_base(), self.sso_discovery_path))?)
	}

	/// Full `User-Agent` header value.
	pub fn user_agent(&self) -> String {
		format!("esi-client/{}/{}", env!("CARGO_PKG_VERSION"), self.http_user_agent)
	}

	/// Issuer values accepted in token claims.
	pub fn expected_issuers(&self) -> Vec<String> {
		vec![self.sso_host.clone(), format!("{}://{}", self.sso_scheme, self.sso_host)]
	}
}
impl Default for Configuration {
	fn default() -> Self {
		Self {
			datasource: default_datasource(),
			esi_scheme: default_https(),
			esi_host: default_esi_host(),
			esi_port: default_port(),
			default_version: default_version(),
			sso_scheme: default_https(),
			sso_host: default_sso_host(),
			sso_port: default_port(),
			sso_token_path: default_sso_token_path(),
			sso_discovery_path: default_sso_discovery_path(),
			http_user_agent: default_http_user_agent(),
			timeout: DEFAULT_TIMEOUT,
			token_refresh_margin: DEFAULT_TOKEN_REFRESH_MARGIN,
			max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
			require_https: true,
			cache: CacheSettings::default(),
		}
	}
}

fn non_empty(field: &'static str, value: &str) -> Result<()> {
	if value.trim().is_empty() {
		Err(Error::Validation { field, reason: "Must not be empty.".into() })
	} else {
		Ok(())
	}
}

fn default_datasource() -> String {
	DEFAULT_DATASOURCE.into()
}

fn default_https() -> String {
	"https".into()
}

fn default_esi_host() -> String {
	"esi.evetech.net".into()
}

fn default_sso_host() -> String {
	"login.eveonline.com".into()
}

fn default_port() -> u16 {
	443
}

fn default_version() -> String {
	DEFAULT_VERSION.into()
}

fn default_sso_token_path() -> String {
	"/v2/oauth/token".into()
}

fn default_sso_discovery_path() -> String {
	"/.well-known/oauth-authorization-server".into()
}

fn default_http_user_agent() -> String {
	"esi-client default agent".into()
}

fn default_timeout() -> Duration {
	DEFAULT_TIMEOUT
}

fn default_token_refresh_margin() -> Duration {
	DEFAULT_TOKEN_REFRESH_MARGIN
}

fn default_max_response_bytes() -> u64 {
	DEFAULT_MAX_RESPONSE_BYTES
}

fn default_true() -> bool {
	true
}

fn default_redis_prefix() -> String {
	"esi-client".into()
}
