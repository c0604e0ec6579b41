//! Request pipeline: authorize, build the URI, consult the cache, fetch, and store.

// std
use std::{
	collections::{BTreeMap, BTreeSet},
	mem,
};
// crates.io
use http::{
	Method, StatusCode,
	header::{ACCEPT, CONTENT_TYPE, IF_NONE_MATCH, USER_AGENT},
};
use reqwest::redirect::Policy;
use serde::Serialize;
use serde_json::Value;
use url::Url;
// self
use crate::{
	_prelude::*,
	auth::{AccessCheck, Credential, ScopeMap, TokenManager},
	cache::CacheStore,
	config::Configuration,
	http::{client::execute, uri},
	metrics::{CacheOutcome, ClientMetrics},
	response::EsiResponse,
};

/// Maximum redirect depth followed by the default transport.
pub const MAX_REDIRECTS: usize = 10;
/// Connect timeout of the default transport.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Query parameter selecting a page of a paginated resource.
pub const PAGE_PARAMETER: &str = "page";

#[derive(Debug)]
struct Shared {
	config: Arc<Configuration>,
	http: reqwest::Client,
	cache: CacheStore,
	tokens: TokenManager,
	access: Arc<dyn AccessCheck>,
	metrics: Arc<ClientMetrics>,
}

#[derive(Clone, Debug, Default)]
struct Pending {
	query: BTreeMap<String, String>,
	body: Option<Value>,
}

enum Lookup {
	Served(EsiResponse),
	Fetched(EsiResponse),
	Miss,
}

/// Handle to the API.
///
/// Clones share the transport, cache, token state, and metrics. The pending query string, body,
/// and API version belong to each handle and the query string and body are cleared by every
/// call.
#[derive(Clone, Debug)]
pub struct Client {
	shared: Arc<Shared>,
	pending: Pending,
	version: String,
}
impl Client {
	/// Build a client with default transport, cache, and access checks.
	pub fn new(config: Configuration) -> Result<Self> {
		Self::builder(config).build()
	}

	/// Start building a client.
	pub fn builder(config: Configuration) -> ClientBuilder {
		ClientBuilder::new(config)
	}

	/// Call `method` on the endpoint `uri`, substituting `{name}` placeholders from `uri_data`.
	pub async fn invoke(
		&mut self,
		method: Method,
		uri: &str,
		uri_data: &[(&str, &str)],
	) -> Result<EsiResponse> {
		let pending = mem::take(&mut self.pending);
		let shared = self.shared.clone();
		let scopes = shared.tokens.scopes().await?;

		if !shared.access.can(&method, uri, &scopes) {
			let query = uri::query(&shared.config, &pending.query);
			let built = uri::path(&self.version, uri, uri_data)
				.and_then(|path| uri::build(&shared.config, &path, &query))
				.map(|url| url.to_string())
				.unwrap_or_else(|_| uri.to_owned());

			tracing::warn!(method = %method, uri = %built, "access denied");

			return Err(Error::AccessDenied { method, uri: built });
		}

		let path = uri::path(&self.version, uri, uri_data)?;
		let query = uri::query(&shared.config, &pending.query);
		let url = uri::build(&shared.config, &path, &query)?;
		let cacheable = method == Method::GET;

		if cacheable {
			match shared.lookup(&path, &query, &url).await? {
				Lookup::Served(response) => return Ok(response),
				Lookup::Fetched(response) =>
					return Ok(shared.store(&path, &query, response).await),
				Lookup::Miss => {},
			}
		}

		let response = shared.fetch(&method, &url, pending.body.as_ref(), None).await?;

		if cacheable {
			return Ok(shared.store(&path, &query, response).await);
		}

		Ok(response)
	}

	/// `GET` shortcut for [`invoke`](Self::invoke).
	pub async fn get(&mut self, uri: &str, uri_data: &[(&str, &str)]) -> Result<EsiResponse> {
		self.invoke(Method::GET, uri, uri_data).await
	}

	/// `POST` shortcut for [`invoke`](Self::invoke).
	pub async fn post(&mut self, uri: &str, uri_data: &[(&str, &str)]) -> Result<EsiResponse> {
		self.invoke(Method::POST, uri, uri_data).await
	}

	/// `PUT` shortcut for [`invoke`](Self::invoke).
	pub async fn put(&mut self, uri: &str, uri_data: &[(&str, &str)]) -> Result<EsiResponse> {
		self.invoke(Method::PUT, uri, uri_data).await
	}

	/// `DELETE` shortcut for [`invoke`](Self::invoke).
	pub async fn delete(&mut self, uri: &str, uri_data: &[(&str, &str)]) -> Result<EsiResponse> {
		self.invoke(Method::DELETE, uri, uri_data).await
	}

	/// Add query parameters to the next call.
	pub fn set_query_string<I, K, V>(&mut self, params: I) -> &mut Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.pending
			.query
			.extend(params.into_iter().map(|(key, value)| (key.into(), value.into())));

		self
	}

	/// JSON body of the next call.
	pub fn set_body<T>(&mut self, body: &T) -> Result<&mut Self>
	where
		T: ?Sized + Serialize,
	{
		self.pending.body = Some(serde_json::to_value(body)?);

		Ok(self)
	}

	/// Request page `page` of a paginated resource on the next call.
	pub fn page(&mut self, page: u32) -> &mut Self {
		self.set_query_string([(PAGE_PARAMETER, page.to_string())])
	}

	/// Switch the API version prefix, e.g. `/v4` or `latest`.
	pub fn set_version(&mut self, version: impl Into<String>) -> &mut Self {
		let version = version.into();

		self.version = if version.starts_with('/') { version } else { format!("/{version}") };

		self
	}

	/// API version prefix used by this handle.
	pub fn version(&self) -> &str {
		&self.version
	}

	/// Install a credential record.
	pub async fn set_credential(&self, credential: Credential) -> Result<()> {
		self.shared.tokens.set_credential(credential).await
	}

	/// Swap in a new refresh token for the current client identity.
	pub async fn set_refresh_token(&self, refresh_token: impl Into<String>) -> Result<()> {
		self.shared.tokens.set_refresh_token(refresh_token).await
	}

	/// Scopes held by the current credential, `{"public"}` when anonymous.
	pub async fn authentication_scopes(&self) -> Result<BTreeSet<String>> {
		self.shared.tokens.scopes().await
	}

	/// Token lifecycle manager.
	pub fn tokens(&self) -> &TokenManager {
		&self.shared.tokens
	}

	/// Response cache.
	pub fn cache(&self) -> &CacheStore {
		&self.shared.cache
	}

	/// Configuration the client was built with.
	pub fn config(&self) -> &Configuration {
		&self.shared.config
	}

	/// Shared telemetry counters.
	pub fn metrics(&self) -> &Arc<ClientMetrics> {
		&self.shared.metrics
	}
}

impl Shared {
	async fn lookup(&self, path: &str, query: &str, url: &Url) -> Result<Lookup> {
		let Some(mut cached) = self.cache.get(path, query).await else {
			tracing::debug!(url = %url, "cache miss");
			self.metrics.record_cache(CacheOutcome::Miss);

			return Ok(Lookup::Miss);
		};

		if !cached.expired() {
			tracing::debug!(url = %url, "cache hit");
			self.metrics.record_cache(CacheOutcome::Hit);
			cached.mark_cached_load();

			return Ok(Lookup::Served(cached));
		}

		let Some(etag) = cached.etag().map(str::to_owned) else {
			self.metrics.record_cache(CacheOutcome::Miss);

			return Ok(Lookup::Miss);
		};
		let revalidation = self.fetch(&Method::GET, url, None, Some(&etag)).await?;

		if revalidation.status() != StatusCode::NOT_MODIFIED.as_u16() {
			tracing::debug!(url = %url, status = revalidation.status(), "cache entry superseded");
			self.metrics.record_cache(CacheOutcome::Miss);

			return Ok(Lookup::Fetched(revalidation));
		}

		cached.set_expires(revalidation.expires());
		self.cache.set(path, query, &cached).await;
		cached.mark_cached_load();

		tracing::debug!(url = %url, expires = %cached.expires(), "cache entry revalidated");
		self.metrics.record_cache(CacheOutcome::Revalidated);

		Ok(Lookup::Served(cached))
	}

	async fn store(&self, path: &str, query: &str, response: EsiResponse) -> EsiResponse {
		if !response.expired() {
			self.cache.set(path, query, &response).await;
		}

		response
	}

	async fn fetch(
		&self,
		method: &Method,
		url: &Url,
		body: Option<&Value>,
		etag: Option<&str>,
	) -> Result<EsiResponse> {
		let mut request = self
			.http
			.request(method.clone(), url.clone())
			.header(ACCEPT, "application/json")
			.header(CONTENT_TYPE, "application/json")
			.header(USER_AGENT, self.config.user_agent())
			.timeout(self.config.timeout);

		if let Some(token) = self.tokens.bearer().await? {
			request = request.bearer_auth(token);
		}
		if let Some(etag) = etag {
			request = request.header(IF_NONE_MATCH, etag);
		}
		if let Some(body) = body
			&& !is_empty_body(body)
		{
			request = request.body(serde_json::to_vec(body)?);
		}

		execute(&self.http, request.build()?, &self.metrics).await
	}
}

/// Builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
	config: Configuration,
	credential: Option<Credential>,
	cache: Option<CacheStore>,
	access: Option<Arc<dyn AccessCheck>>,
	http: Option<reqwest::Client>,
}
impl ClientBuilder {
	/// Start from a configuration.
	pub fn new(config: Configuration) -> Self {
		Self { config, credential: None, cache: None, access: None, http: None }
	}

	/// Authenticate calls with `credential`.
	pub fn credential(mut self, credential: Credential) -> Self {
		self.credential = Some(credential);

		self
	}

	/// Use `cache` instead of the backend named in the configuration.
	pub fn cache(mut self, cache: CacheStore) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Replace the default [`ScopeMap`] access check.
	pub fn access_check<A>(mut self, access: A) -> Self
	where
		A: 'static + AccessCheck,
	{
		self.access = Some(Arc::new(access));

		self
	}

	/// Use a preconfigured transport (primarily for tests).
	pub fn http_client(mut self, http: reqwest::Client) -> Self {
		self.http = Some(http);

		self
	}

	/// Validate the configuration and assemble the client.
	pub fn build(self) -> Result<Client> {
		self.config.validate()?;

		let http = match self.http {
			Some(http) => http,
			None => reqwest::Client::builder()
				.redirect(Policy::limited(MAX_REDIRECTS))
				.connect_timeout(CONNECT_TIMEOUT.min(self.config.timeout))
				.build()?,
		};
		let cache = match self.cache {
			Some(cache) => cache,
			None => CacheStore::from_settings(&self.config.cache)?,
		};
		let authenticated = self.credential.is_some();
		let config = Arc::new(self.config);
		let metrics = ClientMetrics::new();
		let tokens =
			TokenManager::new(config.clone(), http.clone(), metrics.clone(), self.credential)?;
		let access = self.access.unwrap_or_else(|| Arc::new(ScopeMap::new()));
		let version = config.default_version.clone();

		tracing::debug!(
			esi = %config.esi_base(),
			sso = %config.sso_base(),
			authenticated,
			"client built"
		);

		Ok(Client {
			shared: Arc::new(Shared { config, http, cache, tokens, access, metrics }),
			pending: Pending::default(),
			version,
		})
	}
}

fn is_empty_body(body: &Value) -> bool {
	match body {
		Value::Null => true,
		Value::String(value) => value.is_empty(),
		Value::Array(values) => values.is_empty(),
		Value::Object(map) => map.is_empty(),
		_ => false,
	}
}
