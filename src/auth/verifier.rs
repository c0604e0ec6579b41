//! JWT verification against the identity provider's published key set.
//!
//! The key set is located through the authorization server metadata document, cached in memory,
//! and re-fetched when a token names a key id the cached set does not contain.

// std
use std::collections::BTreeSet;
// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey, Validation, decode, decode_header,
	jwk::{AlgorithmParameters, Jwk, JwkSet},
};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::RwLock;
use url::Url;
// self
use crate::{
	_prelude::*,
	auth::PUBLIC_SCOPE,
	config::Configuration,
	http::client::fetch_json,
	metrics::ClientMetrics,
	security,
};

/// Signature algorithms accepted for access tokens.
pub const ACCEPTED_ALGORITHMS: [Algorithm; 2] = [Algorithm::RS256, Algorithm::ES256];
/// Subject prefix used by the provider for character principals.
pub const SUBJECT_PREFIX: &str = "CHARACTER:EVE:";

/// Verified claim set of an access token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
	/// Expiry as seconds since the Unix epoch.
	pub exp: i64,
	/// Issuer.
	pub iss: String,
	/// Subject, `CHARACTER:EVE:<id>`.
	pub sub: String,
	/// Authorized party, the OAuth client id.
	#[serde(default)]
	pub azp: Option<String>,
	/// Character name.
	#[serde(default)]
	pub name: Option<String>,
	/// Owner hash of the character.
	#[serde(default)]
	pub owner: Option<String>,
	/// Granted scopes; the provider sends a bare string when only one is granted.
	#[serde(default, deserialize_with = "one_or_many")]
	pub scp: Vec<String>,
	/// Remaining claims.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}
impl TokenClaims {
	/// Expiry as a timestamp.
	pub fn expires_at(&self) -> Option<DateTime<Utc>> {
		DateTime::<Utc>::from_timestamp(self.exp, 0)
	}

	/// Character id encoded in the subject.
	pub fn character_id(&self) -> Option<u64> {
		self.sub.strip_prefix(SUBJECT_PREFIX).and_then(|id| id.parse().ok())
	}

	/// Granted scopes plus the implicit public scope.
	pub fn scope_set(&self) -> BTreeSet<String> {
		self.scp.iter().cloned().chain([PUBLIC_SCOPE.to_owned()]).collect()
	}
}

#[derive(Deserialize)]
struct ServerMetadata {
	jwks_uri: Url,
}

/// Validates access tokens issued by the configured identity provider.
#[derive(Debug)]
pub struct TokenVerifier {
	client: Client,
	discovery_url: Url,
	sso_host: String,
	issuers: Vec<String>,
	require_https: bool,
	timeout: Duration,
	max_response_bytes: u64,
	metrics: Arc<ClientMetrics>,
	keys: RwLock<Option<Arc<JwkSet>>>,
}
impl TokenVerifier {
	/// Build a verifier for the SSO provider described by `config`.
	pub fn new(
		client: Client,
		config: &Configuration,
		metrics: Arc<ClientMetrics>,
	) -> Result<Self> {
		Ok(Self {
			client,
			discovery_url: config.discovery_url()?,
			sso_host: config.sso_host.clone(),
			issuers: config.expected_issuers(),
			require_https: config.require_https,
			timeout: config.timeout,
			max_response_bytes: config.max_response_bytes,
			metrics,
			keys: RwLock::new(None),
		})
	}

	/// Seed the key cache, skipping discovery until an unknown key id shows up.
	pub async fn set_keys(&self, keys: JwkSet) {
		*self.keys.write().await = Some(Arc::new(keys));
	}

	/// Verify `token` for the OAuth client `client_id`, returning its claims.
	pub async fn verify(&self, token: &str, client_id: &str) -> Result<TokenClaims> {
		let header = decode_header(token).map_err(verification_error)?;

		if header.typ.as_deref() != Some("JWT") {
			return Err(Error::TokenVerification("Token header typ must be JWT.".into()));
		}
		if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
			return Err(Error::TokenVerification(format!(
				"Algorithm {:?} is not accepted.",
				header.alg
			)));
		}

		let jwk = self.resolve_key(header.kid.as_deref(), header.alg).await?;
		let key = DecodingKey::from_jwk(&jwk).map_err(verification_error)?;
		let mut validation = Validation::new(header.alg);

		validation.leeway = 0;
		validation.validate_aud = false;
		validation.set_issuer(&self.issuers);
		validation.set_required_spec_claims(&["exp", "iss", "sub"]);

		let claims = decode::<TokenClaims>(token, &key, &validation)
			.map_err(verification_error)?
			.claims;

		check_claims(&claims, client_id)?;

		tracing::debug!(sub = %claims.sub, exp = claims.exp, "token verified");

		Ok(claims)
	}

	async fn resolve_key(&self, kid: Option<&str>, alg: Algorithm) -> Result<Jwk> {
		let cached = self.keys.read().await.clone();

		if let Some(jwk) = cached.as_deref().and_then(|keys| select_key(keys, kid, alg)) {
			return Ok(jwk);
		}

		tracing::debug!(kid, "signing key not cached; fetching key set");

		let keys = self.fetch_keys().await?;

		*self.keys.write().await = Some(keys.clone());

		select_key(&keys, kid, alg).ok_or_else(|| {
			Error::TokenVerification(format!("No signing key matches kid {kid:?} and {alg:?}."))
		})
	}

	async fn fetch_keys(&self) -> Result<Arc<JwkSet>> {
		security::check_sso_url(&self.discovery_url, &self.sso_host, self.require_https)?;

		let metadata: ServerMetadata = self.fetch_document(&self.discovery_url).await?;

		security::check_sso_url(&metadata.jwks_uri, &self.sso_host, self.require_https)?;

		let keys: JwkSet = self.fetch_document(&metadata.jwks_uri).await?;

		Ok(Arc::new(keys))
	}

	async fn fetch_document<T>(&self, url: &Url) -> Result<T>
	where
		T: serde::de::DeserializeOwned,
	{
		fetch_json(&self.client, url, self.timeout, self.max_response_bytes, &self.metrics).await
	}
}

fn select_key(keys: &JwkSet, kid: Option<&str>, alg: Algorithm) -> Option<Jwk> {
	match kid {
		Some(kid) => keys.find(kid).filter(|jwk| key_supports(jwk, alg)).cloned(),
		None => keys.keys.iter().find(|jwk| key_supports(jwk, alg)).cloned(),
	}
}

fn key_supports(jwk: &Jwk, alg: Algorithm) -> bool {
	match &jwk.algorithm {
		AlgorithmParameters::RSA(_) => alg == Algorithm::RS256,
		AlgorithmParameters::EllipticCurve(_) => alg == Algorithm::ES256,
		_ => false,
	}
}

fn check_claims(claims: &TokenClaims, client_id: &str) -> Result<()> {
	if claims.character_id().is_none() {
		return Err(Error::TokenVerification(format!(
			"Subject '{}' does not follow the {SUBJECT_PREFIX}<id> convention.",
			claims.sub
		)));
	}
	if claims.azp.as_deref() != Some(client_id) {
		return Err(Error::TokenVerification(
			"Authorized party does not match the client id.".into(),
		));
	}
	if claims.name.as_deref().is_none_or(str::is_empty) {
		return Err(Error::TokenVerification("Claim 'name' is missing.".into()));
	}
	if claims.owner.as_deref().is_none_or(str::is_empty) {
		return Err(Error::TokenVerification("Claim 'owner' is missing.".into()));
	}

	Ok(())
}

fn verification_error(err: jsonwebtoken::errors::Error) -> Error {
	Error::TokenVerification(err.to_string())
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum OneOrMany {
		One(String),
		Many(Vec<String>),
	}

	Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
		Some(OneOrMany::One(scope)) => vec![scope],
		Some(OneOrMany::Many(scopes)) => scopes,
		None => Vec::new(),
	})
}
