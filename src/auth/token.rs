//! Access-token lifecycle: expiry checks, refresh exchanges, and scope population.
//!
//! Every read-check-refresh sequence runs under one async mutex, so concurrent callers sharing a
//! manager never spend the same refresh token twice.

// std
use std::collections::BTreeSet;
// crates.io
use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{Credential, PUBLIC_SCOPE, TokenVerifier},
	config::Configuration,
	http::client::execute,
	metrics::ClientMetrics,
	security,
};

#[derive(Deserialize)]
struct TokenGrant {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
}

/// Owns the credential record and keeps its access token fresh.
#[derive(Debug)]
pub struct TokenManager {
	config: Arc<Configuration>,
	client: Client,
	verifier: TokenVerifier,
	metrics: Arc<ClientMetrics>,
	credential: Mutex<Option<Credential>>,
}
impl TokenManager {
	/// Create a manager, rejecting a credential that fails shape validation.
	pub fn new(
		config: Arc<Configuration>,
		client: Client,
		metrics: Arc<ClientMetrics>,
		credential: Option<Credential>,
	) -> Result<Self> {
		if let Some(credential) = &credential {
			credential.validate()?;
		}

		let verifier = TokenVerifier::new(client.clone(), &config, metrics.clone())?;

		Ok(Self { config, client, verifier, metrics, credential: Mutex::new(credential) })
	}

	/// Verifier used for refreshed tokens.
	pub fn verifier(&self) -> &TokenVerifier {
		&self.verifier
	}

	/// Whether a credential record is installed.
	pub async fn has_credential(&self) -> bool {
		self.credential.lock().await.is_some()
	}

	/// Snapshot of the current credential record.
	pub async fn credential(&self) -> Option<Credential> {
		self.credential.lock().await.clone()
	}

	/// Replace the credential record.
	pub async fn set_credential(&self, credential: Credential) -> Result<()> {
		credential.validate()?;

		*self.credential.lock().await = Some(credential);

		Ok(())
	}

	/// Swap in a new refresh token, discarding the current access token and scopes.
	///
	/// The next authenticated call performs a refresh with the new token.
	pub async fn set_refresh_token(&self, refresh_token: impl Into<String>) -> Result<()> {
		let mut slot = self.credential.lock().await;
		let current = slot.as_ref().ok_or(Error::AuthenticationMissing)?;
		let replacement =
			Credential::new(current.client_id(), current.client_secret(), refresh_token);

		replacement.validate()?;

		*slot = Some(replacement);

		Ok(())
	}

	/// Current access token, refreshed first when it expires within the configured margin.
	pub async fn valid_token(&self) -> Result<String> {
		let mut slot = self.credential.lock().await;
		let credential = slot.as_ref().ok_or(Error::AuthenticationMissing)?;

		if !credential.needs_refresh(Utc::now(), self.config.token_refresh_margin) {
			return Ok(credential.access_token().to_owned());
		}

		let refreshed = self.exchange(credential).await?;
		let token = refreshed.access_token().to_owned();

		*slot = Some(refreshed);

		Ok(token)
	}

	/// Bearer token for an outgoing call, `None` when no credential is installed.
	pub async fn bearer(&self) -> Result<Option<String>> {
		match self.valid_token().await {
			Ok(token) => Ok(Some(token)),
			Err(Error::AuthenticationMissing) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Refresh unconditionally.
	pub async fn refresh(&self) -> Result<()> {
		let mut slot = self.credential.lock().await;
		let credential = slot.as_ref().ok_or(Error::AuthenticationMissing)?;
		let refreshed = self.exchange(credential).await?;

		*slot = Some(refreshed);

		Ok(())
	}

	/// Scopes granted to the current credential, `{"public"}` without one.
	///
	/// The first call after a credential is installed verifies the access token (refreshing it
	/// first when due) to learn the granted scopes.
	pub async fn scopes(&self) -> Result<BTreeSet<String>> {
		let mut slot = self.credential.lock().await;
		let Some(credential) = slot.as_ref() else {
			return Ok(BTreeSet::from([PUBLIC_SCOPE.to_owned()]));
		};

		if !credential.scopes().is_empty() {
			return Ok(credential.scopes().clone());
		}

		let populated = if credential.needs_refresh(Utc::now(), self.config.token_refresh_margin)
		{
			self.exchange(credential).await?
		} else {
			let claims =
				self.verifier.verify(credential.access_token(), credential.client_id()).await?;

			credential.with_populated_scopes(claims.scope_set())
		};
		let scopes = populated.scopes().clone();

		*slot = Some(populated);

		Ok(scopes)
	}

	async fn exchange(&self, credential: &Credential) -> Result<Credential> {
		let result = self.perform_exchange(credential).await;

		self.metrics.record_token_refresh(result.is_ok());

		if let Err(e) = &result {
			tracing::warn!(client_id = credential.client_id(), error = %e, "token refresh failed");
		}

		result
	}

	async fn perform_exchange(&self, credential: &Credential) -> Result<Credential> {
		let url = self.config.token_url()?;

		security::check_sso_url(&url, &self.config.sso_host, self.config.require_https)?;

		let basic = BASE64_STANDARD
			.encode(format!("{}:{}", credential.client_id(), credential.client_secret()));
		let form = form_urlencoded::Serializer::new(String::new())
			.append_pair("grant_type", "refresh_token")
			.append_pair("refresh_token", credential.refresh_token())
			.finish();
		let request = self
			.client
			.post(url)
			.header(AUTHORIZATION, format!("Basic {basic}"))
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json")
			.header(USER_AGENT, self.config.user_agent())
			.timeout(self.config.timeout)
			.body(form)
			.build()?;
		let response = execute(&self.client, request, &self.metrics).await?;
		let grant = response.json::<TokenGrant>()?;
		let claims = self.verifier.verify(&grant.access_token, credential.client_id()).await?;
		let token_expires = claims.expires_at().ok_or_else(|| {
			Error::TokenVerification(format!("Claim 'exp' is out of range: {}.", claims.exp))
		})?;
		let refresh_token =
			grant.refresh_token.unwrap_or_else(|| credential.refresh_token().to_owned());

		tracing::debug!(
			client_id = credential.client_id(),
			sub = %claims.sub,
			expires = %token_expires,
			"access token refreshed"
		);

		Ok(credential.rotated(grant.access_token, refresh_token, token_expires, claims.scope_set()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn manager(credential: Option<Credential>) -> Result<TokenManager> {
		TokenManager::new(
			Arc::new(Configuration::default()),
			Client::new(),
			ClientMetrics::new(),
			credential,
		)
	}

	#[tokio::test]
	async fn anonymous_managers_expose_public_scope_only() {
		let manager = manager(None).expect("manager");

		assert!(!manager.has_credential().await);
		assert_eq!(manager.scopes().await.expect("scopes"), BTreeSet::from(["public".to_owned()]));
		assert_eq!(manager.bearer().await.expect("bearer"), None);
		assert!(matches!(manager.valid_token().await, Err(Error::AuthenticationMissing)));
		assert!(matches!(
			manager.set_refresh_token("refresh").await,
			Err(Error::AuthenticationMissing)
		));
	}

	#[tokio::test]
	async fn invalid_credentials_are_rejected() {
		assert!(matches!(
			manager(Some(Credential::new("id", "", "refresh"))),
			Err(Error::AuthenticationInvalid { field: "client_secret" })
		));

		let manager = manager(None).expect("manager");

		assert!(matches!(
			manager.set_credential(Credential::new("id", "secret", "")).await,
			Err(Error::AuthenticationInvalid { field: "refresh_token" })
		));
		assert!(!manager.has_credential().await);
	}

	#[tokio::test]
	async fn fresh_tokens_are_returned_without_refresh() {
		let credential = Credential::new("id", "secret", "refresh")
			.with_access_token("access", Utc::now() + TimeDelta::minutes(10))
			.with_scopes(["public", "esi-skills.read_skills.v1"]);
		let manager = manager(Some(credential)).expect("manager");

		assert_eq!(manager.valid_token().await.expect("token"), "access");
		assert_eq!(manager.scopes().await.expect("scopes").len(), 2);
	}

	#[tokio::test]
	async fn replacing_the_refresh_token_clears_access_state() {
		let credential = Credential::new("id", "secret", "old")
			.with_access_token("access", Utc::now() + TimeDelta::minutes(10))
			.with_scopes(["public"]);
		let manager = manager(Some(credential)).expect("manager");

		manager.set_refresh_token("new").await.expect("set refresh token");

		let credential = manager.credential().await.expect("credential");

		assert_eq!(credential.refresh_token(), "new");
		assert_eq!(credential.access_token(), "");
		assert!(credential.scopes().is_empty());
		assert!(credential.needs_refresh(Utc::now(), Duration::from_secs(60)));
	}
}
