//! Credential records holding the OAuth client identity and current token pair.

// std
use std::{
	collections::BTreeSet,
	fmt::{Debug, Formatter, Result as FmtResult},
};
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// OAuth client identity, token pair, expiry, and granted scopes.
///
/// Records are replaced wholesale after every refresh; fields are only readable from outside.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	client_id: String,
	client_secret: String,
	access_token: String,
	refresh_token: String,
	token_expires: DateTime<Utc>,
	#[serde(default)]
	scopes: BTreeSet<String>,
}
impl Credential {
	/// Create a record from the client identity and a refresh token.
	///
	/// The access token starts empty and already expired, so the first authenticated call
	/// performs a refresh.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		refresh_token: impl Into<String>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			access_token: String::new(),
			refresh_token: refresh_token.into(),
			token_expires: DateTime::<Utc>::UNIX_EPOCH,
			scopes: BTreeSet::new(),
		}
	}

	/// Attach a known access token and its expiry.
	pub fn with_access_token(
		mut self,
		access_token: impl Into<String>,
		token_expires: DateTime<Utc>,
	) -> Self {
		self.access_token = access_token.into();
		self.token_expires = token_expires;

		self
	}

	/// Attach an already-known scope set.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// OAuth client identifier.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// OAuth client secret.
	pub fn client_secret(&self) -> &str {
		&self.client_secret
	}

	/// Current access token; empty until the first refresh.
	pub fn access_token(&self) -> &str {
		&self.access_token
	}

	/// Current refresh token.
	pub fn refresh_token(&self) -> &str {
		&self.refresh_token
	}

	/// Expiry of the access token.
	pub fn token_expires(&self) -> DateTime<Utc> {
		self.token_expires
	}

	/// Granted scopes; empty until populated from a verified token.
	pub fn scopes(&self) -> &BTreeSet<String> {
		&self.scopes
	}

	/// Whether the record has every field needed to authenticate.
	pub fn valid(&self) -> bool {
		self.validate().is_ok()
	}

	/// Check that client id, secret, and refresh token are present.
	pub fn validate(&self) -> Result<()> {
		for (field, value) in [
			("client_id", &self.client_id),
			("client_secret", &self.client_secret),
			("refresh_token", &self.refresh_token),
		] {
			if value.is_empty() {
				return Err(Error::AuthenticationInvalid { field });
			}
		}

		Ok(())
	}

	/// Whether the access token expires within `margin` of `now`.
	pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
		let margin = TimeDelta::from_std(margin).unwrap_or(TimeDelta::MAX);

		match now.checked_add_signed(margin) {
			Some(deadline) => self.token_expires <= deadline,
			None => true,
		}
	}

	/// Successor record after a refresh exchange.
	pub(crate) fn rotated(
		&self,
		access_token: String,
		refresh_token: String,
		token_expires: DateTime<Utc>,
		scopes: BTreeSet<String>,
	) -> Self {
		Self {
			client_id: self.client_id.clone(),
			client_secret: self.client_secret.clone(),
			access_token,
			refresh_token,
			token_expires,
			scopes,
		}
	}

	/// Same record with a freshly populated scope set.
	pub(crate) fn with_populated_scopes(&self, scopes: BTreeSet<String>) -> Self {
		Self { scopes, ..self.clone() }
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("Credential")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("token_expires", &self.token_expires)
			.field("scopes", &self.scopes)
			.finish()
	}
}
