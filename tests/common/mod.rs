//! Shared fixtures: mock SSO endpoints, token minting, and client configuration.

#![allow(dead_code)]

// std
use std::time::{Duration, SystemTime};
// crates.io
use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::Utc;
use esi_client::{Configuration, Credential};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_string_contains, header, method, path},
};

pub const CLIENT_ID: &str = "client-abc";
pub const CLIENT_SECRET: &str = "secret-xyz";
pub const REFRESH_TOKEN: &str = "refresh-1";
pub const TOKEN_PATH: &str = "/v2/oauth/token";
pub const DISCOVERY_PATH: &str = "/.well-known/oauth-authorization-server";
pub const JWKS_PATH: &str = "/oauth/jwks";
pub const SIGNING_KEY: &str = include_str!("../fixtures/signing_key.pem");
pub const ROGUE_KEY: &str = include_str!("../fixtures/rogue_key.pem");
pub const JWKS: &str = include_str!("../fixtures/jwks.json");
pub const WALLET_SCOPE: &str = "esi-wallet.read_character_wallet.v1";

/// Configuration pointing both the API and the SSO provider at the mock server.
pub fn config(server: &MockServer) -> Configuration {
	let base = Url::parse(&server.uri()).expect("mock server url");

	Configuration::default().with_esi_base(&base).with_sso_base(&base).with_require_https(false)
}

/// `Expires` header value `offset` seconds away from now.
pub fn http_date(offset: i64) -> String {
	let delta = Duration::from_secs(offset.unsigned_abs());
	let at = if offset >= 0 { SystemTime::now() + delta } else { SystemTime::now() - delta };

	httpdate::fmt_http_date(at)
}

/// Credential whose access token is already expired.
pub fn stale_credential() -> Credential {
	Credential::new(CLIENT_ID, CLIENT_SECRET, REFRESH_TOKEN)
}

/// Access token claims accepted by a client configured with [`config`].
pub fn claims(server: &MockServer, expires_in: i64, scopes: &[&str]) -> Value {
	let config = config(server);

	json!({
		"scp": scopes,
		"jti": "4c9b2e0a",
		"kid": "JWT-Signature-Key",
		"sub": "CHARACTER:EVE:90000001",
		"azp": CLIENT_ID,
		"tenant": "tranquility",
		"tier": "live",
		"region": "world",
		"aud": [CLIENT_ID, "EVE Online"],
		"name": "Some Pilot",
		"owner": "8PmzCeTKb4VFUDrHLc/AeZXDSWM=",
		"exp": Utc::now().timestamp() + expires_in,
		"iat": Utc::now().timestamp(),
		"iss": format!("{}://{}", config.sso_scheme, config.sso_host),
	})
}

/// Sign `claims` with the PEM key `pem` as an RS256 JWT.
pub fn sign(pem: &str, claims: &Value) -> String {
	let mut header = Header::new(Algorithm::RS256);

	header.kid = Some("JWT-Signature-Key".into());

	encode(&header, claims, &EncodingKey::from_rsa_pem(pem.as_bytes()).expect("signing key"))
		.expect("token")
}

/// Valid access token for the mock provider.
pub fn mint_token(server: &MockServer, expires_in: i64, scopes: &[&str]) -> String {
	sign(SIGNING_KEY, &claims(server, expires_in, scopes))
}

/// Mount the metadata document and key set, expecting `fetches` retrievals of each.
pub async fn mount_discovery(server: &MockServer, fetches: u64) {
	Mock::given(method("GET"))
		.and(path(DISCOVERY_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"issuer": server.uri(),
			"token_endpoint": format!("{}{TOKEN_PATH}", server.uri()),
			"jwks_uri": format!("{}{JWKS_PATH}", server.uri()),
		})))
		.expect(fetches)
		.mount(server)
		.await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_raw(JWKS, "application/json"))
		.expect(fetches)
		.mount(server)
		.await;
}

/// Mount the token endpoint for `refresh_token`, answering with `access_token` and
/// `next_refresh`, expecting `calls` exchanges.
pub async fn mount_token_endpoint(
	server: &MockServer,
	refresh_token: &str,
	access_token: &str,
	next_refresh: &str,
	calls: u64,
) {
	let basic = BASE64_STANDARD.encode(format!("{CLIENT_ID}:{CLIENT_SECRET}"));

	Mock::given(method("POST"))
		.and(path(TOKEN_PATH))
		.and(header("authorization", format!("Basic {basic}").as_str()))
		.and(header("content-type", "application/x-www-form-urlencoded"))
		.and(body_string_contains("grant_type=refresh_token"))
		.and(body_string_contains(format!("refresh_token={refresh_token}").as_str()))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_json(json!({
					"access_token": access_token,
					"expires_in": 1199,
					"token_type": "Bearer",
					"refresh_token": next_refresh,
				}))
				.set_delay(Duration::from_millis(50)),
		)
		.expect(calls)
		.mount(server)
		.await;
}
