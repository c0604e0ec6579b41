//! Transport guards applied to the SSO, discovery, and key set endpoints.
//!
//! # Threat Model
//! Upstream TLS validation is assumed to have succeeded. These helpers defend the token pipeline
//! against downgrade to plain HTTP and against a metadata document that points key retrieval at
//! a host other than the configured identity provider.

// crates.io
use url::Url;
// self
use crate::_prelude::*;

/// Canonicalise a DNS name by trimming whitespace, removing any trailing dot, and lowercasing.
pub fn canonicalize_dns_name(value: &str) -> Option<String> {
	let trimmed = value.trim();
	if trimmed.is_empty() {
		return None;
	}

	let without_trailing_dot = trimmed.trim_end_matches('.');
	if without_trailing_dot.is_empty() {
		return None;
	}

	Some(without_trailing_dot.to_ascii_lowercase())
}

/// Ensure the provided URL uses HTTPS.
pub fn enforce_https(url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::Security(format!("Upstream URL {url} must use HTTPS.")))
	}
}

/// Ensure the URL's host is the expected host or one of its subdomains.
pub fn enforce_host(url: &Url, expected: &str) -> Result<()> {
	let host = url.host_str().and_then(canonicalize_dns_name);
	let allowed = match (host, canonicalize_dns_name(expected)) {
		(Some(host), Some(expected)) =>
			host == expected
				|| host.strip_suffix(&expected).and_then(|p| p.strip_suffix('.')).is_some(),
		_ => false,
	};

	if allowed {
		Ok(())
	} else {
		Err(Error::Security(format!("Upstream URL {url} is not served by host '{expected}'.")))
	}
}

/// Apply the configured guards to an SSO-side URL.
pub fn check_sso_url(url: &Url, expected_host: &str, require_https: bool) -> Result<()> {
	if require_https {
		enforce_https(url)?;
	}

	enforce_host(url, expected_host)
}
