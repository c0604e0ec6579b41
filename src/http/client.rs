//! Network execution shared by API calls, token exchanges, and key discovery.

// crates.io
use http::Method;
use reqwest::{Client, Request};
use serde::de::DeserializeOwned;
use url::Url;
// self
use crate::{_prelude::*, metrics::ClientMetrics, response::EsiResponse};

/// Send `request` and capture the answer as an [`EsiResponse`].
///
/// Statuses of 400 and above are logged and returned as [`Error::RequestFailed`] carrying the
/// full response record. Transport failures surface as [`Error::Reqwest`].
pub async fn execute(
	client: &Client,
	request: Request,
	metrics: &ClientMetrics,
) -> Result<EsiResponse> {
	let method = request.method().clone();
	let url = request.url().clone();
	let start = Instant::now();
	let received = match client.execute(request).await {
		Ok(response) => {
			let status = response.status();
			let headers = response.headers().clone();

			response.text().await.map(|body| (status, headers, body))
		},
		Err(e) => Err(e),
	};
	let elapsed = start.elapsed();
	let (status, headers, body) = match received {
		Ok(received) => received,
		Err(e) => {
			tracing::error!(
				method = %method,
				url = %url,
				elapsed = ?elapsed,
				error = %e,
				"request could not be completed"
			);

			return Err(e.into());
		},
	};

	metrics.record_request(&method, status.as_u16(), elapsed);

	let response = EsiResponse::from_parts(body, &headers, status);

	if status.as_u16() >= 400 {
		tracing::error!(
			method = %method,
			url = %url,
			status = status.as_u16(),
			elapsed = ?elapsed,
			error_limit = ?response.error_limit(),
			error = response.error().unwrap_or_default(),
			"request failed"
		);
		tracing::debug!(body = response.raw(), "failed response body");

		return Err(Error::RequestFailed(Box::new(response)));
	}

	tracing::debug!(
		method = %method,
		url = %url,
		status = status.as_u16(),
		elapsed = ?elapsed,
		"request complete"
	);

	Ok(response)
}

/// Fetch and decode a JSON document from an identity-provider endpoint.
///
/// Failed exchanges are logged before they are raised. Documents larger than
/// `max_response_bytes` are rejected with [`Error::Validation`].
pub async fn fetch_json<T>(
	client: &Client,
	url: &Url,
	timeout: Duration,
	max_response_bytes: u64,
	metrics: &ClientMetrics,
) -> Result<T>
where
	T: DeserializeOwned,
{
	let start = Instant::now();
	let response = match client.get(url.clone()).timeout(timeout).send().await {
		Ok(response) => response,
		Err(e) => {
			tracing::error!(
				url = %url,
				elapsed = ?start.elapsed(),
				error = %e,
				"document request could not be completed"
			);

			return Err(e.into());
		},
	};
	let status = response.status();

	metrics.record_request(&Method::GET, status.as_u16(), start.elapsed());

	if !status.is_success() {
		let body = response.text().await.ok();

		tracing::error!(
			url = %url,
			status = status.as_u16(),
			elapsed = ?start.elapsed(),
			"document request failed"
		);
		tracing::debug!(body = body.as_deref().unwrap_or_default(), "failed document body");

		return Err(Error::HttpStatus { status, url: url.clone(), body });
	}

	let bytes = match response.bytes().await {
		Ok(bytes) => bytes,
		Err(e) => {
			tracing::error!(
				url = %url,
				status = status.as_u16(),
				elapsed = ?start.elapsed(),
				error = %e,
				"document body could not be read"
			);

			return Err(e.into());
		},
	};

	if bytes.len() as u64 > max_response_bytes {
		tracing::error!(
			url = %url,
			size = bytes.len(),
			limit = max_response_bytes,
			"document exceeds the size guard"
		);

		return Err(Error::Validation {
			field: "max_response_bytes",
			reason: format!(
				"Response size {size} bytes exceeds the configured guard of {max_response_bytes} \
				 bytes.",
				size = bytes.len(),
			),
		});
	}

	let document = serde_json::from_slice(&bytes)?;

	tracing::debug!(url = %url, status = %status, elapsed = ?start.elapsed(), "document fetched");

	Ok(document)
}
