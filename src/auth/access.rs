//! Endpoint access checks evaluated before a request leaves the process.

// std
use std::{
	collections::{BTreeSet, HashMap},
	fmt::Debug,
};
// crates.io
use http::Method;
// self
use crate::auth::PUBLIC_SCOPE;

/// Decides whether a caller holding `scopes` may invoke `method` on `uri`.
///
/// `uri` is the unexpanded template, e.g. `/characters/{character_id}/wallet/`.
pub trait AccessCheck
where
	Self: Debug + Send + Sync,
{
	/// Whether the call is allowed.
	fn can(&self, method: &Method, uri: &str, scopes: &BTreeSet<String>) -> bool;
}

/// Static table mapping `(method, uri template)` to the scope it requires.
///
/// Endpoints missing from the table require the fallback scope, `public` unless
/// [`deny_unlisted`](ScopeMap::deny_unlisted) was called.
#[derive(Clone, Debug)]
pub struct ScopeMap {
	rules: HashMap<(Method, String), String>,
	fallback: Option<String>,
}
impl ScopeMap {
	/// Empty table that lets every caller reach unlisted endpoints.
	pub fn new() -> Self {
		Self { rules: HashMap::new(), fallback: Some(PUBLIC_SCOPE.into()) }
	}

	/// Require `scope` for `method` on `uri`.
	pub fn require(
		mut self,
		method: Method,
		uri: impl Into<String>,
		scope: impl Into<String>,
	) -> Self {
		self.rules.insert((method, uri.into()), scope.into());

		self
	}

	/// Refuse every endpoint that has no rule.
	pub fn deny_unlisted(mut self) -> Self {
		self.fallback = None;

		self
	}

	/// Scope required for the endpoint, `None` when it is unreachable.
	pub fn required_scope(&self, method: &Method, uri: &str) -> Option<&str> {
		self.rules
			.get(&(method.clone(), uri.to_owned()))
			.or(self.fallback.as_ref())
			.map(String::as_str)
	}
}
impl Default for ScopeMap {
	fn default() -> Self {
		Self::new()
	}
}
impl AccessCheck for ScopeMap {
	fn can(&self, method: &Method, uri: &str, scopes: &BTreeSet<String>) -> bool {
		self.required_scope(method, uri).is_some_and(|scope| scopes.contains(scope))
	}
}
