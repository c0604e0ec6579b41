//! Request URI construction from endpoint templates.

// std
use std::collections::BTreeMap;
// crates.io
use url::Url;
// self
use crate::{_prelude::*, config::Configuration};

/// Query parameter every call carries unless the caller overrides it.
pub const DATASOURCE_PARAMETER: &str = "datasource";

/// Expand `{name}` placeholders in `template` from `params`.
pub fn expand(template: &str, params: &[(&str, &str)]) -> Result<String> {
	let mut expanded = String::with_capacity(template.len());
	let mut rest = template;

	while let Some(open) = rest.find('{') {
		let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
			break;
		};
		let name = &rest[open + 1..close];
		let value = params
			.iter()
			.find_map(|(key, value)| (*key == name).then_some(*value))
			.ok_or_else(|| Error::UriParameterMissing { name: name.to_owned() })?;

		expanded.push_str(&rest[..open]);
		expanded.push_str(value);

		rest = &rest[close + 1..];
	}

	expanded.push_str(rest);

	Ok(expanded)
}

/// Path of a call: version prefix followed by the expanded template.
pub fn path(version: &str, template: &str, params: &[(&str, &str)]) -> Result<String> {
	let expanded = expand(template, params)?;

	Ok(format!("{}/{}", version.trim_end_matches('/'), expanded.trim_start_matches('/')))
}

/// Query string of a call: the datasource first, then the remaining parameters in key order.
pub fn query(config: &Configuration, extra: &BTreeMap<String, String>) -> String {
	let mut serializer = url::form_urlencoded::Serializer::new(String::new());
	let datasource = extra.get(DATASOURCE_PARAMETER).unwrap_or(&config.datasource);

	serializer.append_pair(DATASOURCE_PARAMETER, datasource);

	for (key, value) in extra.iter().filter(|(key, _)| *key != DATASOURCE_PARAMETER) {
		serializer.append_pair(key, value);
	}

	serializer.finish()
}

/// Absolute URL of a call against the configured API host.
pub fn build(config: &Configuration, path: &str, query: &str) -> Result<Url> {
	let mut url = Url::parse(&config.esi_base())?.join(path)?;

	url.set_query((!query.is_empty()).then_some(query));

	Ok(url)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expands_placeholders() {
		assert_eq!(
			expand(
				"/characters/{character_id}/skills/{skill_id}/",
				&[("character_id", "90000001"), ("skill_id", "3300")]
			)
			.expect("expanded"),
			"/characters/90000001/skills/3300/"
		);
		assert_eq!(expand("/status/", &[]).expect("expanded"), "/status/");
	}

	#[test]
	fn missing_parameters_are_reported_by_name() {
		let err = expand("/characters/{character_id}/", &[("corporation_id", "1")])
			.expect_err("missing parameter");

		assert!(matches!(err, Error::UriParameterMissing { ref name } if name == "character_id"));
	}

	#[test]
	fn builds_versioned_url_with_datasource_first() {
		let config = Configuration::default();
		let path = path("/latest", "/markets/{region_id}/orders/", &[("region_id", "10000002")])
			.expect("path");
		let extra = BTreeMap::from([
			("page".to_owned(), "2".to_owned()),
			("order_type".to_owned(), "sell".to_owned()),
		]);
		let query = query(&config, &extra);
		let url = build(&config, &path, &query).expect("url");

		assert_eq!(path, "/latest/markets/10000002/orders/");
		assert_eq!(query, "datasource=tranquility&order_type=sell&page=2");
		assert_eq!(
			url.as_str(),
			"https://esi.evetech.net/latest/markets/10000002/orders/?datasource=tranquility&order_type=sell&page=2"
		);
	}

	#[test]
	fn caller_may_override_the_datasource() {
		let extra = BTreeMap::from([("datasource".to_owned(), "singularity".to_owned())]);

		assert_eq!(query(&Configuration::default(), &extra), "datasource=singularity");
	}
}
