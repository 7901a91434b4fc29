// Query parameter canonicalization
// A key seen once stays a scalar, a repeated key becomes an ordered list

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Value of one query parameter.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    Multiple(Vec<String>),
}

impl ParamValue {
    fn push(&mut self, value: String) {
        match self {
            ParamValue::Single(first) => {
                let first = std::mem::take(first);
                *self = ParamValue::Multiple(vec![first, value]);
            }
            ParamValue::Multiple(values) => values.push(value),
        }
    }

    /// All occurrences, in the order they appeared.
    pub fn values(&self) -> Vec<&str> {
        match self {
            ParamValue::Single(v) => vec![v.as_str()],
            ParamValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Single(value.to_string())
    }
}

/// Canonical parameter map. Order across distinct keys carries no meaning.
pub type SearchParams = BTreeMap<String, ParamValue>;

/// Build the canonical parameter map of a URL.
pub fn canonicalize(url: &Url) -> SearchParams {
    let mut params = SearchParams::new();
    for (key, value) in url.query_pairs() {
        let value = value.into_owned();
        match params.get_mut(key.as_ref()) {
            Some(existing) => existing.push(value),
            None => {
                params.insert(key.into_owned(), ParamValue::Single(value));
            }
        }
    }
    params
}

/// Serialize back to a query string (without the leading `?`).
///
/// Keys come out sorted; repeated keys keep every value in order.
pub fn to_query_string(params: &SearchParams) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        for v in value.values() {
            serializer.append_pair(key, v);
        }
    }
    serializer.finish()
}
