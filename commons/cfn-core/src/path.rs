use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::ParamsUnavailable;

lazy_static! {
    static ref WILDCARD_SEGMENT: Regex = Regex::new(r"^\{([^/{}]*)\}$").unwrap();
}

/// Parameters bound from the wildcard segments of a trigger resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Params {
    Resolved(BTreeMap<String, String>),
    /// The function was built from the handler namespace and has no trigger
    /// resource to match against.
    Unavailable,
}

impl Default for Params {
    fn default() -> Self {
        Params::Resolved(BTreeMap::new())
    }
}

impl Params {
    pub fn as_map(&self) -> Result<&BTreeMap<String, String>, ParamsUnavailable> {
        match self {
            Params::Resolved(map) => Ok(map),
            Params::Unavailable => Err(ParamsUnavailable),
        }
    }

    pub fn get(&self, name: &str) -> Result<Option<&str>, ParamsUnavailable> {
        Ok(self.as_map()?.get(name).map(String::as_str))
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Params::Resolved(_))
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Params::Resolved(map) => map.serialize(serializer),
            Params::Unavailable => serializer.serialize_none(),
        }
    }
}

/// Bare names of every wildcard segment in `template`, in order.
pub fn wildcard_names(template: &str) -> Vec<&str> {
    template
        .split('/')
        .filter_map(|segment| WILDCARD_SEGMENT.captures(segment))
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Binds each `{name}` segment of `template` to the segment at the same
/// position in `resource_name`. Literal segments are not compared.
pub fn extract_params(
    template: &str,
    resource_name: &str,
) -> BTreeMap<String, String> {
    let concrete: Vec<&str> = resource_name.split('/').collect();
    let mut params = BTreeMap::new();
    for (position, segment) in template.split('/').enumerate() {
        let Some(name) = WILDCARD_SEGMENT
            .captures(segment)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        else {
            continue;
        };
        if let Some(value) = concrete.get(position) {
            params
                .entry(name.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    params
}

/// Resolves `context.params` for one invocation.
///
/// `template` is `None` for namespace-only functions. Params supplied by the
/// caller win over matching, and a missing resource name (hand-built test
/// events) yields an empty mapping.
pub fn resolve_params(
    template: Option<&str>,
    supplied: Option<BTreeMap<String, String>>,
    resource_name: Option<&str>,
) -> Params {
    let Some(template) = template else {
        return Params::Unavailable;
    };
    if let Some(supplied) = supplied {
        return Params::Resolved(supplied);
    }
    match resource_name {
        Some(name) => Params::Resolved(extract_params(template, name)),
        None => Params::default(),
    }
}
