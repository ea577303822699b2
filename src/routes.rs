//! Proxy configuration to route rule compilation.
//!
//! A proxy map (`"/api" = "http://localhost:4000/"`) becomes the route rule
//! table handed to the server engine (`"/api/**" = { proxy = "http://localhost:4000/**" }`).
//! Compilation is all-or-nothing: a single bad entry yields no table at all.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use toml::Value;

/// Suffix appended to both the route pattern and the proxy target.
const WILDCARD: &str = "/**";

/// A single forwarding rule as understood by the server engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRule {
    pub proxy: String,
}

/// Route pattern to rule, serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RouteTable {
    rules: BTreeMap<String, RouteRule>,
}

impl RouteTable {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RouteRule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// How repeated route patterns are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompileMode {
    /// The entry iterated last replaces earlier ones.
    #[default]
    LastWins,
    /// Repeated patterns are rejected.
    Strict,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("proxy target for `{prefix}` must resolve to a string, found {found}")]
    InvalidTarget { prefix: String, found: &'static str },
    #[error("duplicate proxy route `{route}`")]
    DuplicateRoute { route: String },
}

/// Compiles proxy entries, in iteration order, into a route table.
pub fn compile<'a, I>(entries: I, mode: CompileMode) -> Result<RouteTable, RouteError>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut rules = BTreeMap::new();
    for (prefix, value) in entries {
        let target = resolve_target(prefix, value)?;
        let route = format!("{}{}", prefix, WILDCARD);
        let rule = RouteRule {
            proxy: format!("{}{}", canonical_target(target), WILDCARD),
        };
        if rules.insert(route.clone(), rule).is_some() && mode == CompileMode::Strict {
            return Err(RouteError::DuplicateRoute { route });
        }
    }
    Ok(RouteTable { rules })
}

/// Follows `target` fields until a string is reached.
fn resolve_target<'a>(prefix: &str, value: &'a Value) -> Result<&'a str, RouteError> {
    match value {
        Value::String(target) => Ok(target),
        Value::Table(table) => match table.get("target") {
            Some(inner) => resolve_target(prefix, inner),
            None => Err(RouteError::InvalidTarget {
                prefix: prefix.to_string(),
                found: "table without `target`",
            }),
        },
        other => Err(RouteError::InvalidTarget {
            prefix: prefix.to_string(),
            found: other.type_str(),
        }),
    }
}

// Exactly one trailing slash is removed.
fn canonical_target(target: &str) -> &str {
    target.strip_suffix('/').unwrap_or(target)
}
