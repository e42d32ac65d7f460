use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthType {
    Admin,
    User,
    Unauthenticated,
}

/// Identity of the end user behind a realtime-database event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Decoded ID token claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedAuth {
    Admin,
    User(AuthRecord),
    Unauthenticated,
}

impl ResolvedAuth {
    pub fn auth_type(&self) -> AuthType {
        match self {
            ResolvedAuth::Admin => AuthType::Admin,
            ResolvedAuth::User(_) => AuthType::User,
            ResolvedAuth::Unauthenticated => AuthType::Unauthenticated,
        }
    }

    /// The identity to expose on the context. Only `User` carries one.
    pub fn into_record(self) -> Option<AuthRecord> {
        match self {
            ResolvedAuth::User(record) => Some(record),
            ResolvedAuth::Admin | ResolvedAuth::Unauthenticated => None,
        }
    }
}

/// Classifies the raw `context.auth` of a realtime-database invocation.
///
/// A truthy `admin` flag wins; otherwise the presence of the `variable`
/// key (even when it is empty) marks a user.
pub fn resolve_auth(raw: Option<&Value>) -> ResolvedAuth {
    let Some(Value::Object(auth)) = raw else {
        return ResolvedAuth::Unauthenticated;
    };
    if auth.get("admin").is_some_and(is_truthy) {
        return ResolvedAuth::Admin;
    }
    match auth.get("variable") {
        Some(variable) => ResolvedAuth::User(AuthRecord {
            uid: variable
                .get("uid")
                .and_then(Value::as_str)
                .map(str::to_string),
            token: variable.get("token").filter(|t| !t.is_null()).cloned(),
        }),
        None => ResolvedAuth::Unauthenticated,
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
