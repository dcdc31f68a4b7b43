//! Request payload validation.
//!
//! A [`ValidatorRegistry`] maps route prefixes to payload validators. It is
//! built once at startup and handed to the router; [`validate_payload`] runs
//! the validator registered for the longest matching prefix before the
//! request reaches its handler.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::debug;

use crate::http::routes::{ApiError, DEFAULT_BODY_LIMIT};

/// Maximum allowed JSON nesting depth.
/// Prevents stack overflow during deserialization of deeply nested structures.
pub const MAX_JSON_DEPTH: usize = 10;

/// Maximum number of tuples accepted by a single write or delete.
pub const MAX_TUPLES_PER_WRITE: usize = 100;

/// Maximum length of a user, relation or object string.
pub const MAX_FIELD_LENGTH: usize = 256;

/// Validates a parsed JSON payload. `Err` carries the client-facing message.
pub type PayloadValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Payload validators keyed by route prefix.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: Vec<(String, PayloadValidator)>,
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field(
                "prefixes",
                &self.validators.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the validators for the built-in `/api/v0` routes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("/api/v0/tuples", validate_tuples_payload)
            .register("/api/v0/check", validate_check_payload);
        registry
    }

    /// Registers `validator` for every path starting with `prefix`.
    ///
    /// Registering the same prefix twice replaces the earlier validator.
    pub fn register<F>(&mut self, prefix: impl Into<String>, validator: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        let prefix = prefix.into();
        self.validators.retain(|(p, _)| *p != prefix);
        self.validators.push((prefix, Arc::new(validator)));
        self
    }

    /// The validator with the longest prefix matching `path`.
    pub fn validator_for(&self, path: &str) -> Option<&PayloadValidator> {
        self.validators
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, validator)| validator)
    }

    /// Runs the matching validator; paths without one always pass.
    pub fn validate(&self, path: &str, payload: &Value) -> Result<(), String> {
        match self.validator_for(path) {
            Some(validator) => validator(payload),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

/// Middleware that validates JSON bodies against the registry.
///
/// Requests without a body-carrying method or without a registered validator
/// pass through untouched.
pub async fn validate_payload(
    State(registry): State<Arc<ValidatorRegistry>>,
    request: Request,
    next: Next,
) -> Response {
    if !matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    ) {
        return next.run(request).await;
    }
    let path = request.uri().path().to_string();
    if registry.validator_for(&path).is_none() {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, DEFAULT_BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(ApiError::new("payload_too_large", "request body too large")),
            )
                .into_response()
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => return reject(&path, format!("invalid JSON body: {e}")),
    };
    if json_exceeds_max_depth(&payload, 1) {
        return reject(
            &path,
            format!("JSON nesting exceeds maximum depth of {MAX_JSON_DEPTH}"),
        );
    }
    if let Err(message) = registry.validate(&path, &payload) {
        return reject(&path, message);
    }

    next.run(Request::from_parts(parts, Body::from(bytes)))
        .await
}

fn reject(path: &str, message: String) -> Response {
    debug!(path, %message, "Rejected request payload");
    ApiError::validation_error(message).into_response()
}

/// Checks if a JSON value exceeds the maximum nesting depth.
///
/// `current_depth` starts at 1 for the top-level value.
pub fn json_exceeds_max_depth(value: &Value, current_depth: usize) -> bool {
    if current_depth > MAX_JSON_DEPTH {
        return true;
    }
    match value {
        Value::Object(obj) => obj
            .values()
            .any(|v| json_exceeds_max_depth(v, current_depth + 1)),
        Value::Array(arr) => arr
            .iter()
            .any(|v| json_exceeds_max_depth(v, current_depth + 1)),
        _ => false,
    }
}

fn required_str<'a>(value: &'a Value, field: &str, context: &str) -> Result<&'a str, String> {
    let s = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{context}: '{field}' must be a string"))?;
    if s.trim().is_empty() {
        return Err(format!("{context}: '{field}' cannot be empty"));
    }
    if s.len() > MAX_FIELD_LENGTH {
        return Err(format!(
            "{context}: '{field}' exceeds {MAX_FIELD_LENGTH} characters"
        ));
    }
    Ok(s)
}

/// `{"tuples": [{"user", "relation", "object"}, ...]}`, 1..=100 entries.
pub fn validate_tuples_payload(payload: &Value) -> Result<(), String> {
    let tuples = payload
        .get("tuples")
        .and_then(Value::as_array)
        .ok_or_else(|| "'tuples' must be an array".to_string())?;
    if tuples.is_empty() {
        return Err("'tuples' cannot be empty".to_string());
    }
    if tuples.len() > MAX_TUPLES_PER_WRITE {
        return Err(format!(
            "'tuples' has {} entries, maximum is {MAX_TUPLES_PER_WRITE}",
            tuples.len()
        ));
    }
    for (index, tuple) in tuples.iter().enumerate() {
        let context = format!("tuples[{index}]");
        for field in ["user", "relation", "object"] {
            required_str(tuple, field, &context)?;
        }
    }
    Ok(())
}

/// `{"relation", "object", "user"?}`.
pub fn validate_check_payload(payload: &Value) -> Result<(), String> {
    required_str(payload, "relation", "check")?;
    let object = required_str(payload, "object", "check")?;
    if !object.contains(':') {
        return Err(format!("check: invalid object format: '{object}'"));
    }
    if payload.get("user").is_some_and(|u| !u.is_null()) {
        required_str(payload, "user", "check")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_longest_prefix_wins() {
        let mut registry = ValidatorRegistry::new();
        registry
            .register("/api", |_| Err("outer".to_string()))
            .register("/api/v0/tuples", |_| Err("inner".to_string()));

        assert_eq!(
            registry.validate("/api/v0/tuples", &json!({})),
            Err("inner".to_string())
        );
        assert_eq!(
            registry.validate("/api/v0/check", &json!({})),
            Err("outer".to_string())
        );
        assert_eq!(registry.validate("/health", &json!({})), Ok(()));
    }

    #[test]
    fn test_register_replaces_same_prefix() {
        let mut registry = ValidatorRegistry::new();
        registry
            .register("/api", |_| Err("first".to_string()))
            .register("/api", |_| Ok(()));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.validate("/api/x", &json!(null)), Ok(()));
    }

    #[test]
    fn test_tuples_payload() {
        let valid = json!({"tuples": [
            {"user": "user:alice", "relation": "can_view", "object": "clients:grafana"}
        ]});
        assert!(validate_tuples_payload(&valid).is_ok());

        assert!(validate_tuples_payload(&json!({})).is_err());
        assert!(validate_tuples_payload(&json!({"tuples": []})).is_err());

        let missing = json!({"tuples": [{"user": "user:alice", "relation": "can_view"}]});
        let err = validate_tuples_payload(&missing).unwrap_err();
        assert!(err.contains("tuples[0]") && err.contains("object"));

        let too_many: Vec<Value> = (0..=MAX_TUPLES_PER_WRITE)
            .map(|i| json!({"user": "user:a", "relation": "r", "object": format!("t:{i}")}))
            .collect();
        assert!(validate_tuples_payload(&json!({ "tuples": too_many })).is_err());
    }

    #[test]
    fn test_check_payload() {
        assert!(
            validate_check_payload(&json!({"relation": "can_view", "object": "roles:admin"}))
                .is_ok()
        );
        assert!(validate_check_payload(
            &json!({"relation": "can_view", "object": "roles:admin", "user": "user:bob"})
        )
        .is_ok());
        assert!(
            validate_check_payload(&json!({"relation": "can_view", "object": "admin"})).is_err()
        );
        assert!(validate_check_payload(
            &json!({"relation": "", "object": "roles:admin"})
        )
        .is_err());
    }

    #[test]
    fn test_json_depth_limit() {
        let mut value = json!("leaf");
        for _ in 0..MAX_JSON_DEPTH {
            value = json!({ "nested": value });
        }
        assert!(json_exceeds_max_depth(&value, 1));
        assert!(!json_exceeds_max_depth(&json!({"a": {"b": 1}}), 1));
    }
}
