//! GraphQL operation model and wire types.
//!
//! - [`Operation`] - parsed document classified by its main definition
//! - [`GraphQLRequest`] - `{ query, variables, operationName }` as sent on both transports
//! - [`GraphQLResponse`] - `{ data, errors }` as returned by the server

pub mod operation;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use operation::{Operation, OperationError, OperationKind};

/// Variable bindings for an operation.
pub type Variables = Map<String, Value>;

/// Request body shared by the HTTP and WebSocket transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    /// Document text.
    pub query: String,
    /// Variable bindings (always serialized, `{}` when empty).
    #[serde(default)]
    pub variables: Variables,
    /// Name of the operation to run, when the document names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    /// Build a request for `operation` with `variables`.
    pub fn new(operation: &Operation, variables: Variables) -> Self {
        Self {
            query: operation.document().to_string(),
            variables,
            operation_name: operation.name().map(str::to_string),
        }
    }
}

/// One entry of a response's `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human readable message.
    pub message: String,
    /// Source locations the error refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Value>,
    /// Response path of the failing field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    /// Server-specific extra information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl std::fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Response body returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    /// Result data, absent when execution failed before producing any.
    #[serde(default)]
    pub data: Option<Value>,
    /// Execution errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    /// Interpret a raw event payload as a response.
    ///
    /// Payloads that don't have the `{ data, errors }` shape become
    /// `data` as-is.
    pub fn from_payload(payload: Value) -> Self {
        match serde_json::from_value::<Self>(payload.clone()) {
            Ok(response) if response.data.is_some() || !response.errors.is_empty() => response,
            _ => Self {
                data: Some(payload),
                errors: Vec::new(),
            },
        }
    }

    /// Returns the data, or the errors when any were reported.
    pub fn into_result(self) -> Result<Value, Vec<GraphQLError>> {
        if self.errors.is_empty() {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(self.errors)
        }
    }
}

/// Extract a non-empty `errors` array from a raw event payload.
pub fn payload_errors(payload: &Value) -> Option<Vec<GraphQLError>> {
    let errors = payload.get("errors")?;
    let errors: Vec<GraphQLError> = serde_json::from_value(errors.clone()).ok()?;
    (!errors.is_empty()).then_some(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let op = Operation::parse("query Games { games { id } }").unwrap();
        let request = GraphQLRequest::new(&op, Variables::new());
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({
                "query": "query Games { games { id } }",
                "variables": {},
                "operationName": "Games"
            })
        );
    }

    #[test]
    fn test_anonymous_request_omits_operation_name() {
        let op = Operation::parse("subscription { gameUpdated(id: 1) { id } }").unwrap();
        let wire = serde_json::to_value(GraphQLRequest::new(&op, Variables::new())).unwrap();
        assert!(wire.get("operationName").is_none());
    }

    #[test]
    fn test_into_result_prefers_errors() {
        let response: GraphQLResponse = serde_json::from_value(json!({
            "data": null,
            "errors": [{ "message": "not allowed", "path": ["game"] }]
        }))
        .unwrap();
        let errors = response.into_result().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "not allowed");
    }

    #[test]
    fn test_into_result_returns_data() {
        let response = GraphQLResponse::from_payload(json!({ "data": { "games": [] } }));
        assert_eq!(response.into_result().unwrap(), json!({ "games": [] }));
    }

    #[test]
    fn test_from_payload_wraps_bare_values() {
        let response = GraphQLResponse::from_payload(json!({ "id": 1, "state": "A" }));
        assert_eq!(response.data, Some(json!({ "id": 1, "state": "A" })));
    }

    #[test]
    fn test_payload_errors() {
        assert!(payload_errors(&json!({ "data": {} })).is_none());
        assert!(payload_errors(&json!({ "errors": [] })).is_none());
        let errors = payload_errors(&json!({ "errors": [{ "message": "boom" }] })).unwrap();
        assert_eq!(errors[0].to_string(), "boom");
    }
}
