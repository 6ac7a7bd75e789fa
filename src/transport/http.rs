//! GraphQL-over-HTTP request/response transport.

use async_trait::async_trait;
use reqwest::Client;

use super::{RequestTransport, TransportError};
use crate::constants;
use crate::graphql::{GraphQLRequest, GraphQLResponse};

/// POSTs each operation to the query endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    /// Creates a transport for `url` with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, url))
    }

    /// Creates a transport with a pre-configured HTTP client.
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RequestTransport for HttpTransport {
    async fn execute(&self, request: &GraphQLRequest) -> Result<GraphQLResponse, TransportError> {
        log::debug!(
            "[Http] POST {} ({})",
            self.url,
            request.operation_name.as_deref().unwrap_or("anonymous")
        );

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[Http] {} returned {}", self.url, status);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::{Operation, Variables};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(source: &str) -> GraphQLRequest {
        GraphQLRequest::new(&Operation::parse(source).unwrap(), Variables::new())
    }

    #[tokio::test]
    async fn test_posts_request_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/graphql"))
            .and(body_partial_json(json!({ "operationName": "Games", "variables": {} })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "games": [] } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(format!("{}/v1/graphql", server.uri())).unwrap();
        let response = transport
            .execute(&request("query Games { games { id } }"))
            .await
            .unwrap();
        assert_eq!(response.data, Some(json!({ "games": [] })));
        assert!(response.errors.is_empty());
    }

    #[tokio::test]
    async fn test_graphql_errors_are_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{ "message": "field 'nope' not found" }]
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let response = transport.execute(&request("{ nope }")).await.unwrap();
        assert_eq!(response.errors[0].message, "field 'nope' not found");
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let err = transport
            .execute(&request("{ games { id } }"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Status {
                status: 503,
                body: "maintenance".into()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let err = transport
            .execute(&request("{ games { id } }"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let transport = HttpTransport::new("http://127.0.0.1:1/graphql").unwrap();
        let err = transport
            .execute(&request("{ games { id } }"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }
}
