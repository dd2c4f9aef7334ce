//! JSON helpers for feature modules.
//!
//! Every call goes through [`SessionClient::execute`]; these helpers only
//! build descriptors and decode responses.

use reqwest::header::{self, HeaderValue};
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::http_client::{RequestDescriptor, SessionClient};

/// Endpoint returning the authenticated user
const CURRENT_USER_PATH: &str = "/user";

impl SessionClient {
    /// GET `path` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let descriptor = RequestDescriptor::get(self.endpoint(path)?).header(
            header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        self.fetch_json(&descriptor).await
    }

    /// Send `body` as JSON with `method` and decode the JSON response
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let descriptor = RequestDescriptor::new(method, self.endpoint(path)?)
            .header(
                header::ACCEPT,
                HeaderValue::from_static("application/json"),
            )
            .json(body)?;
        self.fetch_json(&descriptor).await
    }

    /// DELETE `path`, discarding the response body
    pub async fn delete(&self, path: &str) -> Result<()> {
        let descriptor = RequestDescriptor::delete(self.endpoint(path)?);
        self.execute(&descriptor).await.into_result()?;
        Ok(())
    }

    /// The authenticated user as reported by the backend
    pub async fn current_user(&self) -> Result<Value> {
        self.get_json(CURRENT_USER_PATH).await
    }

    async fn fetch_json<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> Result<T> {
        let response = self.execute(descriptor).await.into_result()?;
        let bytes = response.bytes().await?;
        decode_json(&bytes)
    }
}

/// Decode a JSON body; an empty body decodes as `null`
fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        bytes
    };
    serde_json::from_slice(bytes).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthManager, Credential, DisabledRefresh, MemorySource};
    use reqwest::{Client, Url};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Deserialize)]
    struct Rate {
        id: String,
        rate: String,
    }

    fn client_for(server: &mockito::ServerGuard, token: Option<&str>) -> SessionClient {
        let base_url = Url::parse(&format!("{}/api", server.url())).unwrap();
        let source = Arc::new(match token {
            Some(t) => MemorySource::with_credential(Credential::new(t)),
            None => MemorySource::new(),
        });
        let auth = Arc::new(AuthManager::new(
            Client::new(),
            Some(source),
            Arc::new(DisabledRefresh),
            Url::parse(&format!("{}/api/login", server.url())).unwrap(),
        ));
        SessionClient::new(Client::new(), auth, base_url)
    }

    #[tokio::test]
    async fn test_get_json_decodes_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/rates/3")
            .match_header("authorization", "Bearer valid")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "3", "rate": "1.25"}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("valid"));
        let rate: Rate = client.get_json("/rates/3").await.unwrap();
        assert_eq!(rate.id, "3");
        assert_eq!(rate.rate, "1.25");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_json_posts_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/roles/7")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({
                "name": "agent",
                "status": "active",
                "permission": ["view-transfers"]
            })))
            .with_status(200)
            .with_body(r#"{"status": "success"}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("valid"));
        let body = json!({
            "name": "agent",
            "status": "active",
            "permission": ["view-transfers"]
        });
        let reply: Value = client.send_json(Method::PUT, "/roles/7", &body).await.unwrap();
        assert_eq!(reply["status"], "success");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_maps_to_backend_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/senders/search/nobody")
            .with_status(404)
            .with_body(r#"{"message": "User not found"}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("valid"));
        let err = client
            .get_json::<Value>("/senders/search/nobody")
            .await
            .unwrap_err();
        match err {
            ApiError::Backend { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "User not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_session_maps_to_auth_expired() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/user")
            .with_status(401)
            .create_async()
            .await;

        let client = client_for(&server, Some("expired"));
        let err = client.current_user().await.unwrap_err();
        assert!(matches!(err, ApiError::AuthExpired));
        assert!(!client.auth().is_authenticated());
    }

    #[tokio::test]
    async fn test_delete_with_empty_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/api/rates/9")
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server, Some("valid"));
        client.delete("/rates/9").await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_decode_json_empty_body_is_null() {
        let value: Value = decode_json(b"").unwrap();
        assert!(value.is_null());

        let value: Option<Rate> = decode_json(b"  \n").unwrap();
        assert!(value.is_none());

        let err = decode_json::<Rate>(b"<html>").unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }
}
