use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{BackendError, ChatBackend, ChatReply, ChatRequest};
use crate::state::ConversationId;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A message as the chat service remembers it
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Deserialize)]
struct RemoteConversation {
    #[serde(default)]
    messages: Vec<RemoteMessage>,
}

/// JSON-over-HTTP chat endpoint
pub struct HttpChatBackend {
    client: Client,
    endpoint: RwLock<String>,
    timeout: Duration,
}

impl HttpChatBackend {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: RwLock::new(endpoint.to_string()),
            timeout,
        }
    }

    pub fn endpoint(&self) -> String {
        self.endpoint
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The endpoint with its trailing `/chat` segment removed,
    /// e.g. `http://host/api/chat` -> `http://host/api`
    pub fn api_base(&self) -> String {
        let endpoint = self.endpoint();
        let trimmed = endpoint.trim_end_matches('/');
        trimmed.strip_suffix("/chat").unwrap_or(trimmed).to_string()
    }

    pub async fn health(&self) -> Result<HealthStatus, BackendError> {
        let url = format!("{}/health", self.api_base());
        self.get_json(&url).await
    }

    /// What the service has stored for a conversation
    pub async fn fetch_conversation(&self, id: &ConversationId) -> Result<Vec<RemoteMessage>, BackendError> {
        let url = format!("{}/conversation/{}", self.api_base(), id);
        let conversation: RemoteConversation = self.get_json(&url).await?;
        Ok(conversation.messages)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, BackendError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)?;

        if !response.status().is_success() {
            return Err(BackendError::Status(response.status()));
        }

        response.json().await.map_err(classify)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn ask(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        let url = self.endpoint();
        debug!(%url, conversation = %request.conversation_id, "posting chat message");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        if !response.status().is_success() {
            return Err(BackendError::Status(response.status()));
        }

        let body: Value = response.json().await.map_err(classify)?;
        let reply = body.get("reply").and_then(reply_text);

        Ok(ChatReply { reply })
    }

    fn set_endpoint(&self, endpoint: &str) -> bool {
        let mut current = self
            .endpoint
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = endpoint.to_string();
        true
    }
}

/// Text to show for a `reply` field. Empty strings, zero, `false`, `null`
/// and structured values count as no reply.
fn reply_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

fn classify(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_decode() {
        BackendError::Decode(err.to_string())
    } else {
        BackendError::Network(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use tokio::net::TcpListener;

    fn request(message: &str) -> ChatRequest {
        ChatRequest::new(message, &ConversationId::from_stored("conv_1_abcdefghi"))
    }

    #[tokio::test]
    async fn test_posts_payload_and_reads_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "message": "hello",
                "conversationId": "conv_1_abcdefghi",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"reply":"Hi there","conversationId":"conv_1_abcdefghi"}"#)
            .create_async()
            .await;

        let backend = HttpChatBackend::new(&format!("{}/api/chat", server.url()), Duration::from_secs(5));
        let reply = backend.ask(&request("hello")).await.unwrap();

        assert_eq!(reply.reply.as_deref(), Some("Hi there"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_body_without_reply_is_empty_reply() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"answer":"wrong field"}"#)
            .create_async()
            .await;

        let backend = HttpChatBackend::new(&format!("{}/api/chat", server.url()), Duration::from_secs(5));
        let reply = backend.ask(&request("hello")).await.unwrap();
        assert_eq!(reply.reply, None);
    }

    #[tokio::test]
    async fn test_empty_reply_counts_as_missing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"reply":""}"#)
            .create_async()
            .await;

        let backend = HttpChatBackend::new(&format!("{}/api/chat", server.url()), Duration::from_secs(5));
        let reply = backend.ask(&request("hello")).await.unwrap();
        assert_eq!(reply.reply, None);
    }

    #[tokio::test]
    async fn test_scalar_reply_is_shown_as_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"reply":42}"#)
            .create_async()
            .await;

        let backend = HttpChatBackend::new(&format!("{}/api/chat", server.url()), Duration::from_secs(5));
        let reply = backend.ask(&request("hello")).await.unwrap();
        assert_eq!(reply.reply.as_deref(), Some("42"));
    }

    #[test]
    fn test_reply_text_falsy_values() {
        assert_eq!(reply_text(&json!("ok")).as_deref(), Some("ok"));
        assert_eq!(reply_text(&json!(1.5)).as_deref(), Some("1.5"));
        assert_eq!(reply_text(&json!(true)).as_deref(), Some("true"));

        for falsy in [json!(""), json!(0), json!(false), json!(null), json!({"text": "hi"}), json!([])] {
            assert_eq!(reply_text(&falsy), None, "{}", falsy);
        }
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(500)
            .with_body(r#"{"error":"boom"}"#)
            .create_async()
            .await;

        let backend = HttpChatBackend::new(&format!("{}/api/chat", server.url()), Duration::from_secs(5));
        let err = backend.ask(&request("hello")).await.unwrap_err();
        assert!(matches!(err, BackendError::Status(status) if status.as_u16() == 500));
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let backend = HttpChatBackend::new(&format!("{}/api/chat", server.url()), Duration::from_secs(5));
        let err = backend.ask(&request("hello")).await.unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without ever answering
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let backend = HttpChatBackend::new(&format!("http://{}/api/chat", addr), Duration::from_millis(200));
        let err = backend.ask(&request("ping")).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout));
    }

    #[tokio::test]
    async fn test_unreachable_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpChatBackend::new(&format!("http://{}/api/chat", addr), Duration::from_secs(5));
        let err = backend.ask(&request("hello")).await.unwrap_err();
        assert!(matches!(err, BackendError::Network(_)));
    }

    #[tokio::test]
    async fn test_health_and_conversation_routes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/health")
            .with_status(200)
            .with_body(r#"{"status":"ok","timestamp":"2024-05-01T10:00:00"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/conversation/conv_1_abcdefghi")
            .with_status(200)
            .with_body(r#"{"messages":[{"role":"user","content":"hi","timestamp":"2024-05-01T10:00:00"}]}"#)
            .create_async()
            .await;

        let backend = HttpChatBackend::new(&format!("{}/api/chat/", server.url()), Duration::from_secs(5));
        assert_eq!(backend.api_base(), format!("{}/api", server.url()));

        let health = backend.health().await.unwrap();
        assert_eq!(health.status, "ok");

        let messages = backend
            .fetch_conversation(&ConversationId::from_stored("conv_1_abcdefghi"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi");
    }

    #[test]
    fn test_set_endpoint() {
        let backend = HttpChatBackend::new("http://a/api/chat", Duration::from_secs(1));
        assert!(backend.set_endpoint("http://b/api/chat"));
        assert_eq!(backend.endpoint(), "http://b/api/chat");
    }

    #[test]
    fn test_request_payload_shape() {
        let value = serde_json::to_value(request("hello")).unwrap();
        assert_eq!(value["message"], "hello");
        assert_eq!(value["conversationId"], "conv_1_abcdefghi");
        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(timestamp.ends_with('Z'));
    }
}
