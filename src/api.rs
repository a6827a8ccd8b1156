use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::chat::Role;
use crate::error::ApiError;
use crate::session::TokenStore;

/// One entry of the conversation as the backend sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Body of a `/login` answer. Every field is optional; the caller decides
/// what counts as success.
#[derive(Debug, Clone, Default)]
pub struct LoginResponse {
    pub status: Option<String>,
    pub token: Option<String>,
    pub message: Option<String>,
}

impl LoginResponse {
    /// Fields that are missing or not strings read as absent.
    fn from_json(body: &Value) -> Self {
        let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_string);
        Self {
            status: field("status"),
            token: field("token"),
            message: field("message"),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [WireMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    reply: Option<String>,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    filename: Option<&'a str>,
    download: bool,
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Attach the stored bearer token, if any. No token means no header.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.token() {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// The body is decoded whatever the status code, because rejections carry
    /// their reason in `message`.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let url = format!("{}/login", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        tracing::debug!(status = response.status().as_u16(), "login answered");
        let body: Value = response.json().await?;
        Ok(LoginResponse::from_json(&body))
    }

    pub async fn chat(&self, messages: &[WireMessage]) -> Result<String, ApiError> {
        let url = format!("{}/chat", self.base_url);

        let response = self
            .authorized(self.client.post(&url))
            .json(&ChatRequest { messages })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response.reply.unwrap_or_else(|| "…".to_string()))
    }

    /// Returns the raw audio payload.
    pub async fn tts(&self, text: &str) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}/tts", self.base_url);
        tracing::info!(len = text.chars().count(), "fetching speech audio");

        let response = self
            .authorized(self.client.post(&url))
            .json(&TtsRequest {
                text,
                filename: None,
                download: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
