//! reqwest-backed `RemoteGateway`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    CompletionReceipt, EquipReceipt, ExamPayload, LoginResponse, PurchaseReceipt, RemoteError,
    RemoteExam, RemoteGateway, RemoteResult, TokenProvider,
};
use crate::config::ClientConfig;
use crate::models::{InventoryItem, RemoteExamId, ShopItem, UserProfile};
use crate::util::compact_text;

#[derive(Clone)]
pub struct HttpGateway {
    base_url: String,
    client: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> RemoteResult<Self> {
        let config = config
            .clone()
            .normalized()
            .map_err(|error| RemoteError::InvalidConfiguration(error.to_string()))?;

        Ok(Self {
            base_url: config.api_base_url.clone(),
            client: Client::builder().timeout(config.request_timeout()).build()?,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, "application/json");
        match self.tokens.token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self.authorized(request).await.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED => {
                tracing::warn!("API rejected the bearer token; clearing it");
                self.tokens.invalidate().await;
                Err(RemoteError::Unauthorized)
            }
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(RemoteError::Api {
                    status: status.as_u16(),
                    message: parse_api_error(status, &body),
                })
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = self.execute(request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|error| {
            RemoteError::InvalidPayload(format!("{error}: {}", compact_text(&body)))
        })
    }

    async fn send_empty(&self, request: RequestBuilder) -> RemoteResult<()> {
        self.execute(request).await?;
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    student_id: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct PasswordChange<'a> {
    password: &'a str,
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn list_exams(&self) -> RemoteResult<Vec<RemoteExam>> {
        self.send_json(self.client.get(self.url("/exams"))).await
    }

    async fn get_exam(&self, id: RemoteExamId) -> RemoteResult<RemoteExam> {
        self.send_json(self.client.get(self.url(&format!("/exams/{id}"))))
            .await
    }

    async fn create_exam(&self, payload: &ExamPayload) -> RemoteResult<RemoteExam> {
        self.send_json(self.client.post(self.url("/exams")).json(payload))
            .await
    }

    async fn update_exam(
        &self,
        id: RemoteExamId,
        payload: &ExamPayload,
    ) -> RemoteResult<RemoteExam> {
        self.send_json(
            self.client
                .patch(self.url(&format!("/exams/{id}")))
                .json(payload),
        )
        .await
    }

    async fn delete_exam(&self, id: RemoteExamId) -> RemoteResult<()> {
        self.send_empty(self.client.delete(self.url(&format!("/exams/{id}"))))
            .await
    }

    async fn complete_exam(&self, id: RemoteExamId) -> RemoteResult<CompletionReceipt> {
        self.send_json(
            self.client
                .post(self.url(&format!("/exams/{id}/complete"))),
        )
        .await
    }

    async fn login(&self, student_id: &str, password: &str) -> RemoteResult<LoginResponse> {
        let student_id = student_id.trim();
        if student_id.is_empty() || password.is_empty() {
            return Err(RemoteError::InvalidConfiguration(
                "student id and password must not be empty".to_string(),
            ));
        }

        let response: LoginResponse = self
            .send_json(self.client.post(self.url("/auth/login")).json(&LoginRequest {
                student_id,
                password,
            }))
            .await?;

        if response.access_token.trim().is_empty() {
            return Err(RemoteError::InvalidPayload(
                "login response did not include access_token".to_string(),
            ));
        }
        Ok(response)
    }

    async fn fetch_profile(&self) -> RemoteResult<UserProfile> {
        self.send_json(self.client.get(self.url("/users/profile")))
            .await
    }

    async fn change_password(&self, new_password: &str) -> RemoteResult<UserProfile> {
        self.send_json(
            self.client
                .patch(self.url("/users/profile"))
                .json(&PasswordChange {
                    password: new_password,
                }),
        )
        .await
    }

    async fn list_shop_items(&self) -> RemoteResult<Vec<ShopItem>> {
        self.send_json(self.client.get(self.url("/shop/items")))
            .await
    }

    async fn purchase_item(&self, item_id: i64) -> RemoteResult<PurchaseReceipt> {
        self.send_json(
            self.client
                .post(self.url(&format!("/shop/purchase/{item_id}"))),
        )
        .await
    }

    async fn list_inventory(&self) -> RemoteResult<Vec<InventoryItem>> {
        self.send_json(self.client.get(self.url("/inventory")))
            .await
    }

    async fn equip_item(&self, item_id: i64) -> RemoteResult<EquipReceipt> {
        self.send_json(
            self.client
                .post(self.url(&format!("/inventory/equip/{item_id}"))),
        )
        .await
    }

    async fn unequip_item(&self) -> RemoteResult<()> {
        self.send_empty(self.client.post(self.url("/inventory/unequip")))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Error text from a `{ message, error }` body; `message` may be a list of
/// validation failures.
fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        let message = match payload.message {
            Some(serde_json::Value::String(message)) => Some(message),
            Some(serde_json::Value::Array(messages)) => Some(
                messages
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => None,
        };
        if let Some(message) = message.filter(|m| !m.trim().is_empty()).or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}
