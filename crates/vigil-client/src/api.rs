use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use vigil_types::api::{CreateCardRequest, CreateCommentRequest, CreateCommentResponse, MoveRequest, UpdateCardRequest};
use vigil_types::models::{Card, Column, CommentNode};

use crate::error::ClientError;
use crate::store::ClientStore;

/// HTTP client for board mutations. Every call carries the bearer token.
#[derive(Clone)]
pub struct BoardClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BoardClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path)).bearer_auth(&self.token)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = check(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.send(self.request(method, path).json(body)).await
    }

    async fn send_empty(&self, method: Method, path: &str) -> Result<(), ClientError> {
        check(self.request(method, path).send().await?).await?;
        Ok(())
    }

    // -- Cards --

    pub async fn list_column(&self, group_id: i64, column: Column) -> Result<Vec<Card>, ClientError> {
        let builder = self
            .request(Method::GET, &format!("/groups/{group_id}/prayers"))
            .query(&[("column", column.as_str())]);
        self.send(builder).await
    }

    pub async fn create_card(&self, group_id: i64, req: &CreateCardRequest) -> Result<Card, ClientError> {
        self.send_json(Method::POST, &format!("/groups/{group_id}/prayers"), req)
            .await
    }

    pub async fn update_card(&self, card_id: i64, req: &UpdateCardRequest) -> Result<Card, ClientError> {
        self.send_json(Method::PATCH, &format!("/prayers/{card_id}"), req).await
    }

    pub async fn move_card(&self, card_id: i64, req: &MoveRequest) -> Result<Card, ClientError> {
        self.send_json(Method::POST, &format!("/prayers/{card_id}/move"), req)
            .await
    }

    pub async fn bump_card(&self, card_id: i64) -> Result<Card, ClientError> {
        self.send(self.request(Method::POST, &format!("/prayers/{card_id}/bump")))
            .await
    }

    pub async fn delete_card(&self, card_id: i64) -> Result<(), ClientError> {
        self.send_empty(Method::DELETE, &format!("/prayers/{card_id}")).await
    }

    /// Returns false if the caller already was a participant.
    pub async fn join_card(&self, card_id: i64) -> Result<bool, ClientError> {
        let body: Value = self
            .send(self.request(Method::POST, &format!("/prayers/{card_id}/participants")))
            .await?;
        Ok(body["joined"].as_bool().unwrap_or(false))
    }

    // -- Comments --

    pub async fn list_comments(&self, card_id: i64) -> Result<Vec<CommentNode>, ClientError> {
        self.send(self.request(Method::GET, &format!("/prayers/{card_id}/comments")))
            .await
    }

    /// A closed thread comes back as `ok: false`, not as an error.
    pub async fn create_comment(
        &self,
        card_id: i64,
        req: &CreateCommentRequest,
    ) -> Result<CreateCommentResponse, ClientError> {
        self.send_json(Method::POST, &format!("/prayers/{card_id}/comments"), req)
            .await
    }

    pub async fn edit_comment(&self, comment_id: i64, body: &str) -> Result<CommentNode, ClientError> {
        self.send_json(Method::PATCH, &format!("/comments/{comment_id}"), &json!({ "body": body }))
            .await
    }

    pub async fn delete_comment(&self, comment_id: i64) -> Result<(), ClientError> {
        self.send_empty(Method::DELETE, &format!("/comments/{comment_id}"))
            .await
    }

    pub async fn set_comments_closed(&self, card_id: i64, closed: bool) -> Result<Card, ClientError> {
        self.send_json(
            Method::PUT,
            &format!("/prayers/{card_id}/comments-closed"),
            &json!({ "closed": closed }),
        )
        .await
    }

    // -- Recovery --

    /// Reload one column from the server, discarding optimistic state.
    pub async fn resync(&self, store: &mut ClientStore, group_id: i64, column: Column) -> Result<(), ClientError> {
        let cards = self.list_column(group_id, column).await?;
        store.replace_column(group_id, column, cards);
        Ok(())
    }

    /// Optimistic move: reorder locally, send, and fall back to a resync of
    /// both columns if the server refuses.
    pub async fn move_optimistically(
        &self,
        store: &mut ClientStore,
        card_id: i64,
        column: Column,
        index: usize,
    ) -> Result<Card, ClientError> {
        let Some((group_id, from)) = store.card(card_id).map(|c| (c.group_id, c.column)) else {
            return Err(ClientError::Config(format!("card {card_id} is not loaded")));
        };
        let Some(request) = store.apply_local_move(card_id, column, index) else {
            return Err(ClientError::Config(format!("card {card_id} is not loaded")));
        };

        match self.move_card(card_id, &request).await {
            Ok(card) => Ok(card),
            Err(e) => {
                tracing::warn!(card_id, error = %e, "Move rejected, resyncing");
                self.resync(store, group_id, column).await?;
                if from != column {
                    self.resync(store, group_id, from).await?;
                }
                Err(e)
            }
        }
    }
}

/// Turn non-success statuses into [`ClientError::Status`], keeping the
/// server's `error` message when it sent one.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<Value>().await {
        Ok(body) => body["error"].as_str().unwrap_or_default().to_string(),
        Err(_) => String::new(),
    };
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}
