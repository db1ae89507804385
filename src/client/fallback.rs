//! Fallback API over HTTP. Thin reqwest wrapper around the messages
//! resource, speaking the same wire conventions as the live channel.

use std::future::Future;

use crate::{
    fallback::{ConversationSnapshot, MarkReadReceipt, SendMessageBody, SendReceipt},
    rooms::RoomKey,
};

use super::outbox::{FallbackApi, FallbackError};

#[derive(Debug, Clone)]
pub struct HttpFallback {
    base_url: String,
    token: String,
    user_id: i64,
    http: reqwest::Client,
}

impl HttpFallback {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, user_id: i64) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            user_id,
            http: reqwest::Client::new(),
        }
    }

    fn scope(&self, key: &RoomKey) -> Vec<(&'static str, String)> {
        match key {
            RoomKey::Purchase(id) => vec![("purchaseId", id.to_string())],
            RoomKey::Direct(lo, hi) => {
                let peer = if *lo == self.user_id { *hi } else { *lo };
                vec![("conversationWith", peer.to_string())]
            }
        }
    }

    pub async fn fetch_messages(
        &self,
        key: &RoomKey,
    ) -> Result<ConversationSnapshot, FallbackError> {
        let response = self
            .http
            .get(format!("{}/messages", self.base_url))
            .query(&self.scope(key))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| FallbackError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(FallbackError::Status(response.status().as_u16()));
        }
        response.json().await.map_err(|_| FallbackError::Decode)
    }

    pub async fn mark_read(
        &self,
        key: &RoomKey,
        message_id: Option<i64>,
    ) -> Result<MarkReadReceipt, FallbackError> {
        let mut query = self.scope(key);
        if let Some(message_id) = message_id {
            query.push(("messageId", message_id.to_string()));
        }
        let response = self
            .http
            .patch(format!("{}/messages", self.base_url))
            .query(&query)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| FallbackError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(FallbackError::Status(response.status().as_u16()));
        }
        response.json().await.map_err(|_| FallbackError::Decode)
    }
}

impl FallbackApi for HttpFallback {
    fn send_message(
        &self,
        key: &RoomKey,
        content: &str,
        correlation_id: &str,
    ) -> impl Future<Output = Result<i64, FallbackError>> + Send {
        let body = SendMessageBody {
            content: content.to_owned(),
            receiver_id: match key {
                RoomKey::Purchase(_) => None,
                RoomKey::Direct(lo, hi) => Some(if *lo == self.user_id { *hi } else { *lo }),
            },
            purchase_id: key.purchase_id(),
            correlation_id: Some(correlation_id.to_owned()),
        };
        async move {
            let response = self
                .http
                .post(format!("{}/messages", self.base_url))
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await
                .map_err(|err| FallbackError::Transport(err.to_string()))?;
            if !response.status().is_success() {
                return Err(FallbackError::Status(response.status().as_u16()));
            }
            let receipt: SendReceipt = response.json().await.map_err(|_| FallbackError::Decode)?;
            Ok(receipt.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_direct_keys_to_the_peer() {
        let api = HttpFallback::new("http://localhost:8080", "tok-3", 3);
        assert_eq!(
            api.scope(&RoomKey::direct(3, 7)),
            vec![("conversationWith", "7".to_owned())]
        );
        assert_eq!(
            api.scope(&RoomKey::Purchase(501)),
            vec![("purchaseId", "501".to_owned())]
        );
    }
}
