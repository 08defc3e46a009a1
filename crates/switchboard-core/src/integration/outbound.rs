//! Outbound platform calls.
//!
//! An [`OutboundRequest`] is a platform API method plus its JSON parameters.
//! Handlers return one (directly, or indirectly through a text reply) and the
//! dispatcher hands it to the [`Delivery`](super::Delivery) collaborator.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::DeliveryError;

/// A platform API call awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    method: String,
    payload: Value,
}

impl OutboundRequest {
    /// Creates a request for an arbitrary API method.
    pub fn new(method: impl Into<String>, payload: Value) -> Self {
        Self {
            method: method.into(),
            payload,
        }
    }

    /// `sendMessage` to `chat_id`.
    pub fn send_message(chat_id: i64, text: impl Into<String>) -> Self {
        Self::new(
            "sendMessage",
            json!({ "chat_id": chat_id, "text": text.into() }),
        )
    }

    /// `answerCallbackQuery`, optionally with a notification text.
    pub fn answer_callback_query(callback_query_id: impl Into<String>, text: Option<&str>) -> Self {
        let mut payload = json!({ "callback_query_id": callback_query_id.into() });
        if let Some(text) = text {
            payload["text"] = Value::from(text);
        }
        Self::new("answerCallbackQuery", payload)
    }

    /// `answerInlineQuery` with a prepared result array.
    pub fn answer_inline_query(inline_query_id: impl Into<String>, results: Value) -> Self {
        Self::new(
            "answerInlineQuery",
            json!({ "inline_query_id": inline_query_id.into(), "results": results }),
        )
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Sets one top-level payload field, e.g. `parse_mode`.
    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.payload.is_object() {
            self.payload = json!({});
        }
        self.payload[key] = value.into();
        self
    }

    pub fn into_parts(self) -> (String, Value) {
        (self.method, self.payload)
    }

    /// Serializes the payload for transports that send JSON bodies.
    pub fn to_json(&self) -> Result<String, DeliveryError> {
        Ok(serde_json::to_string(&self.payload)?)
    }
}

/// The platform's own ok/not-ok response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
}

impl ApiResponse {
    /// A successful response carrying `result`.
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            description: None,
            error_code: None,
        }
    }

    /// A platform-level rejection.
    pub fn failure(error_code: i32, description: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            description: Some(description.into()),
            error_code: Some(error_code),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, DeliveryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Converts a not-ok envelope into [`DeliveryError::Rejected`].
    pub fn into_result(self) -> Result<Value, DeliveryError> {
        if self.ok {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(DeliveryError::Rejected {
                code: self.error_code.unwrap_or_default(),
                description: self.description.unwrap_or_default(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_payload() {
        let req = OutboundRequest::send_message(42, "hello");
        assert_eq!(req.method(), "sendMessage");
        assert_eq!(req.payload()["chat_id"], 42);
        assert_eq!(req.payload()["text"], "hello");
    }

    #[test]
    fn test_answer_callback_query_optional_text() {
        let bare = OutboundRequest::answer_callback_query("cb", None);
        assert!(bare.payload().get("text").is_none());

        let with_text = OutboundRequest::answer_callback_query("cb", Some("done"));
        assert_eq!(with_text.payload()["text"], "done");
        assert_eq!(with_text.method(), "answerCallbackQuery");
    }

    #[test]
    fn test_with_param() {
        let req = OutboundRequest::send_message(1, "*hi*").with_param("parse_mode", "Markdown");
        assert_eq!(req.payload()["parse_mode"], "Markdown");
    }

    #[test]
    fn test_api_response_parsing() {
        let ok = ApiResponse::from_json(r#"{"ok":true,"result":{"message_id":5}}"#).unwrap();
        assert_eq!(ok.into_result().unwrap()["message_id"], 5);

        let err = ApiResponse::from_json(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap();
        match err.into_result() {
            Err(DeliveryError::Rejected { code, description }) => {
                assert_eq!(code, 400);
                assert!(description.contains("chat not found"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
