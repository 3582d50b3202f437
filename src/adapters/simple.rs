//! Simplified single-field dialect: `{"message": "..."}` bodies accepted on
//! the chat-completions endpoint. Normalized into the full shape up front so
//! everything downstream, responses included, is plain chat-completions.

use crate::{
    error::GatewayError,
    schemas::{ChatCompletionsRequest, ChatMessage},
};

/// Rewrite a simplified body into the full chat-completions shape. Bodies
/// already carrying `messages` pass through untouched; `messages` wins when
/// both fields are present.
pub fn normalize(mut req: ChatCompletionsRequest) -> Result<ChatCompletionsRequest, GatewayError> {
    if req.messages.is_none() {
        match req.message.take() {
            Some(message) => {
                req.messages = Some(vec![ChatMessage::user(message)]);
            }
            None => {
                return Err(GatewayError::BadRequest(
                    "request must include either 'messages' or 'message'".to_string(),
                ));
            }
        }
    }
    req.message = None;
    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_message_becomes_a_user_turn() {
        let req: ChatCompletionsRequest =
            serde_json::from_value(json!({"message": "how long does the battery last"})).unwrap();
        let normalized = normalize(req).unwrap();
        let messages = normalized.messages.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "how long does the battery last");
        assert!(normalized.message.is_none());
    }

    #[test]
    fn full_shape_passes_through() {
        let req: ChatCompletionsRequest = serde_json::from_value(json!({
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        let normalized = normalize(req).unwrap();
        assert_eq!(normalized.messages.unwrap().len(), 1);
    }

    #[test]
    fn messages_win_over_message() {
        let req: ChatCompletionsRequest = serde_json::from_value(json!({
            "messages": [{"role": "user", "content": "from messages"}],
            "message": "from message"
        }))
        .unwrap();
        let normalized = normalize(req).unwrap();
        assert_eq!(normalized.messages.unwrap()[0].content, "from messages");
        assert!(normalized.message.is_none());
    }

    #[test]
    fn neither_field_is_a_bad_request() {
        let req = ChatCompletionsRequest::default();
        assert!(matches!(
            normalize(req),
            Err(GatewayError::BadRequest(_))
        ));
    }
}
