use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How the chat endpoint should obtain the user's utterance.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InputType {
    #[default]
    Text,
    Speech,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(
        default,
        rename = "type",
        deserialize_with = "deserialize_input_type"
    )]
    pub input_type: InputType,
}

/// Only an exact `"speech"` selects the microphone; any other value,
/// `null` included, is treated as text.
fn deserialize_input_type<'de, D>(deserializer: D) -> Result<InputType, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Known(InputType),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Known(input_type) => input_type,
        Raw::Other(_) => InputType::Text,
    })
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SpeakRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Body returned by `/api/chat` and `/api/speak`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: ResponseStatus::Success,
            response: None,
            user_input: None,
            message: None,
        }
    }

    pub fn reply(response: impl Into<String>, user_input: Option<String>) -> Self {
        Self {
            response: Some(response.into()),
            user_input,
            ..Self::success()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            response: None,
            user_input: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionResult {
    pub leaf_name: String,
    pub status: String,
    pub confidence: String,
    pub cause: String,
    pub treatment: String,
    pub prevention: String,
    pub class_index: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn input_type_parses_lowercase() {
        assert_eq!(InputType::from_str("speech").unwrap(), InputType::Speech);
        assert_eq!(InputType::Text.to_string(), "text");
    }

    #[test]
    fn chat_request_defaults_to_text() {
        let request: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(request.input_type, InputType::Text);
        assert_eq!(request.message, "hi");
    }

    #[test]
    fn chat_request_unknown_type_falls_back_to_text() {
        for body in [
            r#"{"message":"hi","type":"voice"}"#,
            r#"{"message":"hi","type":null}"#,
            r#"{"message":"hi","type":"Speech"}"#,
            r#"{"message":"hi","type":3}"#,
        ] {
            let request: ChatRequest = serde_json::from_str(body).unwrap();
            assert_eq!(request.input_type, InputType::Text, "{body}");
        }

        let request: ChatRequest = serde_json::from_str(r#"{"type":"speech"}"#).unwrap();
        assert_eq!(request.input_type, InputType::Speech);
    }

    #[test]
    fn error_response_omits_reply_fields() {
        let body = serde_json::to_value(StatusResponse::error("No text provided")).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "No text provided");
        assert!(body.get("response").is_none());
        assert!(body.get("user_input").is_none());
    }
}
