use base64::Engine as _;
use serde_json::{json, Value};
use zeroize::Zeroizing;

use crate::error::{Result, TallyError};
use crate::models::ReceiptImage;

/// A hosted multimodal model: image bytes and a prompt in, free text out.
pub trait VisionModel: Send + Sync {
    fn generate(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<String>;
}

/// Read the image from disk and send it with `prompt`.
pub fn call(model: &dyn VisionModel, image: &ReceiptImage, prompt: &str) -> Result<String> {
    let bytes = image.read_bytes()?;
    log::debug!("{}: {} bytes -> model", image.file_name(), bytes.len());
    model.generate(&bytes, image.mime_type(), prompt)
}

/// Remove markdown code fences (```json ... ```) around a model reply.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
        text = rest.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text
}

pub fn parse_json_response(raw: &str) -> Result<Value> {
    let stripped = strip_code_fence(raw);
    serde_json::from_str(stripped).map_err(|e| {
        let preview: String = stripped.chars().take(200).collect();
        TallyError::ResponseParse(format!("{e} in {preview:?}"))
    })
}

// ---------------------------------------------------------------------------
// Gemini REST client
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    agent: ureq::Agent,
    base_url: String,
    model: String,
    api_key: Zeroizing<String>,
}

// Non-2xx replies are read so the error body reaches the user.
fn http_agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent()
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            agent: http_agent(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: Zeroizing::new(api_key.to_string()),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

impl VisionModel for GeminiClient {
    fn generate(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<String> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": mime_type,
                            "data": base64::engine::general_purpose::STANDARD.encode(image),
                        }
                    },
                    { "text": prompt }
                ]
            }]
        });
        let body_str =
            serde_json::to_string(&payload).map_err(|e| TallyError::ModelCall(e.to_string()))?;

        let mut response = self
            .agent
            .post(&self.endpoint())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", self.api_key.as_str())
            .send(&body_str)
            .map_err(|e| TallyError::ModelCall(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TallyError::ModelCall(format!("failed to read response: {e}")))?;
        if status != 200 {
            return Err(TallyError::ModelCall(format!("status {status}: {body}")));
        }
        response_text(&body)
    }
}

/// Concatenate the text parts of the first candidate in a `generateContent` reply.
pub fn response_text(body: &str) -> Result<String> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| TallyError::ModelCall(format!("invalid response json: {e}")))?;
    let candidate = root
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| TallyError::ModelCall("response has no candidates".to_string()))?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Err(TallyError::ModelCall(format!(
            "response has no text (finish reason: {reason})"
        )));
    }
    Ok(text)
}

// ---------------------------------------------------------------------------
// OpenAI chat completions client
// ---------------------------------------------------------------------------

const OCR_SYSTEM_PROMPT: &str = "You are an OCR assistant for receipts.";
const CHAT_MAX_TOKENS: u32 = 500;

pub struct OpenAiClient {
    agent: ureq::Agent,
    base_url: String,
    model: String,
    api_key: Zeroizing<String>,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            agent: http_agent(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: Zeroizing::new(api_key.to_string()),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

/// Chat request carrying the image as a base64 data URL ahead of the prompt.
pub fn chat_payload(model: &str, image: &[u8], mime_type: &str, prompt: &str) -> Value {
    let data_url = format!(
        "data:{mime_type};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(image)
    );
    json!({
        "model": model,
        "max_tokens": CHAT_MAX_TOKENS,
        "messages": [
            { "role": "system", "content": OCR_SYSTEM_PROMPT },
            {
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": data_url } },
                    { "type": "text", "text": prompt }
                ]
            }
        ]
    })
}

impl VisionModel for OpenAiClient {
    fn generate(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<String> {
        let payload = chat_payload(&self.model, image, mime_type, prompt);
        let body_str =
            serde_json::to_string(&payload).map_err(|e| TallyError::ModelCall(e.to_string()))?;

        let mut response = self
            .agent
            .post(&self.endpoint())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key.as_str()))
            .send(&body_str)
            .map_err(|e| TallyError::ModelCall(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TallyError::ModelCall(format!("failed to read response: {e}")))?;
        if status != 200 {
            return Err(TallyError::ModelCall(format!("status {status}: {body}")));
        }
        chat_response_text(&body)
    }
}

/// The message text of the first choice in a chat completions reply.
pub fn chat_response_text(body: &str) -> Result<String> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| TallyError::ModelCall(format!("invalid response json: {e}")))?;
    let choice = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| TallyError::ModelCall("response has no choices".to_string()))?;

    let text = choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if text.is_empty() {
        let reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Err(TallyError::ModelCall(format!(
            "response has no text (finish reason: {reason})"
        )));
    }
    Ok(text.to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence_json_block() {
        let raw = "```json\n{\"date\": \"2025-07-22 18:34\"}\n```";
        assert_eq!(strip_code_fence(raw), "{\"date\": \"2025-07-22 18:34\"}");
    }

    #[test]
    fn test_strip_code_fence_plain_block_and_bare() {
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_json_response() {
        let value = parse_json_response("```json\n{\"employee\": \"김익현\", \"route\": \"회사-집\"}\n```")
            .unwrap();
        assert_eq!(value["employee"], "김익현");
        assert_eq!(value["route"], "회사-집");
    }

    #[test]
    fn test_parse_json_response_rejects_prose() {
        let err = parse_json_response("I could not read this receipt.").unwrap_err();
        assert!(matches!(err, TallyError::ResponseParse(_)));
    }

    #[test]
    fn test_response_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"date\":"},{"text":" \"\"}"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(response_text(body).unwrap(), "{\"date\": \"\"}");
    }

    #[test]
    fn test_response_text_without_text_is_model_error() {
        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        let err = response_text(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
        assert!(matches!(response_text("{}"), Err(TallyError::ModelCall(_))));
    }

    #[test]
    fn test_chat_response_text_reads_first_choice() {
        let body = r#"{"id":"chatcmpl-1","choices":[{"index":0,"message":{"role":"assistant","content":"```json\n{\"date\": \"2025-07-22 18:34\", \"price\": \"12700\"}\n```"},"finish_reason":"stop"}]}"#;
        let text = chat_response_text(body).unwrap();
        let value = parse_json_response(&text).unwrap();
        assert_eq!(value["date"], "2025-07-22 18:34");
        assert_eq!(value["price"], "12700");
    }

    #[test]
    fn test_chat_response_without_content_is_model_error() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null},"finish_reason":"content_filter"}]}"#;
        let err = chat_response_text(body).unwrap_err();
        assert!(err.to_string().contains("content_filter"));
        assert!(matches!(chat_response_text(r#"{"choices":[]}"#), Err(TallyError::ModelCall(_))));
        assert!(matches!(chat_response_text("not json"), Err(TallyError::ModelCall(_))));
    }

    #[test]
    fn test_chat_payload_sends_image_as_data_url() {
        let payload = chat_payload("gpt-4o", b"abc", "image/png", "read it");
        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["messages"][0]["role"], "system");
        let parts = &payload["messages"][1]["content"];
        assert_eq!(parts[0]["image_url"]["url"], "data:image/png;base64,YWJj");
        assert_eq!(parts[1]["text"], "read it");
    }

    #[test]
    fn test_call_reads_image_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"front-a").unwrap();
        let model = testing::ScriptedModel::new().reply(b"front-a", "hello", "world");
        let out = call(&model, &ReceiptImage::new(&path), "hello").unwrap();
        assert_eq!(out, "world");
    }
}
