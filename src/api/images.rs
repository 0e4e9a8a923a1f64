use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::state::ProviderState;

const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Text-to-image request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl ImageRequest {
    #[must_use]
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            negative_prompt: None,
            count: None,
            width: None,
            height: None,
        }
    }
}

/// One generated image. Inline payloads land in `bytes`; images the
/// platform only links to keep their `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes: Option<Vec<u8>>,
    pub url: Option<String>,
}

/// Generate images from a text prompt.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidRequest`] for an empty prompt and
/// [`ProviderError::Translation`] when an image payload is not valid base64.
pub async fn text_to_image(
    state: &ProviderState,
    request: &ImageRequest,
) -> Result<Vec<GeneratedImage>, ProviderError> {
    if request.prompt.trim().is_empty() {
        return Err(ProviderError::InvalidRequest(
            "image prompt cannot be empty".to_string(),
        ));
    }
    let token = state.bearer_token().await?;
    let raw = state
        .transport
        .post_json(state.endpoints.image_generation(), &token, request)
        .await?;
    let images = parse_images(&raw)?;
    tracing::debug!(model = %request.model, count = images.len(), "Dashboard images generated");
    Ok(images)
}

fn parse_images(raw: &Value) -> Result<Vec<GeneratedImage>, ProviderError> {
    let items = raw
        .get("images")
        .or_else(|| raw.get("data"))
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);
    let mut images = Vec::with_capacity(items.len());
    for item in items {
        if let Some(image) = parse_image(item)? {
            images.push(image);
        }
    }
    Ok(images)
}

fn parse_image(item: &Value) -> Result<Option<GeneratedImage>, ProviderError> {
    // Bare strings are base64 payloads.
    if let Some(encoded) = item.as_str() {
        return Ok(Some(GeneratedImage {
            mime_type: DEFAULT_IMAGE_MIME.to_string(),
            bytes: Some(decode_base64(encoded)?),
            url: None,
        }));
    }
    let mime_type = item
        .get("mimeType")
        .or_else(|| item.get("mime_type"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_IMAGE_MIME)
        .to_string();
    let encoded = ["base64", "b64_json", "data"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str));
    let url = item.get("url").and_then(Value::as_str).map(str::to_string);
    if encoded.is_none() && url.is_none() {
        tracing::warn!(image = %item, "Skipping generated image without payload or url");
        return Ok(None);
    }
    Ok(Some(GeneratedImage {
        mime_type,
        bytes: encoded.map(decode_base64).transpose()?,
        url,
    }))
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, ProviderError> {
    // Some models return data URLs.
    let payload = encoded
        .split_once(";base64,")
        .map_or(encoded, |(_, payload)| payload);
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|err| ProviderError::Translation(format!("invalid image payload: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inline_and_url_images() {
        let images = parse_images(&json!({"images": [
            {"base64": "3q2+7w==", "mimeType": "image/jpeg"},
            {"url": "https://cdn.example.com/a.png"},
            "3q2+7w==",
            {"note": "nothing here"}
        ]}))
        .unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[0].bytes.as_deref(), Some(&[0xde, 0xad, 0xbe, 0xef][..]));
        assert_eq!(images[0].mime_type, "image/jpeg");
        assert!(images[1].bytes.is_none());
        assert_eq!(images[1].url.as_deref(), Some("https://cdn.example.com/a.png"));
        assert_eq!(images[2].mime_type, "image/png");
    }

    #[test]
    fn test_data_url_and_bad_base64() {
        let images = parse_images(&json!({"data": [{"b64_json": "data:image/png;base64,3q2+7w=="}]}))
            .unwrap();
        assert_eq!(images[0].bytes.as_ref().map(Vec::len), Some(4));
        assert!(parse_images(&json!({"images": ["!!!"]})).is_err());
    }

    #[test]
    fn test_request_wire_shape() {
        let mut request = ImageRequest::new("amazon.titan-image-generator-v2", "a cat");
        request.negative_prompt = Some("dogs".into());
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"model": "amazon.titan-image-generator-v2", "prompt": "a cat", "negativePrompt": "dogs"})
        );
    }
}
