//! Gemini (Google) image service.

use crate::error::{parse_retry_after, sanitize_error_message, DekovizError, Result};
use crate::image::{ImageFile, ImagePayload};
use crate::service::ImageService;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.5-flash";

/// Instruction sent after the room and furniture images in a visualize call.
const VISUALIZE_INSTRUCTION: &str = "The first image shows a room. The second image shows a piece \
of furniture. Place the furniture naturally into the room, matching the room's perspective, \
scale, lighting and shadows. Keep the room otherwise unchanged and return a single \
photorealistic image.";

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Nano Banana - Gemini 2.5 Flash Image (fast, economical).
    #[default]
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image (highest quality).
    NanoBananaPro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "nano-banana-pro-preview",
        }
    }
}

/// Builder for GeminiService.
#[derive(Debug, Clone, Default)]
pub struct GeminiServiceBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    analysis_model: Option<String>,
    base_url: Option<String>,
}

impl GeminiServiceBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model used for generate, edit and visualize.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Sets the text model used for analyze (default `gemini-2.5-flash`).
    pub fn analysis_model(mut self, model: impl Into<String>) -> Self {
        self.analysis_model = Some(model.into());
        self
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the service, resolving the API key.
    pub fn build(self) -> Result<GeminiService> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .ok_or_else(|| {
                DekovizError::Auth("GOOGLE_API_KEY not set and no API key provided".into())
            })?;

        Ok(GeminiService {
            client: reqwest::Client::new(),
            api_key,
            model: self.model,
            analysis_model: self
                .analysis_model
                .unwrap_or_else(|| DEFAULT_ANALYSIS_MODEL.to_string()),
            base_url: self
                .base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

/// Gemini-backed [`ImageService`].
pub struct GeminiService {
    client: reqwest::Client,
    api_key: String,
    model: GeminiModel,
    analysis_model: String,
    base_url: String,
}

impl GeminiService {
    /// Creates a new `GeminiServiceBuilder`.
    pub fn builder() -> GeminiServiceBuilder {
        GeminiServiceBuilder::new()
    }

    /// Returns the image model in use.
    pub fn model(&self) -> GeminiModel {
        self.model
    }

    async fn generate_content(&self, model: &str, body: &GeminiRequest) -> Result<GeminiCandidate> {
        let start = Instant::now();
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        tracing::debug!(
            model,
            duration_ms = start.elapsed().as_millis() as u64,
            "gemini generateContent completed"
        );

        first_candidate(gemini_response)
    }

    async fn generate_image(&self, images: &[&ImageFile], prompt: &str) -> Result<ImagePayload> {
        let body = GeminiRequest::image(images, prompt);
        let candidate = self.generate_content(self.model.as_str(), &body).await?;
        extract_image(candidate)
    }
}

#[async_trait]
impl ImageService for GeminiService {
    async fn analyze(&self, image: &ImageFile, prompt: &str) -> Result<String> {
        let body = GeminiRequest::analysis(image, prompt);
        let candidate = self.generate_content(&self.analysis_model, &body).await?;
        extract_text(candidate)
    }

    async fn generate(&self, prompt: &str) -> Result<ImagePayload> {
        self.generate_image(&[], prompt).await
    }

    async fn edit(&self, image: &ImageFile, prompt: &str) -> Result<ImagePayload> {
        self.generate_image(&[image], prompt).await
    }

    async fn visualize(
        &self,
        environment: &ImageFile,
        model: &ImageFile,
    ) -> Result<ImagePayload> {
        self.generate_image(&[environment, model], VISUALIZE_INSTRUCTION)
            .await
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models/{}", self.base_url, self.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(DekovizError::Auth("Invalid API key".into())),
            404 => Err(DekovizError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            )),
            s if !(200..300).contains(&s) => Err(DekovizError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> DekovizError {
    let text = sanitize_error_message(text);
    match status {
        402 => DekovizError::Billing(
            "Gemini billing issue: enable billing at https://aistudio.google.com".into(),
        ),
        404 => DekovizError::InvalidRequest(
            "Model not found. Verify the model name is correct.".into(),
        ),
        429 => DekovizError::RateLimited {
            retry_after: parse_retry_after(headers).map(std::time::Duration::from_secs),
        },
        401 | 403 => DekovizError::Auth(text),
        _ => {
            let lower = text.to_lowercase();
            if lower.contains("safety")
                || lower.contains("blocked")
                || lower.contains("content_policy")
                || lower.contains("prohibited")
            {
                DekovizError::ContentBlocked(text)
            } else {
                DekovizError::Api {
                    status,
                    message: text,
                }
            }
        }
    }
}

/// Checks prompt feedback and finish reason, returning the first candidate.
fn first_candidate(response: GeminiResponse) -> Result<GeminiCandidate> {
    // Blocks come back as HTTP 200
    if let Some(feedback) = response.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            let msg = feedback
                .block_reason_message
                .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
            return Err(DekovizError::ContentBlocked(msg));
        }
    }

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        DekovizError::UnexpectedResponse("No candidates in Gemini response".into())
    })?;

    if let Some(ref finish_reason) = candidate.finish_reason {
        match finish_reason.as_str() {
            "SAFETY"
            | "IMAGE_SAFETY"
            | "IMAGE_PROHIBITED_CONTENT"
            | "IMAGE_RECITATION"
            | "RECITATION"
            | "PROHIBITED_CONTENT"
            | "BLOCKLIST" => {
                return Err(DekovizError::ContentBlocked(format!(
                    "Content blocked by Gemini safety filter: {}",
                    finish_reason
                )));
            }
            "IMAGE_OTHER" | "NO_IMAGE" => {
                return Err(DekovizError::UnexpectedResponse(format!(
                    "Generation failed: {}. Try a different prompt.",
                    finish_reason
                )));
            }
            _ => {} // STOP, MAX_TOKENS, etc. are normal
        }
    }

    Ok(candidate)
}

fn candidate_parts(candidate: GeminiCandidate) -> Result<Vec<GeminiPartResponse>> {
    candidate
        .content
        .map(|c| c.parts)
        .ok_or_else(|| DekovizError::UnexpectedResponse("No content in Gemini candidate".into()))
}

fn extract_image(candidate: GeminiCandidate) -> Result<ImagePayload> {
    let inline_data = candidate_parts(candidate)?
        .into_iter()
        .find_map(|p| p.inline_data)
        .ok_or_else(|| {
            DekovizError::UnexpectedResponse("No image data in Gemini response".into())
        })?;

    Ok(ImagePayload::from_base64(
        &inline_data.mime_type,
        &inline_data.data,
    ))
}

fn extract_text(candidate: GeminiCandidate) -> Result<String> {
    let text: Vec<String> = candidate_parts(candidate)?
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if text.is_empty() {
        return Err(DekovizError::UnexpectedResponse(
            "No text in Gemini response".into(),
        ));
    }
    Ok(text.join(""))
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

impl GeminiRequestPart {
    fn image(file: &ImageFile) -> Self {
        Self::InlineData {
            inline_data: GeminiInlineData {
                mime_type: file.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&file.data),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
}

impl GeminiRequest {
    /// Image parts first, then the prompt, asking for an image back.
    fn image(images: &[&ImageFile], prompt: &str) -> Self {
        let mut parts: Vec<GeminiRequestPart> =
            images.iter().map(|f| GeminiRequestPart::image(f)).collect();
        parts.push(GeminiRequestPart::Text {
            text: prompt.to_string(),
        });

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: Some(GeminiConfig {
                response_modalities: vec!["IMAGE".to_string()],
            }),
        }
    }

    fn analysis(image: &ImageFile, prompt: &str) -> Self {
        Self {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiRequestPart::image(image),
                    GeminiRequestPart::Text {
                        text: prompt.to_string(),
                    },
                ],
            }],
            generation_config: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}
