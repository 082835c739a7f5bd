//! JSON-over-HTTP image service backend
//!
//! Images travel as base64 data URIs in both directions. The service exposes
//! `POST {endpoint}/generate` and `POST {endpoint}/edit`.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use reskin_config::Config;
use reskin_utils::error::GenerationError;
use reskin_utils::imaging::ImageFormat;

use crate::http_client::HttpClient;
use crate::types::{EditRequest, GenerateRequest, GenerationBackend, GenerationOutput};

const PROVIDER: &str = "http";

#[derive(Clone)]
pub struct HttpImageBackend {
    client: Arc<HttpClient>,
    endpoint: String,
    api_key: String,
    default_model: Option<String>,
    timeout: Duration,
}

impl HttpImageBackend {
    /// # Errors
    ///
    /// Returns `GenerationError::Misconfiguration` if the HTTP client cannot be constructed
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        default_model: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model,
            timeout,
        })
    }

    /// Build from the `[generation]` section.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Misconfiguration` if:
    /// - No endpoint is configured
    /// - The API key environment variable is not set
    pub fn new_from_config(config: &Config) -> Result<Self, GenerationError> {
        let endpoint = config.generation.endpoint.clone().ok_or_else(|| {
            GenerationError::Misconfiguration(
                "No generation endpoint configured. \
                 Set [generation] endpoint = \"https://...\" or use --dry-run."
                    .to_string(),
            )
        })?;

        let api_key_env = config
            .generation
            .api_key_env
            .as_deref()
            .unwrap_or(reskin_config::DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(api_key_env).map_err(|_| {
            GenerationError::Misconfiguration(format!(
                "Generation API key not found in environment variable '{api_key_env}'. \
                 Set it or configure a different api_key_env in [generation]."
            ))
        })?;

        let timeout = Duration::from_secs(
            config
                .generation
                .timeout_secs
                .unwrap_or(reskin_config::DEFAULT_GENERATION_TIMEOUT_SECS),
        );

        Self::new(endpoint, api_key, config.generation.model.clone(), timeout)
    }

    fn model_for(&self, requested: Option<&String>) -> Option<String> {
        requested.cloned().or_else(|| self.default_model.clone())
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<GenerationOutput, GenerationError> {
        let url = format!("{}/{path}", self.endpoint);
        let request = self
            .client
            .inner()
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(body);

        let response = self
            .client
            .execute_with_retry(request, timeout.min(self.timeout), PROVIDER)
            .await?;

        let body: ImageResponse = response.json().await.map_err(|e| {
            GenerationError::Transport(format!("Failed to parse image service response: {e}"))
        })?;
        body.into_output()
    }
}

#[async_trait]
impl GenerationBackend for HttpImageBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        request.validate()?;
        let model = self.model_for(request.options.model.as_ref());

        debug!(
            provider = PROVIDER,
            model = ?model,
            count = request.count,
            "Invoking image generation"
        );

        let body = GenerateBody {
            model,
            prompt: &request.prompt,
            n: request.count,
            width: request.options.viewport.width,
            height: request.options.viewport.height,
            metadata: &request.options.metadata,
        };
        self.post("generate", &body, request.options.timeout).await
    }

    async fn edit(&self, request: EditRequest) -> Result<GenerationOutput, GenerationError> {
        request.validate()?;
        let model = self.model_for(request.options.model.as_ref());

        let image = to_data_uri(&request.base_image.load().await?);
        let mut references = Vec::with_capacity(request.references.len());
        for reference in &request.references {
            references.push(to_data_uri(&reference.load().await?));
        }

        debug!(
            provider = PROVIDER,
            model = ?model,
            references = references.len(),
            strength = request.strength,
            "Invoking image edit"
        );

        let body = EditBody {
            model,
            prompt: &request.prompt,
            image,
            references,
            strength: request.strength,
            width: request.options.viewport.width,
            height: request.options.viewport.height,
            metadata: &request.options.metadata,
        };
        self.post("edit", &body, request.options.timeout).await
    }
}

/// Encode image bytes as a `data:` URI, sniffing the MIME type.
pub fn to_data_uri(bytes: &[u8]) -> String {
    let mime = ImageFormat::detect(bytes).map_or("image/png", |f| f.mime_type());
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Decode a `data:` URI or bare base64 payload.
///
/// # Errors
///
/// Returns `GenerationError::Transport` if the payload is not valid base64.
pub fn from_data_uri(payload: &str) -> Result<Vec<u8>, GenerationError> {
    let encoded = match payload.split_once(";base64,") {
        Some((_, data)) => data,
        None => payload,
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| GenerationError::Transport(format!("Invalid image payload: {e}")))
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    prompt: &'a str,
    n: u32,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    metadata: &'a std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct EditBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    prompt: &'a str,
    image: String,
    references: Vec<String>,
    strength: f64,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    metadata: &'a std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    images: Vec<ImagePayload>,
    #[serde(default)]
    cost: Option<f64>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagePayload {
    data: String,
}

impl ImageResponse {
    fn into_output(self) -> Result<GenerationOutput, GenerationError> {
        if self.images.is_empty() {
            return Err(GenerationError::EmptyResult(
                "image service response contained no images".to_string(),
            ));
        }
        let images = self
            .images
            .iter()
            .map(|img| from_data_uri(&img.data))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GenerationOutput {
            images,
            cost: self.cost,
            provider: PROVIDER.to_string(),
            model_used: self.model,
        })
    }
}
