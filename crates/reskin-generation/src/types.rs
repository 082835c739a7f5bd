//! Request/response types and the backend trait for image generation.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use reskin_utils::error::GenerationError;
use reskin_utils::types::Viewport;

/// Upper bound on reference images accepted by an edit call.
pub const MAX_REFERENCES: usize = 14;

/// Options shared by generate and edit calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Requested output size
    pub viewport: Viewport,
    /// Per-call timeout; backends clamp to their own maximum
    pub timeout: Duration,
    /// Model override; `None` means the backend default
    pub model: Option<String>,
    /// Provider-specific extras, passed through verbatim
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl GenerationOptions {
    #[must_use]
    pub fn for_viewport(viewport: Viewport) -> Self {
        Self {
            viewport,
            timeout: Duration::from_secs(reskin_config::DEFAULT_GENERATION_TIMEOUT_SECS),
            model: None,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::for_viewport(Viewport::default())
    }
}

/// An image handed to the service, either on disk or already in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Path(Utf8PathBuf),
    Bytes(Vec<u8>),
}

impl ImageRef {
    /// Read the image bytes.
    ///
    /// # Errors
    ///
    /// A missing or unreadable file and an empty buffer are both
    /// `GenerationError::InvalidRequest`: the request cannot be sent.
    pub async fn load(&self) -> Result<Vec<u8>, GenerationError> {
        let bytes = match self {
            Self::Path(path) => tokio::fs::read(path).await.map_err(|e| {
                GenerationError::InvalidRequest(format!("cannot read image {path}: {e}"))
            })?,
            Self::Bytes(bytes) => bytes.clone(),
        };
        if bytes.is_empty() {
            return Err(GenerationError::InvalidRequest(format!(
                "image {} is empty",
                self.describe()
            )));
        }
        Ok(bytes)
    }

    /// Short label for logs and error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.to_string(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }

    fn is_present(&self) -> bool {
        match self {
            Self::Path(path) => path.is_file(),
            Self::Bytes(bytes) => !bytes.is_empty(),
        }
    }
}

impl From<Utf8PathBuf> for ImageRef {
    fn from(path: Utf8PathBuf) -> Self {
        Self::Path(path)
    }
}

/// Text-to-image request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Number of images wanted (hero variants use more than one)
    pub count: u32,
    pub options: GenerationOptions,
}

impl GenerateRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>, count: u32, options: GenerationOptions) -> Self {
        Self {
            prompt: prompt.into(),
            count,
            options,
        }
    }

    /// Reject requests that cannot succeed before any call is made.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::InvalidRequest` for an empty prompt or a zero count.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("prompt is empty".to_string()));
        }
        if self.count == 0 {
            return Err(GenerationError::InvalidRequest(
                "at least one image must be requested".to_string(),
            ));
        }
        Ok(())
    }
}

/// Image-to-image request: restyle `base_image` guided by `references`.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub prompt: String,
    pub base_image: ImageRef,
    pub references: Vec<ImageRef>,
    /// 0.0 keeps the base image, 1.0 follows the prompt and references
    pub strength: f64,
    pub options: GenerationOptions,
}

impl EditRequest {
    #[must_use]
    pub fn new(
        prompt: impl Into<String>,
        base_image: ImageRef,
        references: Vec<ImageRef>,
        strength: f64,
        options: GenerationOptions,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            base_image,
            references,
            strength,
            options,
        }
    }

    /// Reject requests that cannot succeed before any call is made.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::InvalidRequest` when there are more than
    /// [`MAX_REFERENCES`] references, the base image is missing, the strength is
    /// outside `0..=1`, or the prompt is empty.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.references.len() > MAX_REFERENCES {
            return Err(GenerationError::InvalidRequest(format!(
                "{} reference images supplied, at most {MAX_REFERENCES} are accepted",
                self.references.len()
            )));
        }
        if !self.base_image.is_present() {
            return Err(GenerationError::InvalidRequest(format!(
                "base image {} is missing",
                self.base_image.describe()
            )));
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(GenerationError::InvalidRequest(format!(
                "strength {} is outside 0..=1",
                self.strength
            )));
        }
        if self.prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("prompt is empty".to_string()));
        }
        Ok(())
    }
}

/// Images returned by one call.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    pub images: Vec<Vec<u8>>,
    /// Cost reported by the provider, if it reports one
    pub cost: Option<f64>,
    pub provider: String,
    pub model_used: Option<String>,
}

impl GenerationOutput {
    #[must_use]
    pub fn new(images: Vec<Vec<u8>>, provider: impl Into<String>) -> Self {
        Self {
            images,
            cost: None,
            provider: provider.into(),
            model_used: None,
        }
    }

    #[must_use]
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// The first image, or `EmptyResult` when the provider sent none.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::EmptyResult` for an empty image list.
    pub fn into_first_image(self) -> Result<Vec<u8>, GenerationError> {
        self.images
            .into_iter()
            .next()
            .ok_or_else(|| {
                GenerationError::EmptyResult(format!("{} returned no images", self.provider))
            })
    }
}

/// Trait for image-generation backends.
///
/// All providers implement this trait so the engines can drive any service (or
/// the stub) without knowing its wire format. Implementations must call
/// `validate()` on the request before making a call.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Provider name used in logs and reports
    fn name(&self) -> &str;

    /// Generate `count` images from a prompt.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError` for transport, provider, budget and request failures.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerationOutput, GenerationError>;

    /// Restyle a base image guided by reference images.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError` for transport, provider, budget and request failures.
    async fn edit(&self, request: EditRequest) -> Result<GenerationOutput, GenerationError>;
}

/// Per-call cost bookkeeping.
///
/// Successful calls are charged what the provider reports, else the per-image
/// estimate. Failed calls that reached the provider are charged `failed_call`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub per_image: f64,
    pub failed_call: f64,
}

impl CostModel {
    #[must_use]
    pub fn from_config(config: &reskin_config::Config) -> Self {
        Self {
            per_image: config.cost_per_image(),
            failed_call: config.failed_call_cost(),
        }
    }

    #[must_use]
    pub fn charge_success(&self, output: &GenerationOutput) -> f64 {
        output
            .cost
            .unwrap_or(self.per_image * output.images.len().max(1) as f64)
    }

    /// Errors raised before a request left the process cost nothing.
    #[must_use]
    pub fn charge_failure(&self, error: &GenerationError) -> f64 {
        match error {
            GenerationError::InvalidRequest(_)
            | GenerationError::BudgetExceeded { .. }
            | GenerationError::Misconfiguration(_)
            | GenerationError::Unsupported(_) => 0.0,
            _ => self.failed_call,
        }
    }

    #[must_use]
    pub fn charge(&self, result: &Result<GenerationOutput, GenerationError>) -> f64 {
        match result {
            Ok(output) => self.charge_success(output),
            Err(e) => self.charge_failure(e),
        }
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            per_image: reskin_config::DEFAULT_COST_PER_IMAGE,
            failed_call: reskin_config::DEFAULT_COST_PER_IMAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reskin_utils::test_support::png_fixture;

    fn edit_with_refs(n: usize) -> EditRequest {
        EditRequest::new(
            "restyle",
            ImageRef::Bytes(png_fixture(10, 10)),
            (0..n).map(|_| ImageRef::Bytes(vec![1, 2, 3])).collect(),
            0.6,
            GenerationOptions::default(),
        )
    }

    #[test]
    fn test_edit_reference_cap() {
        assert!(edit_with_refs(14).validate().is_ok());
        let err = edit_with_refs(15).validate().unwrap_err();
        assert!(matches!(err, GenerationError::InvalidRequest(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_edit_missing_base_is_terminal() {
        let req = EditRequest::new(
            "restyle",
            ImageRef::Path("/definitely/not/here.png".into()),
            Vec::new(),
            0.5,
            GenerationOptions::default(),
        );
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("missing"), "{err}");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_edit_strength_bounds() {
        let mut req = edit_with_refs(0);
        req.strength = 1.5;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_generate_validation() {
        let opts = GenerationOptions::default();
        assert!(GenerateRequest::new("hero", 3, opts.clone()).validate().is_ok());
        assert!(GenerateRequest::new("hero", 0, opts.clone()).validate().is_err());
        assert!(GenerateRequest::new("  ", 1, opts).validate().is_err());
    }

    #[tokio::test]
    async fn test_image_ref_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("a.png")).unwrap();
        std::fs::write(&path, b"png").unwrap();

        assert_eq!(ImageRef::Path(path).load().await.unwrap(), b"png");
        assert!(ImageRef::Bytes(Vec::new()).load().await.is_err());
    }

    #[test]
    fn test_cost_model() {
        let model = CostModel {
            per_image: 0.04,
            failed_call: 0.01,
        };
        let reported = GenerationOutput::new(vec![vec![1]], "x").with_cost(0.2);
        assert_eq!(model.charge_success(&reported), 0.2);

        let estimated = GenerationOutput::new(vec![vec![1], vec![2], vec![3]], "x");
        assert!((model.charge_success(&estimated) - 0.12).abs() < 1e-9);

        assert_eq!(
            model.charge_failure(&GenerationError::ProviderOutage("503".into())),
            0.01
        );
        assert_eq!(
            model.charge_failure(&GenerationError::InvalidRequest("too many".into())),
            0.0
        );
    }

    #[test]
    fn test_into_first_image() {
        assert!(GenerationOutput::new(Vec::new(), "x").into_first_image().is_err());
        assert_eq!(
            GenerationOutput::new(vec![vec![7]], "x").into_first_image().unwrap(),
            vec![7]
        );
    }
}
