//! Deterministic offline backend for dry runs and tests.
//!
//! Produces placeholder PNGs at the requested viewport. Output bytes depend only
//! on the prompt (and base image for edits), so repeated runs are reproducible.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

use reskin_utils::canonicalization::{fingerprint, short_fingerprint};
use reskin_utils::error::GenerationError;
use reskin_utils::imaging::placeholder_png;
use reskin_utils::types::Viewport;

use crate::types::{EditRequest, GenerateRequest, GenerationBackend, GenerationOutput};

/// Size of stub images; inside the anchor pre-validation size window.
pub const STUB_IMAGE_BYTES: usize = 64 * 1024;

pub struct StubBackend {
    viewport: Viewport,
    image_len: usize,
    calls: AtomicU32,
}

impl StubBackend {
    #[must_use]
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            image_len: STUB_IMAGE_BYTES,
            calls: AtomicU32::new(0),
        }
    }

    /// Emit images of exactly `len` bytes.
    #[must_use]
    pub fn with_image_len(mut self, len: usize) -> Self {
        self.image_len = len;
        self
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn image(&self, viewport: Viewport, seed_text: &str, index: u32) -> Vec<u8> {
        let seed = u64::from_str_radix(&short_fingerprint(seed_text), 16).unwrap_or_default();
        // Requests for a different viewport than the stub default win.
        let size = if viewport == Viewport::default() { self.viewport } else { viewport };
        placeholder_png(size.width, size.height, self.image_len, seed ^ u64::from(index))
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        request.validate()?;
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(provider = "stub", call = call, count = request.count, "Stub generate");

        let images = (0..request.count)
            .map(|i| self.image(request.options.viewport, &request.prompt, i))
            .collect();
        Ok(GenerationOutput::new(images, "stub"))
    }

    async fn edit(&self, request: EditRequest) -> Result<GenerationOutput, GenerationError> {
        request.validate()?;
        let base = request.base_image.load().await?;
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            provider = "stub",
            call = call,
            references = request.references.len(),
            strength = request.strength,
            "Stub edit"
        );

        let seed_text = format!("{}:{}", request.prompt, fingerprint(&base));
        Ok(GenerationOutput::new(
            vec![self.image(request.options.viewport, &seed_text, 0)],
            "stub",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerationOptions, ImageRef};
    use reskin_utils::imaging::read_dimensions;
    use reskin_utils::test_support::png_fixture;

    #[tokio::test]
    async fn test_generate_is_deterministic() {
        let stub = StubBackend::new(Viewport::new(1280, 800));
        let req = GenerateRequest::new("hero", 3, GenerationOptions::default());

        let first = stub.generate(req.clone()).await.unwrap();
        let second = stub.generate(req).await.unwrap();

        assert_eq!(first.images.len(), 3);
        assert_eq!(first.images, second.images);
        assert_ne!(first.images[0], first.images[1]);
        assert_eq!(read_dimensions(&first.images[0]), Some((1280, 800)));
        assert_eq!(first.images[0].len(), STUB_IMAGE_BYTES);
        assert!(first.cost.is_none());
        assert_eq!(stub.call_count(), 2);
    }

    #[tokio::test]
    async fn test_edit_uses_requested_viewport() {
        let stub = StubBackend::new(Viewport::DESKTOP).with_image_len(4096);
        let req = EditRequest::new(
            "restyle",
            ImageRef::Bytes(png_fixture(390, 844)),
            Vec::new(),
            0.6,
            GenerationOptions::for_viewport(Viewport::new(390, 844)),
        );
        let out = stub.edit(req).await.unwrap();
        assert_eq!(out.images[0].len(), 4096);
        assert_eq!(read_dimensions(&out.images[0]), Some((390, 844)));
    }

    #[tokio::test]
    async fn test_edit_validates_request() {
        let stub = StubBackend::new(Viewport::DESKTOP);
        let req = EditRequest::new(
            "restyle",
            ImageRef::Path("/missing/base.png".into()),
            Vec::new(),
            0.6,
            GenerationOptions::default(),
        );
        assert!(matches!(
            stub.edit(req).await,
            Err(GenerationError::InvalidRequest(_))
        ));
        assert_eq!(stub.call_count(), 0);
    }
}
