//! Shared fixtures for the integration tests.
//!
//! Each test gets its own temporary directory holding an inbox of captured
//! screens and the project root, plus scripted backends layered over the stub.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use reskin::engine::{CoherenceItem, DeviationAssessment, DeviationScorer};
use reskin::{ApprovalMode, Config, GenerationBackend, PipelineHandle, StubBackend};
use reskin_generation::{EditRequest, GenerateRequest, GenerationError, GenerationOutput, ImageRef};
use reskin_utils::paths::ProjectPaths;
use reskin_utils::test_support::png_fixture;

pub const PROJECT_ID: &str = "shop";

pub struct Project {
    pub handle: PipelineHandle,
    pub inbox: Utf8PathBuf,
    pub temp: TempDir,
}

impl Project {
    pub fn root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.temp.path().to_path_buf()).unwrap()
    }

    /// A second handle over the same project, as after a process restart.
    pub fn reopen_with(
        &self,
        config: Config,
        backend: Arc<dyn GenerationBackend>,
    ) -> PipelineHandle {
        let paths = self.handle.paths().clone();
        PipelineHandle::with_backend(paths, PROJECT_ID, config, backend).unwrap()
    }
}

/// `screen-01`, `screen-02`, ...
pub fn screen_ids(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("screen-{i:02}")).collect()
}

/// Config used by the integration tests: stub provider, no backoff, auto gates.
pub fn auto_config() -> Config {
    let mut config = Config::minimal_for_testing();
    config.defaults.approval_mode = Some(ApprovalMode::Auto);
    config
}

/// Write captures for `ids` and create, initialize and import the project.
pub fn project_with(
    ids: &[String],
    config: Config,
    backend: Arc<dyn GenerationBackend>,
) -> Project {
    let temp = TempDir::new().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let inbox = base.join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();

    let mut screens = Vec::new();
    for id in ids {
        std::fs::write(inbox.join(format!("{id}.png")), png_fixture(1440, 900)).unwrap();
        screens.push(serde_json::json!({
            "id": id,
            "name": id.replace('-', " "),
            "source_path": format!("{id}.png"),
        }));
    }
    let captures = serde_json::json!({
        "source_url": "https://shop.example.test",
        "screens": screens,
    });
    std::fs::write(inbox.join("captures.json"), captures.to_string()).unwrap();
    std::fs::write(
        inbox.join("audit.json"),
        r#"{"screens": {}, "global": ["Increase contrast on secondary text"]}"#,
    )
    .unwrap();

    let paths = ProjectPaths::new(base.join("project"));
    let handle = PipelineHandle::with_backend(paths, PROJECT_ID, config, backend).unwrap();
    handle.init("").unwrap();
    handle.import_captures(&inbox.join("captures.json")).unwrap();
    handle.import_audit(&inbox.join("audit.json")).unwrap();

    Project { handle, inbox, temp }
}

/// Project with every anchor validated and anchoring complete.
pub async fn anchored_project(
    ids: &[String],
    config: Config,
    backend: Arc<dyn GenerationBackend>,
) -> Project {
    let project = project_with(ids, config, backend);
    project.handle.run_anchoring().await.unwrap();
    project.handle.complete_anchoring().unwrap();
    project
}

pub fn stub() -> Arc<StubBackend> {
    Arc::new(StubBackend::new(reskin::Viewport::DESKTOP))
}

fn base_file_name(request: &EditRequest) -> Option<String> {
    match &request.base_image {
        ImageRef::Path(path) => path.file_name().map(str::to_string),
        ImageRef::Bytes(_) => None,
    }
}

/// Stub backend whose edits of one screen always fail with a retryable outage.
pub struct FailingScreenBackend {
    inner: StubBackend,
    screen_file: String,
    pub failed_calls: Mutex<u32>,
}

impl FailingScreenBackend {
    pub fn new(screen_id: &str) -> Self {
        Self {
            inner: StubBackend::new(reskin::Viewport::DESKTOP),
            screen_file: format!("{screen_id}.png"),
            failed_calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl GenerationBackend for FailingScreenBackend {
    fn name(&self) -> &str {
        "failing-screen"
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        self.inner.generate(request).await
    }

    async fn edit(&self, request: EditRequest) -> Result<GenerationOutput, GenerationError> {
        if base_file_name(&request).as_deref() == Some(self.screen_file.as_str()) {
            *self.failed_calls.lock().unwrap() += 1;
            return Err(GenerationError::ProviderOutage("503 service unavailable".to_string()));
        }
        self.inner.edit(request).await
    }
}

/// Stub backend that records the reference images of every edit.
pub struct RecordingBackend {
    inner: StubBackend,
    pub edits: Mutex<Vec<Vec<Utf8PathBuf>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            inner: StubBackend::new(reskin::Viewport::DESKTOP),
            edits: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GenerationBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        self.inner.generate(request).await
    }

    async fn edit(&self, request: EditRequest) -> Result<GenerationOutput, GenerationError> {
        let refs = request
            .references
            .iter()
            .filter_map(|r| match r {
                ImageRef::Path(p) => Some(p.clone()),
                ImageRef::Bytes(_) => None,
            })
            .collect();
        self.edits.lock().unwrap().push(refs);
        self.inner.edit(request).await
    }
}

/// Scorer driven by a per-item table; items not listed score 0.
///
/// Each entry is `(item_id, score before regeneration, score after)`. An item
/// counts as regenerated once its recorded attempts exceed `first_attempts`.
/// Every assessment is recorded as `(item_id, attempts, strength)`.
pub struct TableScorer {
    table: Vec<(String, f64, f64)>,
    first_attempts: u32,
    pub assessed: Mutex<Vec<(String, u32, f64)>>,
}

impl TableScorer {
    pub fn new(table: &[(&str, f64, f64)]) -> Self {
        Self {
            table: table.iter().map(|(id, a, b)| (id.to_string(), *a, *b)).collect(),
            first_attempts: 1,
            assessed: Mutex::new(Vec::new()),
        }
    }
}

impl DeviationScorer for TableScorer {
    fn assess(&self, item: &CoherenceItem, _anchors: &[Utf8PathBuf]) -> DeviationAssessment {
        self.assessed
            .lock()
            .unwrap()
            .push((item.item_id.clone(), item.attempts, item.strength));
        let score = self
            .table
            .iter()
            .find(|(id, _, _)| *id == item.item_id)
            .map_or(0.0, |(_, before, after)| {
                if item.attempts > self.first_attempts { *after } else { *before }
            });
        DeviationAssessment::new(score, Vec::new())
    }
}

pub fn read_json(path: &Utf8Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
