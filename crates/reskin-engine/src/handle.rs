//! Pipeline facade for external consumers.
//!
//! The CLI and tests drive a project exclusively through [`PipelineHandle`]:
//! it owns the project layout, the manifest store, the generation backend and
//! the scorer, and every phase operation is a method on it. The phase engines
//! live in sibling modules as further `impl PipelineHandle` blocks.

use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use reskin_config::{Config, DEFAULT_GENERATION_TIMEOUT_SECS};
use reskin_generation::{CostModel, GenerationBackend, GenerationOptions};
use reskin_manifest::{Manifest, ManifestStore, PhaseUpdate};
use reskin_utils::atomic_write::write_file_atomic;
use reskin_utils::error::{ConfigError, ReskinError};
use reskin_utils::paths::{ProjectPaths, validate_project_id};
use reskin_utils::types::{PhaseId, PhaseStatus, Viewport};

use crate::anchors::{AnchorSet, AnchoringOutcome};
use crate::inputs::{AuditDocument, CaptureDocument};
use crate::retry::RetryPolicy;
use crate::scoring::{DeviationScorer, FileSizeProxy, HeuristicScorer, SimilarityProxy};
use crate::summary::PhaseSummary;

/// The primary API for driving one redesign project.
///
/// # Construction
///
/// - [`PipelineHandle::open`]: project under the resolved `RESKIN_HOME`, backend
///   built from the `[generation]` config section
/// - [`PipelineHandle::with_backend`]: explicit root and backend (tests, embedding)
///
/// # Concurrency
///
/// A handle assumes it is the only writer of its project. The CLI holds the
/// project lock for the lifetime of a command; embedders must do the same.
///
/// # Example
///
/// ```rust,no_run
/// use camino::Utf8Path;
/// use reskin_config::Config;
/// use reskin_engine::PipelineHandle;
///
/// # async fn demo() -> Result<(), reskin_utils::error::ReskinError> {
/// let handle = PipelineHandle::open("shop", Config::minimal_for_testing())?;
/// handle.init("https://shop.example.test")?;
/// handle.import_captures(Utf8Path::new("captures/screens.json"))?;
/// handle.import_audit(Utf8Path::new("audit/findings.json"))?;
/// let report = handle.run().await?;
/// for summary in &report.summaries {
///     println!("{}", summary.status_line());
/// }
/// # Ok(())
/// # }
/// ```
pub struct PipelineHandle {
    project_id: String,
    paths: ProjectPaths,
    store: ManifestStore,
    config: Config,
    backend: Arc<dyn GenerationBackend>,
    scorer: Arc<dyn DeviationScorer>,
    proxy: Arc<dyn SimilarityProxy>,
    costs: CostModel,
}

/// What [`PipelineHandle::run`] got through.
#[derive(Debug, Default)]
pub struct RunReport {
    pub summaries: Vec<PhaseSummary>,
    /// Set when anchoring stopped short of all slots validated
    pub halted: Option<AnchoringOutcome>,
}

impl PipelineHandle {
    /// Open `project_id` under the resolved home with the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid project id or when the backend cannot be
    /// built (unknown provider, missing endpoint or API key).
    pub fn open(project_id: &str, config: Config) -> Result<Self, ReskinError> {
        check_project_id(project_id)?;
        let backend = reskin_generation::from_config(&config)?;
        Self::with_backend(ProjectPaths::for_project(project_id), project_id, config, backend)
    }

    /// Handle over an explicit project root and backend.
    pub fn with_backend(
        paths: ProjectPaths,
        project_id: &str,
        config: Config,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self, ReskinError> {
        check_project_id(project_id)?;
        let proxy: Arc<dyn SimilarityProxy> = Arc::new(FileSizeProxy);
        Ok(Self {
            project_id: project_id.to_string(),
            store: ManifestStore::new(paths.clone()),
            paths,
            costs: CostModel::from_config(&config),
            config,
            backend,
            scorer: Arc::new(HeuristicScorer::new(Arc::clone(&proxy))),
            proxy,
        })
    }

    /// Replace the coherence scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn DeviationScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Replace the similarity proxy used by anchor pre-validation and the
    /// default scorer.
    #[must_use]
    pub fn with_similarity_proxy(mut self, proxy: Arc<dyn SimilarityProxy>) -> Self {
        self.scorer = Arc::new(HeuristicScorer::new(Arc::clone(&proxy)));
        self.proxy = proxy;
        self
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn backend(&self) -> &dyn GenerationBackend {
        self.backend.as_ref()
    }

    pub(crate) fn scorer(&self) -> &dyn DeviationScorer {
        self.scorer.as_ref()
    }

    pub(crate) fn proxy(&self) -> &dyn SimilarityProxy {
        self.proxy.as_ref()
    }

    pub(crate) fn costs(&self) -> &CostModel {
        &self.costs
    }

    pub(crate) fn generation_options(&self, viewport: Viewport) -> GenerationOptions {
        let secs = self
            .config
            .generation
            .timeout_secs
            .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS);
        let mut options =
            GenerationOptions::for_viewport(viewport).with_timeout(Duration::from_secs(secs));
        options.model.clone_from(&self.config.generation.model);
        options
    }

    pub(crate) fn propagation_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.propagation_attempts(), self.config.backoff_ms())
    }

    /// Create the project manifest with every phase pending.
    ///
    /// # Errors
    ///
    /// Fails when the project already exists.
    pub fn init(&self, source_url: &str) -> Result<Manifest, ReskinError> {
        let manifest = Manifest::create(&self.project_id, source_url, self.config.viewport());
        self.store.init(&manifest)?;
        info!(project_id = %self.project_id, viewport = %manifest.viewport, "Project initialized");
        Ok(manifest)
    }

    pub fn manifest(&self) -> Result<Manifest, ReskinError> {
        Ok(self.store.load()?)
    }

    pub(crate) fn save(&self, manifest: &Manifest) -> Result<(), ReskinError> {
        Ok(self.store.save(manifest)?)
    }

    /// Validated anchor images, by slot.
    pub(crate) fn validated_anchor_paths(&self) -> Result<Vec<Utf8PathBuf>, ReskinError> {
        let set = AnchorSet::load(&self.paths)?;
        Ok(set
            .validated()
            .filter_map(|a| a.image_path.as_deref())
            .map(|p| self.paths.resolve(p))
            .collect())
    }

    /// Copy a capture document into the project and mark capture complete.
    ///
    /// Relative image paths resolve against the document's directory.
    pub fn import_captures(&self, document: &Utf8Path) -> Result<CaptureDocument, ReskinError> {
        let content = std::fs::read_to_string(document)?;
        let base_dir = document
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        let doc = CaptureDocument::parse(&content, base_dir)?;

        let mut manifest = self.manifest()?;
        self.begin_external(&mut manifest, PhaseId::Capture, doc.screens.len())?;
        self.write_input(&self.paths.captures(), &doc)?;
        manifest.total_screens = doc.screens.len();
        if manifest.source_url.is_empty()
            && let Some(url) = &doc.source_url
        {
            manifest.source_url.clone_from(url);
        }
        self.finish_external(&mut manifest, PhaseId::Capture, doc.screens.len())?;
        info!(project_id = %self.project_id, screens = doc.screens.len(), "Captures imported");
        Ok(doc)
    }

    /// Copy an audit document into the project and mark audit complete.
    pub fn import_audit(&self, document: &Utf8Path) -> Result<AuditDocument, ReskinError> {
        let content = std::fs::read_to_string(document)?;
        let doc = AuditDocument::parse(&content)?;

        let mut manifest = self.manifest()?;
        self.begin_external(&mut manifest, PhaseId::Audit, doc.screens.len())?;
        self.write_input(&self.paths.audit(), &doc)?;
        self.finish_external(&mut manifest, PhaseId::Audit, doc.screens.len())?;
        info!(
            project_id = %self.project_id,
            screens = doc.screens.len(),
            globals = doc.global.len(),
            "Audit imported"
        );
        Ok(doc)
    }

    /// Mark an externally run phase (capture, audit, specs) complete.
    pub fn record_external(&self, phase: PhaseId) -> Result<Manifest, ReskinError> {
        if phase.is_core() {
            return Err(ConfigError::InvalidValue {
                key: "phase".to_string(),
                value: format!("{phase} is run by reskin itself, not recorded"),
            }
            .into());
        }
        let mut manifest = self.manifest()?;
        self.begin_external(&mut manifest, phase, 0)?;
        self.finish_external(&mut manifest, phase, 0)?;
        Ok(manifest)
    }

    /// Skip a pending phase; it then satisfies its successors' preconditions.
    pub fn skip(&self, phase: PhaseId) -> Result<Manifest, ReskinError> {
        let mut manifest = self.manifest()?;
        manifest.transition(phase, PhaseStatus::Skipped, PhaseUpdate::none())?;
        self.save(&manifest)?;
        info!(project_id = %self.project_id, phase = %phase, "Phase skipped");
        Ok(manifest)
    }

    /// Reset `phase` and every later phase to pending.
    pub fn reopen(&self, phase: PhaseId) -> Result<Manifest, ReskinError> {
        let mut manifest = self.manifest()?;
        manifest.reopen(phase);
        self.save(&manifest)?;
        info!(project_id = %self.project_id, phase = %phase, "Phase reopened");
        Ok(manifest)
    }

    /// Run every remaining core phase in order.
    ///
    /// Stops at a validation gate, at an anchor that needs regeneration, or at
    /// a phase left in progress; hard phase failures are returned as errors.
    pub async fn run(&self) -> Result<RunReport, ReskinError> {
        let mut report = RunReport::default();

        if !self.manifest()?.status(PhaseId::Anchoring).is_settled() {
            match self.run_anchoring().await? {
                AnchoringOutcome::AllValidated { .. } => {
                    report.summaries.push(self.complete_anchoring()?);
                }
                AnchoringOutcome::AlreadyComplete => {}
                halted => {
                    report.halted = Some(halted);
                    return Ok(report);
                }
            }
        }

        for phase in [PhaseId::Propagation, PhaseId::States, PhaseId::Coherence] {
            if self.manifest()?.status(phase).is_settled() {
                continue;
            }
            let summary = match phase {
                PhaseId::Propagation => self.run_propagation().await?,
                PhaseId::States => self.run_states().await?,
                _ => self.run_coherence().await?.summary(),
            };
            let settled = summary.status.is_settled();
            report.summaries.push(summary);
            if !settled {
                break;
            }
        }
        Ok(report)
    }

    fn begin_external(
        &self,
        manifest: &mut Manifest,
        phase: PhaseId,
        total: usize,
    ) -> Result<(), ReskinError> {
        manifest.transition(phase, PhaseStatus::InProgress, PhaseUpdate::total(total))?;
        self.save(manifest)
    }

    fn finish_external(
        &self,
        manifest: &mut Manifest,
        phase: PhaseId,
        items: usize,
    ) -> Result<(), ReskinError> {
        manifest.transition(
            phase,
            PhaseStatus::Complete,
            PhaseUpdate::none().with_items_completed(items),
        )?;
        self.save(manifest)
    }

    fn write_input<T: serde::Serialize>(
        &self,
        path: &Utf8Path,
        doc: &T,
    ) -> Result<(), ReskinError> {
        let mut json = serde_json::to_string_pretty(doc)
            .map_err(|e| ReskinError::serialization("input document", e))?;
        json.push('\n');
        write_file_atomic(path, &json).map_err(|e| ReskinError::write_failed(path, &e))?;
        Ok(())
    }
}

fn check_project_id(project_id: &str) -> Result<(), ReskinError> {
    validate_project_id(project_id).map_err(|reason| {
        ConfigError::InvalidValue {
            key: "project_id".to_string(),
            value: reason,
        }
        .into()
    })
}
