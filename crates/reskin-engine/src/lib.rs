//! Phase engines for reskin
//!
//! Drives one redesign project from imported captures to a coherent set of
//! restyled screens: the 14-slot anchor protocol with its validation gates,
//! batched propagation, state variants and the coherence loop. Everything is
//! reached through [`PipelineHandle`].

pub mod anchors;
pub mod classify;
pub mod coherence;
mod handle;
pub mod inputs;
pub mod prompts;
pub mod propagation;
pub mod reports;
pub mod retry;
pub mod scoring;
pub mod states;
pub mod style;
mod summary;

pub use anchors::{Anchor, AnchorSet, AnchorType, AnchoringOutcome, SLOT_COUNT, ValidationReport};
pub use classify::{ScreenType, classify};
pub use coherence::{
    CoherenceOutcome, CoherencePolicy, CoherenceReport, OutlierInfo, PassSummary,
    REGENERATION_STRENGTH, RegenerationRecord,
};
pub use handle::{PipelineHandle, RunReport};
pub use inputs::{AuditDocument, CaptureDocument, CapturedScreen};
pub use propagation::{PropagatedScreen, PropagationReport};
pub use scoring::{
    CoherenceItem, DeviationAssessment, DeviationScorer, FileSizeProxy, HeuristicScorer,
    OutlierReason, SimilarityProxy,
};
pub use states::{StateKind, StateVariant, StatesReport};
pub use style::{Palette, StyleConfig, StyleContext};
pub use summary::PhaseSummary;

#[cfg(test)]
pub(crate) mod test_fixtures {
    use std::sync::Arc;

    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    use reskin_config::{ApprovalMode, Config};
    use reskin_generation::{GenerationBackend, StubBackend};
    use reskin_utils::paths::ProjectPaths;
    use reskin_utils::test_support::png_fixture;
    use reskin_utils::types::Viewport;

    use crate::PipelineHandle;

    /// Captured screens in capture order.
    pub(crate) const SCREEN_IDS: [&str; 4] = ["home", "dashboard", "orders", "settings"];

    const CAPTURES: &str = r#"{
        "source_url": "https://shop.example.test",
        "screens": [
            {"id": "home", "name": "Home", "flow": "browse", "source_path": "home.png"},
            {"id": "dashboard", "name": "Dashboard", "source_path": "dashboard.png"},
            {"id": "orders", "name": "Order list", "source_path": "orders.png"},
            {"id": "settings", "name": "Account settings", "source_path": "settings.png"}
        ]
    }"#;

    const AUDIT: &str = r#"{
        "screens": {
            "home": [
                "Increase contrast on secondary text",
                "Make the primary call to action more prominent"
            ],
            "orders": ["Increase contrast on secondary text", "Add column sorting"],
            "settings": ["Group related options"]
        }
    }"#;

    pub(crate) struct Fixture {
        pub handle: PipelineHandle,
        inbox: Utf8PathBuf,
        _temp: TempDir,
    }

    impl Fixture {
        pub fn capture_path(&self, screen_id: &str) -> Utf8PathBuf {
            self.inbox.join(format!("{screen_id}.png"))
        }
    }

    /// Initialized project with captures and audit imported.
    pub(crate) fn prepared_handle() -> Fixture {
        prepared_handle_with(Config::minimal_for_testing(), |viewport| {
            Arc::new(StubBackend::new(viewport))
        })
    }

    pub(crate) fn prepared_handle_with<F>(config: Config, backend: F) -> Fixture
    where
        F: FnOnce(Viewport) -> Arc<dyn GenerationBackend>,
    {
        let temp = TempDir::new().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let inbox = base.join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();
        for id in SCREEN_IDS {
            std::fs::write(inbox.join(format!("{id}.png")), png_fixture(1440, 900)).unwrap();
        }
        std::fs::write(inbox.join("captures.json"), CAPTURES).unwrap();
        std::fs::write(inbox.join("audit.json"), AUDIT).unwrap();

        let backend = backend(config.viewport());
        let paths = ProjectPaths::new(base.join("demo"));
        let handle = PipelineHandle::with_backend(paths, "demo", config, backend).unwrap();
        handle.init("").unwrap();
        handle.import_captures(&inbox.join("captures.json")).unwrap();
        handle.import_audit(&inbox.join("audit.json")).unwrap();

        Fixture {
            handle,
            inbox,
            _temp: temp,
        }
    }

    /// Prepared project with all anchors approved and anchoring complete.
    pub(crate) async fn anchored_handle() -> Fixture {
        anchored_handle_with(Config::minimal_for_testing()).await
    }

    pub(crate) async fn anchored_handle_with(mut config: Config) -> Fixture {
        config.defaults.approval_mode = Some(ApprovalMode::Auto);
        let fixture = prepared_handle_with(config, |viewport| Arc::new(StubBackend::new(viewport)));
        fixture.handle.run_anchoring().await.unwrap();
        fixture.handle.complete_anchoring().unwrap();
        fixture
    }
}
