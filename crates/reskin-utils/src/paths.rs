//! Project directory layout.
//!
//! ```text
//! $RESKIN_HOME/projects/<id>/
//!   manifest.json
//!   .lock
//!   inputs/captures.json, inputs/audit.json
//!   anchors/anchors.json, anchors/slot-NN-<name>.png, anchors/hero-candidate-K.png
//!   style-config.json
//!   propagation/report.json, propagation/screens/<screen>.png
//!   states/report.json, states/screens/<screen>-<state>.png
//!   coherence/report.json, coherence/regenerations.jsonl, coherence/passes.jsonl
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;

// Thread-local override used only in tests to avoid process-global env races.
thread_local! {
    static THREAD_HOME: RefCell<Option<Utf8PathBuf>> = const { RefCell::new(None) };
}

/// Resolve reskin home:
/// 1) thread-local override (tests use this)
/// 2) env `RESKIN_HOME`
/// 3) default ".reskin"
#[must_use]
pub fn reskin_home() -> Utf8PathBuf {
    if let Some(tl) = THREAD_HOME.with(|tl| tl.borrow().clone()) {
        return tl;
    }
    if let Ok(p) = std::env::var("RESKIN_HOME") {
        return Utf8PathBuf::from(p);
    }
    Utf8PathBuf::from(".reskin")
}

/// Returns `<RESKIN_HOME>/projects/<project_id>`
#[must_use]
pub fn project_root(project_id: &str) -> Utf8PathBuf {
    reskin_home().join("projects").join(project_id)
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// Project ids become directory names, so they are restricted to
/// `[A-Za-z0-9_-]`, 1 to 64 characters, not starting with `-`.
pub fn validate_project_id(id: &str) -> Result<(), String> {
    if id.is_empty() || id.len() > 64 {
        return Err(format!("project id must be 1-64 characters, got {}", id.len()));
    }
    if id.starts_with('-') {
        return Err(format!("project id '{id}' must not start with '-'"));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(format!("project id '{id}' contains invalid character '{bad}'"));
    }
    Ok(())
}

/// Resolved locations of every artifact belonging to one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: Utf8PathBuf,
}

impl ProjectPaths {
    /// Layout rooted at an explicit directory.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout for `project_id` under the resolved home.
    #[must_use]
    pub fn for_project(project_id: &str) -> Self {
        Self::new(project_root(project_id))
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Path of `path` relative to the project root, as stored in records.
    /// Paths outside the root are returned unchanged.
    #[must_use]
    pub fn relative(&self, path: &Utf8Path) -> String {
        path.strip_prefix(&self.root)
            .map_or_else(|_| path.to_string(), ToString::to_string)
    }

    /// Inverse of [`ProjectPaths::relative`].
    #[must_use]
    pub fn resolve(&self, stored: &str) -> Utf8PathBuf {
        let p = Utf8Path::new(stored);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    #[must_use]
    pub fn manifest(&self) -> Utf8PathBuf {
        self.root.join("manifest.json")
    }

    #[must_use]
    pub fn lock_file(&self) -> Utf8PathBuf {
        self.root.join(".lock")
    }

    #[must_use]
    pub fn inputs_dir(&self) -> Utf8PathBuf {
        self.root.join("inputs")
    }

    #[must_use]
    pub fn captures(&self) -> Utf8PathBuf {
        self.inputs_dir().join("captures.json")
    }

    #[must_use]
    pub fn audit(&self) -> Utf8PathBuf {
        self.inputs_dir().join("audit.json")
    }

    #[must_use]
    pub fn anchors_dir(&self) -> Utf8PathBuf {
        self.root.join("anchors")
    }

    #[must_use]
    pub fn anchors_record(&self) -> Utf8PathBuf {
        self.anchors_dir().join("anchors.json")
    }

    /// `anchors/slot-07-form-controls.png`
    #[must_use]
    pub fn anchor_image(&self, slot: u8, name: &str) -> Utf8PathBuf {
        self.anchors_dir().join(format!("slot-{slot:02}-{name}.png"))
    }

    /// `anchors/hero-candidate-2.png` (1-based)
    #[must_use]
    pub fn hero_candidate(&self, index: usize) -> Utf8PathBuf {
        self.anchors_dir().join(format!("hero-candidate-{index}.png"))
    }

    #[must_use]
    pub fn style_config(&self) -> Utf8PathBuf {
        self.root.join("style-config.json")
    }

    #[must_use]
    pub fn propagation_dir(&self) -> Utf8PathBuf {
        self.root.join("propagation")
    }

    #[must_use]
    pub fn propagation_report(&self) -> Utf8PathBuf {
        self.propagation_dir().join("report.json")
    }

    #[must_use]
    pub fn propagated_screen(&self, screen_id: &str) -> Utf8PathBuf {
        self.propagation_dir()
            .join("screens")
            .join(format!("{screen_id}.png"))
    }

    #[must_use]
    pub fn states_dir(&self) -> Utf8PathBuf {
        self.root.join("states")
    }

    #[must_use]
    pub fn states_report(&self) -> Utf8PathBuf {
        self.states_dir().join("report.json")
    }

    #[must_use]
    pub fn state_variant(&self, screen_id: &str, state: &str) -> Utf8PathBuf {
        self.states_dir()
            .join("screens")
            .join(format!("{screen_id}-{state}.png"))
    }

    #[must_use]
    pub fn coherence_dir(&self) -> Utf8PathBuf {
        self.root.join("coherence")
    }

    #[must_use]
    pub fn coherence_report(&self) -> Utf8PathBuf {
        self.coherence_dir().join("report.json")
    }

    #[must_use]
    pub fn regeneration_log(&self) -> Utf8PathBuf {
        self.coherence_dir().join("regenerations.jsonl")
    }

    /// Summaries of committed coherence passes, one per line.
    #[must_use]
    pub fn coherence_pass_log(&self) -> Utf8PathBuf {
        self.coherence_dir().join("passes.jsonl")
    }
}

/// RAII guard for isolated home that clears thread-local state on drop
#[cfg(any(test, feature = "test-utils"))]
pub struct HomeGuard {
    inner: tempfile::TempDir,
}

#[cfg(any(test, feature = "test-utils"))]
impl HomeGuard {
    #[must_use]
    pub fn utf8_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.inner.path().to_path_buf())
            .unwrap_or_else(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()))
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Drop for HomeGuard {
    fn drop(&mut self) {
        THREAD_HOME.with(|tl| *tl.borrow_mut() = None);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl std::ops::Deref for HomeGuard {
    type Target = tempfile::TempDir;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Give this test a unique home under the system temp dir.
///
/// Hold the `HomeGuard` for the test's duration so the directory stays alive.
#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn with_isolated_home() -> HomeGuard {
    let td = tempfile::TempDir::new().expect("create temp home");
    let p = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
    THREAD_HOME.with(|tl| *tl.borrow_mut() = Some(p));
    HomeGuard { inner: td }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_home_is_used() {
        let home = with_isolated_home();
        assert_eq!(reskin_home(), home.utf8_path());
        assert_eq!(
            project_root("shop"),
            home.utf8_path().join("projects").join("shop")
        );
    }

    #[test]
    fn test_layout_names() {
        let paths = ProjectPaths::new("/p");
        assert_eq!(paths.manifest(), Utf8PathBuf::from("/p/manifest.json"));
        assert_eq!(
            paths.anchor_image(7, "form-controls"),
            Utf8PathBuf::from("/p/anchors/slot-07-form-controls.png")
        );
        assert_eq!(
            paths.hero_candidate(2),
            Utf8PathBuf::from("/p/anchors/hero-candidate-2.png")
        );
        assert_eq!(
            paths.state_variant("checkout", "loading"),
            Utf8PathBuf::from("/p/states/screens/checkout-loading.png")
        );
        assert_eq!(
            paths.regeneration_log(),
            Utf8PathBuf::from("/p/coherence/regenerations.jsonl")
        );
        assert_eq!(
            paths.coherence_pass_log(),
            Utf8PathBuf::from("/p/coherence/passes.jsonl")
        );
    }

    #[test]
    fn test_relative_and_resolve() {
        let paths = ProjectPaths::new("/p");
        let rel = paths.relative(&paths.anchor_image(1, "hero"));
        assert_eq!(rel, "anchors/slot-01-hero.png");
        assert_eq!(paths.resolve(&rel), Utf8PathBuf::from("/p/anchors/slot-01-hero.png"));
        assert_eq!(paths.relative(Utf8Path::new("/elsewhere/x.png")), "/elsewhere/x.png");
        assert_eq!(paths.resolve("/elsewhere/x.png"), Utf8PathBuf::from("/elsewhere/x.png"));
    }

    #[test]
    fn test_validate_project_id() {
        assert!(validate_project_id("shop_v2-redesign").is_ok());
        assert!(validate_project_id("").is_err());
        assert!(validate_project_id("-flag").is_err());
        assert!(validate_project_id("../escape").is_err());
        assert!(validate_project_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_ensure_dir_all_is_idempotent() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("a/b/c");
        ensure_dir_all(&dir).unwrap();
        ensure_dir_all(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
