//! Path resolution for the sparcflow home and the per-issue persisted layout.
//!
//! ```text
//! <state_dir>/
//!   <issue_id>-state.json     full workflow record
//!   <issue_id>.lock           advisory lock while a run is active
//!   <issue_id>/<key>.md       one file per non-empty artifact
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;

// Thread-local override used only in tests to avoid process-global env races.
thread_local! {
    static THREAD_HOME: RefCell<Option<Utf8PathBuf>> = const { RefCell::new(None) };
}

/// Environment variable that relocates the sparcflow home.
pub const HOME_ENV: &str = "SPARCFLOW_HOME";

/// Resolve the sparcflow home:
/// 1) thread-local override (tests use this)
/// 2) env `SPARCFLOW_HOME`
/// 3) default ".sparcflow"
#[must_use]
pub fn sparcflow_home() -> Utf8PathBuf {
    if let Some(tl) = THREAD_HOME.with(|tl| tl.borrow().clone()) {
        return tl;
    }
    if let Ok(p) = std::env::var(HOME_ENV) {
        return Utf8PathBuf::from(p);
    }
    Utf8PathBuf::from(".sparcflow")
}

/// Returns `<SPARCFLOW_HOME>/workflows`
#[must_use]
pub fn default_state_dir() -> Utf8PathBuf {
    sparcflow_home().join("workflows")
}

#[must_use]
pub fn state_file(state_dir: &Utf8Path, issue_id: &str) -> Utf8PathBuf {
    state_dir.join(format!("{issue_id}-state.json"))
}

#[must_use]
pub fn artifact_dir(state_dir: &Utf8Path, issue_id: &str) -> Utf8PathBuf {
    state_dir.join(issue_id)
}

#[must_use]
pub fn artifact_file(state_dir: &Utf8Path, issue_id: &str, key: &str) -> Utf8PathBuf {
    artifact_dir(state_dir, issue_id).join(format!("{key}.md"))
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
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
    pub fn home(&self) -> Utf8PathBuf {
        sparcflow_home()
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

/// Test helper: give the current thread a unique home under the system temp dir.
///
/// Hold the `HomeGuard` for the test's duration so the directory stays alive.
#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn with_isolated_home() -> HomeGuard {
    let td = tempfile::TempDir::new().expect("create temp home");
    let p = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).expect("utf-8 temp path");
    THREAD_HOME.with(|tl| *tl.borrow_mut() = Some(p));
    HomeGuard { inner: td }
}
