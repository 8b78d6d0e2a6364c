//! Proxy process launcher seam.
//!
//! Standing a real tunnel up means running a locally installed proxy
//! executable against a written config artifact. That is mechanical OS glue,
//! so it lives behind [`ProxyLauncher`]: the probe engine only ever sees
//! `start` and `stop`, and the parse/probe/score core stays platform-neutral.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, warn};

// ============================================================================
// Session Handle
// ============================================================================

/// Handle to a launched proxy process.
///
/// The session is owned by the caller that started it — there is no
/// process-wide "currently running proxy" state. Dropping an un-stopped
/// session tears the process down as a last resort, so a probe that bails
/// early never leaks a child process.
#[derive(Debug)]
pub struct ProxySession {
    child: Option<Child>,
    config_path: PathBuf,
}

impl ProxySession {
    /// Session backed by a spawned child process
    pub fn from_child(child: Child, config_path: &Path) -> Self {
        Self {
            child: Some(child),
            config_path: config_path.to_path_buf(),
        }
    }

    /// Session for a proxy managed outside this process (nothing to kill)
    pub fn detached(config_path: &Path) -> Self {
        Self {
            child: None,
            config_path: config_path.to_path_buf(),
        }
    }

    /// Config artifact the session was started from
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// OS process id, if a child is still attached
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            // Killing an already-exited child is not an error worth surfacing
            if let Err(e) = child.kill() {
                debug!("Proxy process already gone: {}", e);
            }
            if let Err(e) = child.wait() {
                warn!("Failed to reap proxy process: {}", e);
            }
        }
    }
}

impl Drop for ProxySession {
    fn drop(&mut self) {
        self.terminate();
    }
}

// ============================================================================
// Launcher Trait
// ============================================================================

/// Collaborator contract for standing proxy tunnels up and down.
pub trait ProxyLauncher: Send + Sync {
    /// Starts a proxy process against the given config artifact.
    fn start(&self, config_path: &Path) -> Result<ProxySession>;

    /// Stops a running session. Idempotent: stopping a session whose process
    /// already exited is not an error.
    fn stop(&self, session: &mut ProxySession) -> Result<()>;
}

// ============================================================================
// Subprocess Launcher
// ============================================================================

/// Launches the proxy as a subprocess (`<executable> run -c <config>`).
pub struct ProcessLauncher {
    executable: String,
}

impl ProcessLauncher {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl ProxyLauncher for ProcessLauncher {
    fn start(&self, config_path: &Path) -> Result<ProxySession> {
        debug!(
            "Starting proxy process: {} run -c {}",
            self.executable,
            config_path.display()
        );
        let child = Command::new(&self.executable)
            .arg("run")
            .arg("-c")
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start proxy executable `{}`", self.executable))?;

        debug!("Proxy process started with PID {}", child.id());
        Ok(ProxySession::from_child(child, config_path))
    }

    fn stop(&self, session: &mut ProxySession) -> Result<()> {
        debug!("Stopping proxy session for {}", session.config_path().display());
        session.terminate();
        Ok(())
    }
}
