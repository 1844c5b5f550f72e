//! Clipboard access surface launching.
//!
//! The orchestrator never reads the clipboard itself: each session
//! spawns a short-lived `pastebridged surface` child process that
//! performs exactly one read and reports back over the runtime
//! channel. The launcher is a trait so the serve loop can be tested
//! without spawning real processes.

use std::collections::HashMap;

use tokio::process::{Child, Command};

use crate::orchestrator::session::HelperHandle;

/// Window geometry for the helper surface.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceGeometry {
    fn default() -> Self {
        Self {
            width: 480,
            height: 320,
        }
    }
}

/// Surface launch errors.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("cannot determine own executable path: {0}")]
    NoExecutable(std::io::Error),
    #[error("failed to spawn surface process: {0}")]
    Spawn(std::io::Error),
}

/// Starts and stops helper surfaces.
pub trait SurfaceLauncher {
    fn launch(&mut self, helper: HelperHandle) -> Result<(), LaunchError>;

    /// Tear the surface down. Must be safe to call for a helper that
    /// already exited or was never successfully launched.
    fn close(&mut self, helper: HelperHandle);
}

/// Launcher that spawns `pastebridged surface` child processes.
pub struct ProcessLauncher {
    geometry: SurfaceGeometry,
    children: HashMap<HelperHandle, Child>,
}

impl ProcessLauncher {
    pub fn new(geometry: SurfaceGeometry) -> Self {
        Self {
            geometry,
            children: HashMap::new(),
        }
    }
}

impl SurfaceLauncher for ProcessLauncher {
    fn launch(&mut self, helper: HelperHandle) -> Result<(), LaunchError> {
        let exe = std::env::current_exe().map_err(LaunchError::NoExecutable)?;
        let child = Command::new(exe)
            .arg("surface")
            .arg("--width")
            .arg(self.geometry.width.to_string())
            .arg("--height")
            .arg(self.geometry.height.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(LaunchError::Spawn)?;
        tracing::debug!(%helper, pid = child.id(), "surface spawned");
        self.children.insert(helper, child);
        Ok(())
    }

    fn close(&mut self, helper: HelperHandle) {
        if let Some(mut child) = self.children.remove(&helper) {
            // The surface normally exits on its own after sending its
            // result; the kill only matters when it hung.
            if let Err(error) = child.start_kill() {
                tracing::debug!(%helper, %error, "surface already gone");
            }
        }
    }
}
