//! One-shot notification fired when the first clip is ready to play.
//!
//! Boot scripts wait on the splash before continuing; once the first clip has
//! prerolled they may proceed while playback carries on.

use std::path::PathBuf;

use tracing::{info, warn};

/// Invoked once, on the first clip's ready signal
pub trait ReadyHook {
    fn on_first_ready(&mut self);
}

impl ReadyHook for () {
    fn on_first_ready(&mut self) {}
}

/// Writes the process id to a file when the first clip is ready
pub struct ReadyFile {
    path: PathBuf,
}

impl ReadyFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl ReadyHook for ReadyFile {
    fn on_first_ready(&mut self) {
        match std::fs::write(&self.path, format!("{}\n", std::process::id())) {
            Ok(()) => info!("Signalled readiness via {:?}", self.path),
            Err(e) => warn!("Could not write ready file {:?}: {}", self.path, e),
        }
    }
}
