//! # Splash Sequencer
//!
//! Plays an ordered list of audio/video clips back-to-back at boot, into a
//! single shared output pipeline, and guarantees that the sequence ends even
//! when a clip never finishes on its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use splash_sequencer::{
//!     clip::ConfDirSource,
//!     config::Config,
//!     engine::ClipSequencer,
//!     pipeline::{Bus, LaunchPipeline},
//!     surface::{DisplaySurface, LazyRenderTarget},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let clips = ConfDirSource::open(&config.clips.conf_dir, &config.clips.media_dir);
//!
//! let bus = Bus::new();
//! let pipeline = LaunchPipeline::new(config.templates.clone(), bus.sender());
//! let target = LazyRenderTarget::new(Box::new(DisplaySurface::open(None)?));
//!
//! let mut sequencer = ClipSequencer::new(pipeline, bus, &config.timing, target);
//! if sequencer.run(clips).await.is_fatal() {
//!     std::process::abort();
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`clip`] - Clip descriptors and where they come from
//! - [`pipeline`] - The shared output pipeline, its bus and subgraphs
//! - [`engine`] - Builder, timers, dispatcher and the sequencer itself
//! - [`surface`] - Render target acquisition
//! - [`hooks`] - First-ready notification
//! - [`config`] - Configuration management
//!
//! ## Timing rules
//!
//! A clip with a duration above the configured threshold (500 ms by default)
//! plays for at least that long; anything shorter plays until end-of-stream.
//! Every clip is bounded by a watchdog ceiling; hitting it is fatal and the
//! process is expected to abort without cleanup.

pub mod clip;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod pipeline;
pub mod surface;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use crate::{
    clip::{ClipDescriptor, ClipSource},
    config::Config,
    engine::{ClipSequencer, SequenceOutcome},
    error::{Result, SplashError},
    pipeline::{Bus, LaunchPipeline, OutputPipeline},
};
