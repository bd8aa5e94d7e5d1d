//! # Output Pipeline
//!
//! The shared output pipeline owns the audio and video sinks for the whole
//! process. Each clip contributes one [`Subgraph`] that is attached, linked to
//! the sinks, played and then detached again.
//!
//! The pipeline reports everything asynchronous (branch readiness, preroll,
//! errors, end-of-stream, render target requests) as [`BusMessage`]s on a
//! [`Bus`]. Timers post into the same bus, so the sequencer has exactly one
//! place to wait.
//!
//! ## Backends
//!
//! - [`LaunchPipeline`]: realises each linked branch as a `gst-launch-1.0`
//!   child process built from the configured templates.

pub mod bus;
pub mod launch;
pub mod subgraph;

use std::fmt;

use crate::error::PipelineError;
use crate::surface::RenderTarget;

pub use bus::{Bus, BusMessage, BusSender, TimeoutKind};
pub use launch::LaunchPipeline;
pub use subgraph::{
    BranchId, BranchReport, BranchSource, DecodeBranch, JoinState, LinkPlan, SinkLink, Subgraph,
    SubgraphId,
};

/// Media kinds, which double as the names of the two shared sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Pipeline states, in lifecycle order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "NULL",
            Self::Ready => "READY",
            Self::Paused => "PAUSED",
            Self::Playing => "PLAYING",
        };
        write!(f, "{}", name)
    }
}

/// The single shared output pipeline driven by the sequencer.
///
/// At most one subgraph is attached at a time. Implementations post their
/// asynchronous notifications on the [`BusSender`] they were created with.
#[allow(async_fn_in_trait)]
pub trait OutputPipeline {
    /// Add a freshly built subgraph. Decoder branches later report readiness
    /// with [`BusMessage::NoMorePads`].
    fn attach(&mut self, subgraph: &Subgraph) -> Result<(), PipelineError>;

    /// Connect the subgraph's branches to the shared sinks
    fn link(&mut self, subgraph: SubgraphId, plan: &LinkPlan) -> Result<(), PipelineError>;

    /// Move the whole pipeline to `state`
    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError>;

    /// Hand the render target to the active video sink
    fn set_render_target(&mut self, target: RenderTarget);

    /// Force the subgraph to NULL and remove it. Returns once nothing of the
    /// subgraph is left running.
    async fn detach(&mut self, subgraph: SubgraphId) -> Result<(), PipelineError>;

    /// Fill the render target with a single solid colour
    async fn paint_cover(&mut self, target: RenderTarget, color: [u8; 3])
        -> Result<(), PipelineError>;
}
