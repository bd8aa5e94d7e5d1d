use tracing::{debug, trace, warn};

use crate::error::SurfaceError;
use crate::pipeline::{BranchId, BranchReport, BusMessage, OutputPipeline, SubgraphId, TimeoutKind};
use crate::surface::{LazyRenderTarget, RenderTarget};

/// Why the active clip stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// End-of-stream or segment-done
    End,

    /// An element of the active subgraph failed
    Error { source: String, message: String },

    /// The duration timer expired
    DurationElapsed,

    /// The watchdog ceiling expired; the process cannot continue
    WatchdogExpired,
}

impl Terminal {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::WatchdogExpired)
    }
}

/// What a bus message means to the sequencer
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The active clip has prerolled and is playable
    Ready,

    /// A decoder branch of the active clip knows its output pads
    BranchReady { branch: BranchId, report: BranchReport },

    /// The video sink asks for the render target
    RenderTargetRequest,

    Terminal(Terminal),

    /// Stale, or of no interest
    Discarded,
}

/// Classifies bus messages for the active clip and answers render target requests.
///
/// Messages tagged with any subgraph other than the active one are discarded,
/// so late notifications from a detached clip (or a timer that raced its
/// cancellation) never end the next clip.
pub struct EventDispatcher {
    active: Option<SubgraphId>,
    target: LazyRenderTarget,
}

impl EventDispatcher {
    pub fn new(target: LazyRenderTarget) -> Self {
        Self {
            active: None,
            target,
        }
    }

    pub fn activate(&mut self, subgraph: SubgraphId) {
        self.active = Some(subgraph);
    }

    pub fn deactivate(&mut self) {
        self.active = None;
    }

    fn is_active(&self, subgraph: SubgraphId) -> bool {
        self.active == Some(subgraph)
    }

    pub fn classify(&self, message: BusMessage) -> Signal {
        let subgraph = match &message {
            BusMessage::AsyncDone { subgraph }
            | BusMessage::NoMorePads { subgraph, .. }
            | BusMessage::PrepareWindowHandle { subgraph }
            | BusMessage::Element { subgraph, .. }
            | BusMessage::Error { subgraph, .. }
            | BusMessage::Eos { subgraph }
            | BusMessage::SegmentDone { subgraph }
            | BusMessage::Timeout { subgraph, .. } => Some(*subgraph),
            BusMessage::StateChanged { .. } | BusMessage::Latency => None,
        };

        if let Some(subgraph) = subgraph {
            if !self.is_active(subgraph) {
                debug!("Discarding stale {} from {}", message.type_name(), subgraph);
                return Signal::Discarded;
            }
        }

        match message {
            BusMessage::AsyncDone { .. } => Signal::Ready,
            BusMessage::NoMorePads { branch, report, .. } => Signal::BranchReady { branch, report },
            BusMessage::PrepareWindowHandle { .. } => Signal::RenderTargetRequest,
            BusMessage::Error {
                subgraph,
                source,
                message,
                debug: details,
            } => {
                warn!("{}: error from {}: {}", subgraph, source, message);
                if let Some(details) = details {
                    debug!("{}: debug info: {}", subgraph, details);
                }
                Signal::Terminal(Terminal::Error { source, message })
            }
            BusMessage::Eos { .. } | BusMessage::SegmentDone { .. } => Signal::Terminal(Terminal::End),
            BusMessage::Timeout { kind, .. } => match kind {
                TimeoutKind::Duration => Signal::Terminal(Terminal::DurationElapsed),
                TimeoutKind::Watchdog => Signal::Terminal(Terminal::WatchdogExpired),
            },
            BusMessage::StateChanged { old, new } => {
                debug!("Pipeline state {} -> {}", old, new);
                Signal::Discarded
            }
            other => {
                trace!("Ignoring {} message", other.type_name());
                Signal::Discarded
            }
        }
    }

    /// Resolve the render target (first call only) and hand it to the pipeline
    pub fn supply_render_target<P: OutputPipeline>(
        &mut self,
        pipeline: &mut P,
    ) -> Result<RenderTarget, SurfaceError> {
        let target = self.target.resolve()?;
        pipeline.set_render_target(target);
        Ok(target)
    }

    /// The target for the cover frame, resolving it if no clip ever asked
    pub fn render_target(&mut self) -> Result<RenderTarget, SurfaceError> {
        self.target.resolve()
    }

    pub fn release_render_target(&mut self) {
        self.target.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RenderSurface;

    struct RootOnly;

    impl RenderSurface for RootOnly {
        fn root(&mut self) -> Result<RenderTarget, SurfaceError> {
            Ok(RenderTarget::root(7))
        }

        fn acquire_overlay(&mut self, _root: RenderTarget) -> Option<RenderTarget> {
            None
        }

        fn release_overlay(&mut self, _overlay: RenderTarget) {}

        fn close(&mut self) {}
    }

    fn dispatcher(active: u64) -> EventDispatcher {
        let mut dispatcher = EventDispatcher::new(LazyRenderTarget::new(Box::new(RootOnly)));
        dispatcher.activate(SubgraphId(active));
        dispatcher
    }

    #[test]
    fn test_stale_messages_are_discarded() {
        let dispatcher = dispatcher(2);

        let stale = BusMessage::Eos {
            subgraph: SubgraphId(1),
        };
        assert_eq!(dispatcher.classify(stale), Signal::Discarded);

        let timeout = BusMessage::Timeout {
            subgraph: SubgraphId(1),
            kind: TimeoutKind::Duration,
        };
        assert_eq!(dispatcher.classify(timeout), Signal::Discarded);
    }

    #[test]
    fn test_terminal_classification() {
        let dispatcher = dispatcher(0);
        let id = SubgraphId(0);

        assert_eq!(
            dispatcher.classify(BusMessage::Eos { subgraph: id }),
            Signal::Terminal(Terminal::End)
        );
        assert_eq!(
            dispatcher.classify(BusMessage::SegmentDone { subgraph: id }),
            Signal::Terminal(Terminal::End)
        );
        assert_eq!(
            dispatcher.classify(BusMessage::Timeout {
                subgraph: id,
                kind: TimeoutKind::Watchdog
            }),
            Signal::Terminal(Terminal::WatchdogExpired)
        );
        assert_eq!(
            dispatcher.classify(BusMessage::Error {
                subgraph: id,
                source: "bin0-video".to_string(),
                message: "not found".to_string(),
                debug: Some("filesrc".to_string()),
            }),
            Signal::Terminal(Terminal::Error {
                source: "bin0-video".to_string(),
                message: "not found".to_string(),
            })
        );
    }

    #[test]
    fn test_non_terminal_messages() {
        let dispatcher = dispatcher(0);
        let id = SubgraphId(0);

        assert_eq!(dispatcher.classify(BusMessage::AsyncDone { subgraph: id }), Signal::Ready);
        assert_eq!(
            dispatcher.classify(BusMessage::PrepareWindowHandle { subgraph: id }),
            Signal::RenderTargetRequest
        );
        assert_eq!(dispatcher.classify(BusMessage::Latency), Signal::Discarded);
        assert_eq!(
            dispatcher.classify(BusMessage::Element {
                subgraph: id,
                name: "level".to_string()
            }),
            Signal::Discarded
        );
    }

    #[test]
    fn test_nothing_is_active_after_deactivate() {
        let mut dispatcher = dispatcher(0);
        dispatcher.deactivate();
        assert_eq!(
            dispatcher.classify(BusMessage::AsyncDone {
                subgraph: SubgraphId(0)
            }),
            Signal::Discarded
        );
    }

    #[test]
    fn test_render_target_resolved_lazily() {
        let mut dispatcher = dispatcher(0);
        assert_eq!(dispatcher.render_target().unwrap(), RenderTarget::root(7));
        dispatcher.release_render_target();
    }
}
