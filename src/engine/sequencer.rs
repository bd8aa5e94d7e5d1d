use tracing::{debug, info, warn};

use crate::clip::{ClipDescriptor, ClipSource};
use crate::config::TimingConfig;
use crate::engine::builder::SubgraphBuilder;
use crate::engine::dispatcher::{EventDispatcher, Signal, Terminal};
use crate::engine::timer::TimerService;
use crate::error::PipelineError;
use crate::hooks::ReadyHook;
use crate::pipeline::{Bus, OutputPipeline, PipelineState, Subgraph, SubgraphId};
use crate::surface::LazyRenderTarget;

/// Where the sequencer is in the life of the current clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// No subgraph attached
    Idle,
    /// Building and attaching the next clip's subgraph
    Attaching,
    /// One subgraph attached, waiting for its terminal signal
    Playing,
    /// Terminal signal accepted, tearing the subgraph down
    Draining,
    /// All clips done, painting the cover and releasing the pipeline
    ShuttingDown,
}

/// How a whole sequence ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Every clip was played (or skipped) and the pipeline was shut down
    Completed { clips: usize },

    /// A clip outlived the watchdog ceiling. Nothing was torn down; the
    /// caller is expected to terminate the process immediately.
    FatalLiveness {
        clip_index: usize,
        subgraph: SubgraphId,
    },
}

impl SequenceOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalLiveness { .. })
    }
}

enum ClipOutcome {
    Finished,
    Skipped,
    Fatal(SubgraphId),
}

/// Plays clips one at a time through the shared output pipeline.
///
/// For each clip the sequencer builds a subgraph, attaches it, plays it and
/// waits on the bus until a terminal signal arrives: end-of-stream, an error,
/// the duration timer or the watchdog. The subgraph is then paused, detached
/// and the bus flushed before the next clip is attached, so at most one
/// subgraph is ever resident. After the last clip a cover frame is painted
/// and the pipeline is released.
///
/// When the end-of-stream and the duration timer race, whichever reaches the
/// bus first ends the clip; the other is discarded as stale.
pub struct ClipSequencer<P: OutputPipeline> {
    pipeline: P,
    bus: Bus,
    builder: SubgraphBuilder,
    timers: TimerService,
    dispatcher: EventDispatcher,
    ready_hook: Box<dyn ReadyHook>,
    cover_color: [u8; 3],
    state: SequencerState,
    first_ready_fired: bool,
}

impl<P: OutputPipeline> ClipSequencer<P> {
    /// `pipeline` must post on a sender of `bus`
    pub fn new(pipeline: P, bus: Bus, timing: &TimingConfig, target: LazyRenderTarget) -> Self {
        let timers = TimerService::new(bus.sender(), timing);
        Self {
            pipeline,
            bus,
            builder: SubgraphBuilder::new(),
            timers,
            dispatcher: EventDispatcher::new(target),
            ready_hook: Box::new(()),
            cover_color: [0, 0, 0],
            state: SequencerState::Idle,
            first_ready_fired: false,
        }
    }

    pub fn with_ready_hook<H: ReadyHook + 'static>(mut self, hook: H) -> Self {
        self.ready_hook = Box::new(hook);
        self
    }

    pub fn with_cover_color(mut self, color: [u8; 3]) -> Self {
        self.cover_color = color;
        self
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Play every clip in order, then shut the pipeline down.
    ///
    /// Per-clip failures are logged and only end that clip. A watchdog expiry
    /// returns [`SequenceOutcome::FatalLiveness`] at once, skipping all
    /// remaining teardown.
    pub async fn run<S: ClipSource>(&mut self, clips: S) -> SequenceOutcome {
        info!("Starting splash sequence");
        let mut played = 0;

        for (index, clip) in clips.enumerate() {
            match self.play_clip(index, &clip).await {
                ClipOutcome::Finished => played += 1,
                ClipOutcome::Skipped => {}
                ClipOutcome::Fatal(subgraph) => {
                    return SequenceOutcome::FatalLiveness {
                        clip_index: index,
                        subgraph,
                    };
                }
            }
        }

        self.shutdown().await;
        SequenceOutcome::Completed { clips: played }
    }

    async fn play_clip(&mut self, index: usize, clip: &ClipDescriptor) -> ClipOutcome {
        self.state = SequencerState::Attaching;
        info!("Clip {}: {}", index + 1, clip);

        let mut subgraph = self.builder.build(clip);
        let id = subgraph.id();
        if let Err(e) = self.pipeline.attach(&subgraph) {
            warn!("Skipping clip {}: {}", index + 1, e);
            self.state = SequencerState::Idle;
            return ClipOutcome::Skipped;
        }

        self.dispatcher.activate(id);
        self.timers.arm_watchdog(id);
        self.state = SequencerState::Playing;

        let terminal = match self.start_playback(&mut subgraph) {
            Ok(()) => self.await_terminal(&mut subgraph, clip).await,
            Err(e) => {
                warn!("{}: failed to start playback: {}", id, e);
                Terminal::Error {
                    source: subgraph.name(),
                    message: e.to_string(),
                }
            }
        };

        match &terminal {
            Terminal::WatchdogExpired => return ClipOutcome::Fatal(id),
            Terminal::End => info!("{}: end of stream", id),
            Terminal::DurationElapsed => info!("{}: duration of {:?} elapsed", id, clip.duration()),
            Terminal::Error { source, .. } => info!("{}: ended by error from {}", id, source),
        }

        self.drain(id).await;
        ClipOutcome::Finished
    }

    /// Link right away if nothing has to report pads, then go to PLAYING
    fn start_playback(&mut self, subgraph: &mut Subgraph) -> Result<(), PipelineError> {
        if subgraph.join().is_complete() {
            self.link(subgraph)?;
        }
        self.pipeline.set_state(PipelineState::Paused)?;
        self.pipeline.set_state(PipelineState::Playing)?;
        Ok(())
    }

    fn link(&mut self, subgraph: &mut Subgraph) -> Result<(), PipelineError> {
        let plan = self.builder.plan_links(subgraph);
        self.pipeline.link(subgraph.id(), &plan)?;
        subgraph.mark_linked();
        info!("{}: linked {} branch(es) to the sinks", subgraph.id(), plan.links.len());
        Ok(())
    }

    async fn await_terminal(&mut self, subgraph: &mut Subgraph, clip: &ClipDescriptor) -> Terminal {
        let id = subgraph.id();
        loop {
            let Some(message) = self.bus.next().await else {
                warn!("{}: bus closed", id);
                return Terminal::End;
            };

            match self.dispatcher.classify(message) {
                Signal::Ready => {
                    if let Some(terminal) = self.on_ready(subgraph, clip) {
                        return terminal;
                    }
                }
                Signal::BranchReady { branch, report } => {
                    let Some(plan) = self.builder.branch_ready(subgraph, branch, report) else {
                        continue;
                    };
                    if let Err(e) = self.pipeline.link(id, &plan) {
                        warn!("{}: {}", id, e);
                        return Terminal::Error {
                            source: subgraph.name(),
                            message: e.to_string(),
                        };
                    }
                    subgraph.mark_linked();
                    info!("{}: linked {} branch(es) to the sinks", id, plan.links.len());
                }
                Signal::RenderTargetRequest => {
                    if let Err(e) = self.dispatcher.supply_render_target(&mut self.pipeline) {
                        warn!("{}: no render target: {}", id, e);
                    }
                }
                Signal::Terminal(terminal) => return terminal,
                Signal::Discarded => {}
            }
        }
    }

    /// A clip with nothing to play and no duration ends as soon as it is ready
    fn on_ready(&mut self, subgraph: &Subgraph, clip: &ClipDescriptor) -> Option<Terminal> {
        let id = subgraph.id();
        debug!("{}: ready", id);
        if !self.first_ready_fired {
            self.first_ready_fired = true;
            self.ready_hook.on_first_ready();
        }

        let duration = clip.duration();
        if self.timers.is_timed(duration) {
            self.timers.arm_duration(id, duration);
            None
        } else if subgraph.branches().is_empty() {
            debug!("{}: nothing to play", id);
            Some(Terminal::End)
        } else {
            debug!("{}: {:?} is too short to time, playing to end of stream", id, duration);
            None
        }
    }

    async fn drain(&mut self, id: SubgraphId) {
        self.state = SequencerState::Draining;

        if let Err(e) = self.pipeline.set_state(PipelineState::Paused) {
            warn!("{}: {}", id, e);
        }
        self.timers.disarm_all();
        if let Err(e) = self.pipeline.detach(id).await {
            warn!("{}: {}", id, e);
        }
        self.dispatcher.deactivate();

        let flushed = self.bus.flush();
        if flushed > 0 {
            debug!("{}: flushed {} pending message(s)", id, flushed);
        }
        self.state = SequencerState::Idle;
    }

    async fn shutdown(&mut self) {
        self.state = SequencerState::ShuttingDown;

        match self.dispatcher.render_target() {
            Ok(target) => {
                if let Err(e) = self.pipeline.paint_cover(target, self.cover_color).await {
                    warn!("{}", e);
                }
            }
            Err(e) => warn!("No render target for the cover frame: {}", e),
        }

        if let Err(e) = self.pipeline.set_state(PipelineState::Null) {
            warn!("{}", e);
        }
        self.dispatcher.release_render_target();
        info!("Splash sequence finished");
    }
}
