//! Test doubles for driving the sequencer without launching anything.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{PipelineError, SurfaceError};
use crate::pipeline::{
    BranchReport, BusMessage, BusSender, LinkPlan, MediaKind, OutputPipeline, PipelineState,
    Subgraph, SubgraphId,
};
use crate::surface::{RenderSurface, RenderTarget};

/// Everything the sequencer asked the pipeline to do, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Attach {
        id: SubgraphId,
        at: Duration,
        decoders: usize,
    },
    Link {
        id: SubgraphId,
        plan: LinkPlan,
    },
    State(PipelineState),
    Target(RenderTarget),
    Detach {
        id: SubgraphId,
        at: Duration,
    },
    Cover {
        target: RenderTarget,
        color: [u8; 3],
    },
}

/// How a scripted clip ends once it is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Runs until stopped from outside
    Never,
    Eos(Duration),
    Error(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct ClipScript {
    pub still_image: bool,
    pub ending: Ending,
}

impl ClipScript {
    pub fn never() -> Self {
        Self {
            still_image: false,
            ending: Ending::Never,
        }
    }

    pub fn eos_after(ms: u64) -> Self {
        Self {
            still_image: false,
            ending: Ending::Eos(Duration::from_millis(ms)),
        }
    }

    pub fn error_after(ms: u64) -> Self {
        Self {
            still_image: false,
            ending: Ending::Error(Duration::from_millis(ms)),
        }
    }

    pub fn still(mut self) -> Self {
        self.still_image = true;
        self
    }
}

struct Active {
    id: SubgraphId,
    script: ClipScript,
    linked: bool,
    started: bool,
}

/// Output pipeline that plays back one [`ClipScript`] per attached subgraph.
///
/// Decoder branches report pads right after attach. Once the subgraph is
/// linked and the pipeline is PLAYING it posts async-done and then the
/// scripted ending. Attaching while another subgraph is attached panics.
pub struct ScriptedPipeline {
    bus: BusSender,
    scripts: VecDeque<ClipScript>,
    ops: Vec<Op>,
    started_at: Instant,
    state: PipelineState,
    active: Option<Active>,
    ending: Option<JoinHandle<()>>,
}

impl ScriptedPipeline {
    pub fn new(bus: BusSender, scripts: Vec<ClipScript>) -> Self {
        Self {
            bus,
            scripts: scripts.into(),
            ops: Vec::new(),
            started_at: Instant::now(),
            state: PipelineState::Null,
            active: None,
            ending: None,
        }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn attach_times(&self) -> Vec<(SubgraphId, Duration)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Attach { id, at, .. } => Some((*id, *at)),
                _ => None,
            })
            .collect()
    }

    pub fn detach_times(&self) -> Vec<(SubgraphId, Duration)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Detach { id, at } => Some((*id, *at)),
                _ => None,
            })
            .collect()
    }

    pub fn covers(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, Op::Cover { .. })).count()
    }

    fn maybe_start(&mut self) {
        if self.state != PipelineState::Playing {
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if !active.linked || active.started {
            return;
        }
        active.started = true;

        let subgraph = active.id;
        self.bus.post(BusMessage::AsyncDone { subgraph });

        let bus = self.bus.clone();
        self.ending = match active.script.ending {
            Ending::Never => None,
            Ending::Eos(after) => Some(tokio::spawn(async move {
                tokio::time::sleep(after).await;
                bus.post(BusMessage::Eos { subgraph });
            })),
            Ending::Error(after) => Some(tokio::spawn(async move {
                tokio::time::sleep(after).await;
                bus.post(BusMessage::Error {
                    subgraph,
                    source: format!("{}-decoder", subgraph),
                    message: "scripted failure".to_string(),
                    debug: None,
                });
            })),
        };
    }

    fn stop_ending(&mut self) {
        if let Some(task) = self.ending.take() {
            task.abort();
        }
    }
}

impl OutputPipeline for ScriptedPipeline {
    fn attach(&mut self, subgraph: &Subgraph) -> Result<(), PipelineError> {
        if let Some(active) = &self.active {
            panic!("{} attached while {} is still attached", subgraph.id(), active.id);
        }

        let id = subgraph.id();
        let script = self.scripts.pop_front().unwrap_or_else(ClipScript::never);
        let decoders = subgraph.branches().iter().filter(|b| b.is_decoder()).count();
        self.ops.push(Op::Attach {
            id,
            at: self.started_at.elapsed(),
            decoders,
        });

        if subgraph.has_kind(MediaKind::Video) {
            self.bus.post(BusMessage::PrepareWindowHandle { subgraph: id });
        }
        for branch in subgraph.branches().iter().filter(|b| b.is_decoder()) {
            let report = match branch.kind {
                MediaKind::Video if script.still_image => BranchReport::still_image(),
                kind => BranchReport::new(vec![kind]),
            };
            self.bus.post(BusMessage::NoMorePads {
                subgraph: id,
                branch: branch.id,
                report,
            });
        }

        self.active = Some(Active {
            id,
            script,
            linked: false,
            started: false,
        });
        Ok(())
    }

    fn link(&mut self, subgraph: SubgraphId, plan: &LinkPlan) -> Result<(), PipelineError> {
        let active = self
            .active
            .as_mut()
            .filter(|a| a.id == subgraph)
            .ok_or_else(|| PipelineError::UnknownSubgraph {
                name: subgraph.to_string(),
            })?;
        assert!(!active.linked, "{} linked twice", subgraph);
        active.linked = true;

        self.ops.push(Op::Link {
            id: subgraph,
            plan: plan.clone(),
        });
        self.maybe_start();
        Ok(())
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError> {
        self.ops.push(Op::State(state));
        self.state = state;
        match state {
            PipelineState::Playing => self.maybe_start(),
            PipelineState::Null => self.stop_ending(),
            PipelineState::Ready | PipelineState::Paused => {}
        }
        Ok(())
    }

    fn set_render_target(&mut self, target: RenderTarget) {
        self.ops.push(Op::Target(target));
    }

    async fn detach(&mut self, subgraph: SubgraphId) -> Result<(), PipelineError> {
        match &self.active {
            Some(active) if active.id == subgraph => {}
            _ => {
                return Err(PipelineError::UnknownSubgraph {
                    name: subgraph.to_string(),
                })
            }
        }

        self.stop_ending();
        self.active = None;
        self.ops.push(Op::Detach {
            id: subgraph,
            at: self.started_at.elapsed(),
        });
        Ok(())
    }

    async fn paint_cover(
        &mut self,
        target: RenderTarget,
        color: [u8; 3],
    ) -> Result<(), PipelineError> {
        self.ops.push(Op::Cover { target, color });
        Ok(())
    }
}

/// Root-only surface counting how often the root window is looked up
pub struct CountingSurface {
    pub roots: Rc<Cell<usize>>,
    pub closed: Rc<Cell<usize>>,
}

impl CountingSurface {
    pub fn new() -> Self {
        Self {
            roots: Rc::new(Cell::new(0)),
            closed: Rc::new(Cell::new(0)),
        }
    }
}

impl RenderSurface for CountingSurface {
    fn root(&mut self) -> Result<RenderTarget, SurfaceError> {
        self.roots.set(self.roots.get() + 1);
        Ok(RenderTarget::root(0x2a))
    }

    fn acquire_overlay(&mut self, _root: RenderTarget) -> Option<RenderTarget> {
        None
    }

    fn release_overlay(&mut self, _overlay: RenderTarget) {}

    fn close(&mut self) {
        self.closed.set(self.closed.get() + 1);
    }
}
