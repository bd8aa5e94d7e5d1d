use tokio::sync::mpsc;
use tracing::trace;

use crate::pipeline::subgraph::{BranchId, BranchReport, SubgraphId};
use crate::pipeline::PipelineState;

/// The two timeout classes armed per clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Duration,
    Watchdog,
}

/// Everything that can arrive on the pipeline bus
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// The pipeline finished an asynchronous state change (prerolled)
    AsyncDone { subgraph: SubgraphId },

    StateChanged {
        old: PipelineState,
        new: PipelineState,
    },

    /// A decoder branch will create no more output pads
    NoMorePads {
        subgraph: SubgraphId,
        branch: BranchId,
        report: BranchReport,
    },

    /// The video sink wants a window handle
    PrepareWindowHandle { subgraph: SubgraphId },

    /// Any other element message
    Element { subgraph: SubgraphId, name: String },

    Error {
        subgraph: SubgraphId,
        source: String,
        message: String,
        debug: Option<String>,
    },

    Eos { subgraph: SubgraphId },

    SegmentDone { subgraph: SubgraphId },

    /// Posted by the timer service
    Timeout {
        subgraph: SubgraphId,
        kind: TimeoutKind,
    },

    Latency,
}

impl BusMessage {
    /// Short type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AsyncDone { .. } => "async-done",
            Self::StateChanged { .. } => "state-changed",
            Self::NoMorePads { .. } => "no-more-pads",
            Self::PrepareWindowHandle { .. } => "prepare-window-handle",
            Self::Element { .. } => "element",
            Self::Error { .. } => "error",
            Self::Eos { .. } => "eos",
            Self::SegmentDone { .. } => "segment-done",
            Self::Timeout { .. } => "timeout",
            Self::Latency => "latency",
        }
    }
}

/// Cloneable posting end of the bus
#[derive(Debug, Clone)]
pub struct BusSender {
    tx: mpsc::UnboundedSender<BusMessage>,
}

impl BusSender {
    /// Post a message. Returns false once the bus is gone.
    pub fn post(&self, message: BusMessage) -> bool {
        trace!("bus <- {}", message.type_name());
        self.tx.send(message).is_ok()
    }
}

/// Receiving end of the pipeline bus, owned by the sequencer
#[derive(Debug)]
pub struct Bus {
    tx: mpsc::UnboundedSender<BusMessage>,
    rx: mpsc::UnboundedReceiver<BusMessage>,
}

impl Bus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> BusSender {
        BusSender {
            tx: self.tx.clone(),
        }
    }

    /// Wait for the next message. The bus keeps a sender of its own, so this
    /// only ever returns `None` if the channel is closed from outside.
    pub async fn next(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }

    /// Drop every queued message, returning how many were discarded
    pub fn flush(&mut self) -> usize {
        let mut flushed = 0;
        while self.rx.try_recv().is_ok() {
            flushed += 1;
        }
        flushed
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
