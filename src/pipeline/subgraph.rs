use std::fmt;
use std::path::{Path, PathBuf};

use crate::pipeline::MediaKind;

/// Identifies one subgraph (and therefore one clip) for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubgraphId(pub u64);

impl fmt::Display for SubgraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bin{}", self.0)
    }
}

/// Index of a branch within its subgraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchId(pub usize);

/// What feeds a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchSource {
    /// File source followed by a decoder
    File(PathBuf),

    /// Tone generator followed by a zero-volume stage
    Silence,
}

impl BranchSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Silence => None,
        }
    }
}

/// What a decoder announced once it finished creating output pads
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BranchReport {
    /// Output shapes offered, in pad order
    pub outputs: Vec<MediaKind>,

    /// Type detection found a still image rather than a stream
    pub still_image: bool,
}

impl BranchReport {
    pub fn new(outputs: Vec<MediaKind>) -> Self {
        Self {
            outputs,
            still_image: false,
        }
    }

    pub fn still_image() -> Self {
        Self {
            outputs: vec![MediaKind::Video],
            still_image: true,
        }
    }
}

/// One media-kind-specific source/decoder pair
#[derive(Debug, Clone)]
pub struct DecodeBranch {
    pub id: BranchId,
    pub kind: MediaKind,
    pub source: BranchSource,
    ready: bool,
    outputs: Vec<MediaKind>,
    hold: bool,
}

impl DecodeBranch {
    pub fn decoder(id: BranchId, kind: MediaKind, path: PathBuf) -> Self {
        Self {
            id,
            kind,
            source: BranchSource::File(path),
            ready: false,
            outputs: Vec::new(),
            hold: false,
        }
    }

    /// The silence branch has static pads, so it is ready from the start
    pub fn silence(id: BranchId) -> Self {
        Self {
            id,
            kind: MediaKind::Audio,
            source: BranchSource::Silence,
            ready: true,
            outputs: vec![MediaKind::Audio],
            hold: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_decoder(&self) -> bool {
        matches!(self.source, BranchSource::File(_))
    }

    /// Output shapes this branch can feed into sinks
    pub fn outputs(&self) -> &[MediaKind] {
        &self.outputs
    }

    /// Whether a hold element repeats the last frame after the decoder
    pub fn has_hold(&self) -> bool {
        self.hold
    }

    /// Record the decoder's report. Returns false if it was already ready.
    pub(crate) fn mark_ready(&mut self, report: BranchReport) -> bool {
        if self.ready {
            return false;
        }
        self.ready = true;
        self.hold = report.still_image && report.outputs.contains(&MediaKind::Video);
        self.outputs = report.outputs;
        true
    }
}

/// Countdown of branches that have not reported readiness yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinState {
    outstanding: usize,
}

impl JoinState {
    pub fn new(outstanding: usize) -> Self {
        Self { outstanding }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn is_complete(&self) -> bool {
        self.outstanding == 0
    }

    /// Count one branch as ready. Returns true exactly when this call
    /// brings the count to zero.
    pub fn complete_one(&mut self) -> bool {
        if self.outstanding == 0 {
            return false;
        }
        self.outstanding -= 1;
        self.outstanding == 0
    }
}

/// Connection of one branch output to one shared sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkLink {
    pub branch: BranchId,
    pub sink: MediaKind,

    /// Link through the hold element instead of straight from the decoder
    pub via_hold: bool,
}

/// Every sink connection for one subgraph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPlan {
    pub links: Vec<SinkLink>,
}

impl LinkPlan {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn link_for(&self, sink: MediaKind) -> Option<&SinkLink> {
        self.links.iter().find(|l| l.sink == sink)
    }

    /// Whether the branch feeds any sink at all
    pub fn is_linked(&self, branch: BranchId) -> bool {
        self.links.iter().any(|l| l.branch == branch)
    }
}

/// Per-clip processing unit: the branches built for one clip
#[derive(Debug, Clone)]
pub struct Subgraph {
    id: SubgraphId,
    branches: Vec<DecodeBranch>,
    join: JoinState,
    linked: bool,
}

impl Subgraph {
    pub(crate) fn new(id: SubgraphId, branches: Vec<DecodeBranch>) -> Self {
        let outstanding = branches.iter().filter(|b| !b.is_ready()).count();
        Self {
            id,
            branches,
            join: JoinState::new(outstanding),
            linked: false,
        }
    }

    pub fn id(&self) -> SubgraphId {
        self.id
    }

    pub fn name(&self) -> String {
        self.id.to_string()
    }

    pub fn branches(&self) -> &[DecodeBranch] {
        &self.branches
    }

    pub(crate) fn branch_mut(&mut self, id: BranchId) -> Option<&mut DecodeBranch> {
        self.branches.iter_mut().find(|b| b.id == id)
    }

    pub fn join(&self) -> JoinState {
        self.join
    }

    pub(crate) fn join_mut(&mut self) -> &mut JoinState {
        &mut self.join
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub(crate) fn mark_linked(&mut self) {
        self.linked = true;
    }

    /// Whether any branch decodes a file
    pub fn has_decoder(&self) -> bool {
        self.branches.iter().any(DecodeBranch::is_decoder)
    }

    pub fn has_kind(&self, kind: MediaKind) -> bool {
        self.branches.iter().any(|b| b.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_reaches_zero_once() {
        let mut join = JoinState::new(2);
        assert!(!join.complete_one());
        assert!(join.complete_one());
        assert!(join.is_complete());
        assert!(!join.complete_one());
    }

    #[test]
    fn test_silence_branch_starts_ready() {
        let subgraph = Subgraph::new(
            SubgraphId(0),
            vec![
                DecodeBranch::decoder(BranchId(0), MediaKind::Video, PathBuf::from("a.mp4")),
                DecodeBranch::silence(BranchId(1)),
            ],
        );
        assert_eq!(subgraph.join().outstanding(), 1);
        assert_eq!(subgraph.name(), "bin0");
    }

    #[test]
    fn test_hold_only_for_still_video() {
        let mut branch = DecodeBranch::decoder(BranchId(0), MediaKind::Video, PathBuf::from("a.png"));
        assert!(branch.mark_ready(BranchReport::still_image()));
        assert!(branch.has_hold());
        assert!(!branch.mark_ready(BranchReport::new(vec![MediaKind::Audio])));

        let mut branch = DecodeBranch::decoder(BranchId(1), MediaKind::Audio, PathBuf::from("a.ogg"));
        branch.mark_ready(BranchReport {
            outputs: vec![MediaKind::Audio],
            still_image: true,
        });
        assert!(!branch.has_hold());
    }
}
