use tracing::{debug, info};

use crate::clip::{AudioSource, ClipDescriptor};
use crate::pipeline::{
    BranchId, BranchReport, DecodeBranch, LinkPlan, MediaKind, SinkLink, Subgraph, SubgraphId,
};

/// Builds one subgraph per clip and decides how it connects to the shared sinks.
///
/// Branches are linked only after every decoder in the subgraph has reported
/// its output pads. Each sink takes the first branch that offers its media
/// kind, in branch order (video before audio).
#[derive(Debug, Default)]
pub struct SubgraphBuilder {
    next_id: u64,
}

impl SubgraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the subgraph for `clip`
    pub fn build(&mut self, clip: &ClipDescriptor) -> Subgraph {
        let id = SubgraphId(self.next_id);
        self.next_id += 1;

        let mut branches = Vec::with_capacity(2);

        if let Some(video) = &clip.video {
            branches.push(DecodeBranch::decoder(
                BranchId(branches.len()),
                MediaKind::Video,
                video.clone(),
            ));
        }

        match &clip.audio {
            Some(AudioSource::Silence) => {
                branches.push(DecodeBranch::silence(BranchId(branches.len())));
            }
            Some(AudioSource::File(path)) => {
                branches.push(DecodeBranch::decoder(
                    BranchId(branches.len()),
                    MediaKind::Audio,
                    path.clone(),
                ));
            }
            None => {}
        }

        let subgraph = Subgraph::new(id, branches);
        info!(
            "Built {} with {} branches ({} awaiting pads)",
            id,
            subgraph.branches().len(),
            subgraph.join().outstanding()
        );
        subgraph
    }

    /// Record that `branch` finished creating pads.
    ///
    /// Returns the link plan exactly once: when the last outstanding branch of
    /// the subgraph becomes ready. Repeated or unknown reports return `None`.
    pub fn branch_ready(
        &self,
        subgraph: &mut Subgraph,
        branch: BranchId,
        report: BranchReport,
    ) -> Option<LinkPlan> {
        let id = subgraph.id();
        let Some(target) = subgraph.branch_mut(branch) else {
            debug!("{}: ready report for unknown branch {:?}", id, branch);
            return None;
        };

        debug!(
            "{}: {} branch has finished pad creation (outputs {:?}, still image: {})",
            id, target.kind, report.outputs, report.still_image
        );
        if !target.mark_ready(report) {
            debug!("{}: duplicate ready report for {:?}", id, branch);
            return None;
        }

        if subgraph.join_mut().complete_one() {
            Some(self.plan_links(subgraph))
        } else {
            None
        }
    }

    /// Assign each sink to the first ready branch offering its media kind
    pub fn plan_links(&self, subgraph: &Subgraph) -> LinkPlan {
        let mut plan = LinkPlan::default();

        for branch in subgraph.branches().iter().filter(|b| b.is_ready()) {
            for &kind in branch.outputs() {
                if plan.link_for(kind).is_some() {
                    debug!(
                        "{}: {} sink already taken, not linking {} branch",
                        subgraph.id(),
                        kind,
                        branch.kind
                    );
                    continue;
                }
                plan.links.push(SinkLink {
                    branch: branch.id,
                    sink: kind,
                    via_hold: kind == MediaKind::Video && branch.has_hold(),
                });
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BranchSource;

    #[test]
    fn test_video_only_clip() {
        let mut builder = SubgraphBuilder::new();
        let subgraph = builder.build(&ClipDescriptor::from_fields("a.mp4", "", 3000));

        assert_eq!(subgraph.branches().len(), 1);
        assert_eq!(subgraph.branches()[0].kind, MediaKind::Video);
        assert_eq!(subgraph.join().outstanding(), 1);
    }

    #[test]
    fn test_ids_are_unique_per_builder() {
        let mut builder = SubgraphBuilder::new();
        let clip = ClipDescriptor::from_fields("a.mp4", "", 0);
        let first = builder.build(&clip);
        let second = builder.build(&clip);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_silence_builds_no_decoder() {
        let mut builder = SubgraphBuilder::new();
        let subgraph = builder.build(&ClipDescriptor::from_fields("", "s", 0));

        assert_eq!(subgraph.branches().len(), 1);
        assert_eq!(subgraph.branches()[0].source, BranchSource::Silence);
        assert!(!subgraph.has_decoder());
        assert!(subgraph.join().is_complete());

        let plan = builder.plan_links(&subgraph);
        assert_eq!(plan.links.len(), 1);
        assert_eq!(plan.links[0].sink, MediaKind::Audio);
    }

    #[test]
    fn test_links_only_after_all_branches_ready() {
        let mut builder = SubgraphBuilder::new();
        let mut subgraph = builder.build(&ClipDescriptor::from_fields("a.mp4", "b.ogg", 0));

        let first = builder.branch_ready(
            &mut subgraph,
            BranchId(1),
            BranchReport::new(vec![MediaKind::Audio]),
        );
        assert!(first.is_none());

        let plan = builder
            .branch_ready(&mut subgraph, BranchId(0), BranchReport::new(vec![MediaKind::Video]))
            .expect("last branch completes the join");
        assert_eq!(plan.links.len(), 2);
        assert_eq!(plan.link_for(MediaKind::Video).unwrap().branch, BranchId(0));
        assert_eq!(plan.link_for(MediaKind::Audio).unwrap().branch, BranchId(1));
    }

    #[test]
    fn test_duplicate_ready_does_not_relink() {
        let mut builder = SubgraphBuilder::new();
        let mut subgraph = builder.build(&ClipDescriptor::from_fields("a.mp4", "", 0));

        let report = BranchReport::new(vec![MediaKind::Video]);
        assert!(builder.branch_ready(&mut subgraph, BranchId(0), report.clone()).is_some());
        assert!(builder.branch_ready(&mut subgraph, BranchId(0), report).is_none());
        assert!(builder
            .branch_ready(&mut subgraph, BranchId(7), BranchReport::default())
            .is_none());
    }

    #[test]
    fn test_first_audio_offer_wins() {
        let mut builder = SubgraphBuilder::new();
        let mut subgraph = builder.build(&ClipDescriptor::from_fields("movie.mp4", "b.ogg", 0));

        builder.branch_ready(
            &mut subgraph,
            BranchId(1),
            BranchReport::new(vec![MediaKind::Audio]),
        );
        let plan = builder
            .branch_ready(
                &mut subgraph,
                BranchId(0),
                BranchReport::new(vec![MediaKind::Video, MediaKind::Audio]),
            )
            .unwrap();

        // The video branch comes first, so its soundtrack takes the audio sink
        assert_eq!(plan.links.len(), 2);
        assert_eq!(plan.link_for(MediaKind::Audio).unwrap().branch, BranchId(0));
        assert!(!plan.is_linked(BranchId(1)));
    }

    #[test]
    fn test_still_image_links_through_hold() {
        let mut builder = SubgraphBuilder::new();
        let mut subgraph = builder.build(&ClipDescriptor::from_fields("logo.png", "s", 5000));

        let plan = builder
            .branch_ready(&mut subgraph, BranchId(0), BranchReport::still_image())
            .unwrap();

        let video = plan.link_for(MediaKind::Video).unwrap();
        assert!(video.via_hold);
        assert!(subgraph.branches()[0].has_hold());
        assert_eq!(plan.link_for(MediaKind::Audio).unwrap().branch, BranchId(1));
    }

    #[test]
    fn test_empty_clip_has_empty_plan() {
        let mut builder = SubgraphBuilder::new();
        let subgraph = builder.build(&ClipDescriptor::from_fields("", "", 1000));
        assert!(subgraph.join().is_complete());
        assert!(builder.plan_links(&subgraph).is_empty());
    }
}
