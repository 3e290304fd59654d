//! Depth-limited flattening of the bucket index into a render sequence.

use crate::filter::ViewFilter;
use crate::index::{BucketIndex, OrderGroup};
use crate::settings::Depth;
use crate::types::DateKey;

/// One entry of the rendered timeline
#[derive(Debug, Clone, PartialEq)]
pub enum RenderNode {
    DateHeadline(DateKey),
    VisibleGroup(OrderGroup),
}

/// Headlines interleaved with the visible groups of each day
///
/// Rebuilt from scratch on every recompute and never edited in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSequence(Vec<RenderNode>);

impl RenderSequence {
    pub fn nodes(&self) -> &[RenderNode] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn groups(&self) -> impl Iterator<Item = &OrderGroup> {
        self.0.iter().filter_map(|node| match node {
            RenderNode::VisibleGroup(group) => Some(group),
            RenderNode::DateHeadline(_) => None,
        })
    }

    pub fn headlines(&self) -> impl Iterator<Item = DateKey> + '_ {
        self.0.iter().filter_map(|node| match node {
            RenderNode::DateHeadline(date) => Some(*date),
            RenderNode::VisibleGroup(_) => None,
        })
    }

    pub fn group_count(&self) -> usize {
        self.groups().count()
    }
}

impl IntoIterator for RenderSequence {
    type Item = RenderNode;
    type IntoIter = std::vec::IntoIter<RenderNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build the render sequence for the current index and filter
///
/// `depth` is a single budget shared by all days. A day only gets a headline
/// when at least one of its groups fits into the remaining budget.
pub fn flatten(index: &BucketIndex, filter: &ViewFilter<'_>, depth: Depth) -> RenderSequence {
    let mut remaining = depth.get();
    let mut nodes = Vec::new();

    for date in index.buckets_descending() {
        if remaining == 0 {
            break;
        }

        let visible = filter.visible_groups(index.groups_of(&date));
        let take = visible.len().min(remaining);
        if take == 0 {
            continue;
        }

        nodes.push(RenderNode::DateHeadline(date));
        nodes.extend(
            visible
                .into_iter()
                .take(take)
                .map(|group| RenderNode::VisibleGroup(group.clone())),
        );
        remaining -= take;
    }

    RenderSequence(nodes)
}
