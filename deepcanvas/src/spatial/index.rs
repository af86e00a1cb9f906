//! Quad-tree construction and queries.

use std::collections::HashSet;

use tracing::debug;

use crate::geom::{DrawPoint, DrawRect};
use crate::primitive::{primitive_id, PrimitiveRef};

/// One node of the quad-tree.
///
/// Level 0 is a leaf; an internal node always has exactly four children
/// whose bounds quarter its own. All bounds derive from the root rectangle
/// by exact grid subdivision, so sibling quadrants are disjoint (half-open)
/// and seam-free at every level.
pub struct SpatialNode {
    bounds: DrawRect,
    level: u32,
    primitives: Vec<PrimitiveRef>,
    children: Option<Box<[SpatialNode; 4]>>,
}

impl SpatialNode {
    pub fn bounds(&self) -> &DrawRect {
        &self.bounds
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Primitives whose bounds intersect this node's quadrant.
    ///
    /// On non-leaf nodes this is the broad-phase subset the children were
    /// filtered from.
    pub fn primitives(&self) -> &[PrimitiveRef] {
        &self.primitives
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    fn build(
        root_bounds: &DrawRect,
        depth: u32,
        level: u32,
        gx: u32,
        gy: u32,
        primitives: Vec<PrimitiveRef>,
    ) -> SpatialNode {
        let divisions = 1u32 << (depth - level);
        let bounds = root_bounds.grid_cell(gx, gy, divisions);

        let children = if level > 0 {
            let quadrants = [(0u32, 0u32), (1, 0), (0, 1), (1, 1)].map(|(dx, dy)| {
                let (cgx, cgy) = (gx * 2 + dx, gy * 2 + dy);
                let child_bounds =
                    root_bounds.grid_cell(cgx, cgy, 1u32 << (depth - level + 1));
                let subset: Vec<PrimitiveRef> = primitives
                    .iter()
                    .filter(|p| p.bounds().intersects(&child_bounds))
                    .cloned()
                    .collect();
                Self::build(root_bounds, depth, level - 1, cgx, cgy, subset)
            });
            Some(Box::new(quadrants))
        } else {
            None
        };

        SpatialNode {
            bounds,
            level,
            primitives,
            children,
        }
    }

    fn collect_leaves<'a>(&'a self, rect: &DrawRect, out: &mut Vec<&'a SpatialNode>) {
        if !self.bounds.intersects(rect) {
            return;
        }
        match &self.children {
            Some(children) => {
                for child in children.iter() {
                    child.collect_leaves(rect, out);
                }
            }
            None => out.push(self),
        }
    }

    fn leaf_at(&self, point: DrawPoint) -> Option<&SpatialNode> {
        if !self.bounds.contains(point) {
            return None;
        }
        match &self.children {
            // Quadrants are disjoint, so at most one child matches.
            Some(children) => children.iter().find_map(|c| c.leaf_at(point)),
            None => Some(self),
        }
    }
}

/// Quad-tree spatial index over a drawing's primitives.
pub struct SpatialIndex {
    root: SpatialNode,
    bounds: DrawRect,
    depth: u32,
}

impl SpatialIndex {
    /// Build the index by recursively quartering `root_bounds` `depth`
    /// times.
    ///
    /// Each child receives the subset of its parent's primitives whose
    /// bounds intersect the child's quadrant; a primitive straddling a
    /// boundary lands in every intersecting child. Primitives with
    /// degenerate bounds are dropped up front.
    pub fn build(primitives: &[PrimitiveRef], root_bounds: DrawRect, depth: u32) -> Self {
        let indexable: Vec<PrimitiveRef> = primitives
            .iter()
            .filter(|p| !p.bounds().is_empty())
            .cloned()
            .collect();
        let dropped = primitives.len() - indexable.len();
        if dropped > 0 {
            debug!(dropped, "dropped primitives with degenerate bounds");
        }

        let root = SpatialNode::build(&root_bounds, depth, depth, 0, 0, indexable);
        debug!(
            depth,
            indexed = root.primitives.len(),
            "spatial index built"
        );
        Self {
            root,
            bounds: root_bounds,
            depth,
        }
    }

    /// Root bounds the index was built over.
    pub fn bounds(&self) -> DrawRect {
        self.bounds
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Leaf nodes whose bounds intersect `rect`.
    ///
    /// Subtrees whose bounds miss `rect` are pruned without descent.
    pub fn query_rect(&self, rect: &DrawRect) -> Vec<&SpatialNode> {
        let mut out = Vec::new();
        self.root.collect_leaves(rect, &mut out);
        out
    }

    /// The unique leaf containing `point`, or `None` outside the root.
    ///
    /// A point exactly on the root's max edge is outside (half-open rule).
    pub fn query_point(&self, point: DrawPoint) -> Option<&SpatialNode> {
        self.root.leaf_at(point)
    }

    /// Unique primitives whose bounds intersect `rect`.
    ///
    /// The broad-phase duplication means a straddling primitive appears in
    /// several leaves; results are deduplicated by shared-reference
    /// identity before being returned.
    pub fn query_primitives(&self, rect: &DrawRect) -> Vec<PrimitiveRef> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for leaf in self.query_rect(rect) {
            for primitive in leaf.primitives() {
                if primitive.bounds().intersects(rect) && seen.insert(primitive_id(primitive)) {
                    out.push(primitive.clone());
                }
            }
        }
        out
    }
}
