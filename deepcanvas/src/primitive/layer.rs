//! Layered document model.
//!
//! A thin stand-in for the document collaborator: primitives grouped into
//! named layers with visibility flags, queryable by rectangle. The spatial
//! index and tile pyramid only ever see the flattened visible primitive
//! set.

use super::{Primitive, PrimitiveRef};
use crate::geom::DrawRect;

/// A named group of primitives with a visibility flag.
pub struct Layer {
    name: String,
    visible: bool,
    primitives: Vec<PrimitiveRef>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            primitives: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Add a primitive to the layer, sharing it by reference.
    pub fn push(&mut self, primitive: PrimitiveRef) {
        self.primitives.push(primitive);
    }

    pub fn primitives(&self) -> &[PrimitiveRef] {
        &self.primitives
    }

    /// Primitives whose bounds intersect `rect` (half-open test).
    pub fn query_rect(&self, rect: &DrawRect) -> Vec<PrimitiveRef> {
        self.primitives
            .iter()
            .filter(|p| p.bounds().intersects(rect))
            .cloned()
            .collect()
    }
}

/// A drawing document: an ordered list of layers.
#[derive(Default)]
pub struct Drawing {
    layers: Vec<Layer>,
}

impl Drawing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.name == name)
    }

    /// The flattened primitive set of all visible layers, in layer order.
    pub fn visible_primitives(&self) -> Vec<PrimitiveRef> {
        self.layers
            .iter()
            .filter(|l| l.visible)
            .flat_map(|l| l.primitives.iter().cloned())
            .collect()
    }

    /// Union of the bounds of every visible primitive.
    ///
    /// Degenerate primitive bounds are skipped; a drawing with nothing
    /// visible has empty extents, which the pyramid treats as a valid
    /// blank drawing rather than an error.
    pub fn extents(&self) -> DrawRect {
        let mut extents: Option<DrawRect> = None;
        for layer in self.layers.iter().filter(|l| l.visible) {
            for primitive in &layer.primitives {
                let b = primitive.bounds();
                if b.is_empty() {
                    continue;
                }
                extents = Some(match extents {
                    Some(e) => e.union(&b),
                    None => b,
                });
            }
        }
        extents.unwrap_or_default()
    }
}
