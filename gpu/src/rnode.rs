// Lightweight inheritance tree for per-draw graphics/rendertarget state
//
// Austin Shafer - 2024
use std::sync::Arc;

use crate::pipeline::GraphicsState;
use crate::rendertarget::RendertargetLayout;

/// One node in the scene's render tree.
///
/// A node inherits its parent's `graphics_state`/`rendertarget_layout` by
/// value at `add_child` time: later mutating the parent has no effect on
/// children already created from it. This mirrors how a scene graph's
/// render state is snapshotted as it's inherited down the tree rather
/// than looked up dynamically at draw time.
pub struct Rnode {
    pub graphics_state: Arc<GraphicsState>,
    pub rendertarget_layout: RendertargetLayout,
    children: Vec<Rnode>,
}

impl Rnode {
    pub fn new(graphics_state: Arc<GraphicsState>, rendertarget_layout: RendertargetLayout) -> Self {
        Self {
            graphics_state,
            rendertarget_layout,
            children: Vec::new(),
        }
    }

    /// Adds a child that inherits this node's state by copy.
    pub fn add_child(&mut self) -> &mut Rnode {
        let child = Rnode {
            graphics_state: self.graphics_state.clone(),
            rendertarget_layout: self.rendertarget_layout.clone(),
            children: Vec::new(),
        };
        self.children.push(child);
        self.children.last_mut().unwrap()
    }

    pub fn children(&self) -> &[Rnode] {
        &self.children
    }

    /// Drops every child, leaving this node's own state untouched. Called
    /// between scene rebuilds instead of reallocating the whole tree.
    pub fn reset(&mut self) {
        self.children.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use crate::pipeline::{FixedFunctionState, GraphicsState, Topology};

    fn state(samples: u32) -> (Arc<GraphicsState>, RendertargetLayout) {
        let layout = RendertargetLayout {
            samples,
            colors: vec![(Format::Rgba8Unorm, false)],
            depth_stencil: None,
        };
        let gs = Arc::new(GraphicsState {
            vertex_buffers: Vec::new(),
            rt_layout: layout.clone(),
            topology: Topology::TriangleList,
            fixed_function: FixedFunctionState::default(),
        });
        (gs, layout)
    }

    #[test]
    fn child_inherits_a_snapshot_of_the_parents_state() {
        let (gs, layout) = state(1);
        let mut root = Rnode::new(gs.clone(), layout.clone());
        let _child = root.add_child();

        assert_eq!(root.children().len(), 1);
        assert!(Arc::ptr_eq(&root.children()[0].graphics_state, &gs));
        assert_eq!(root.children()[0].rendertarget_layout, layout);
    }

    #[test]
    fn mutating_the_parent_after_add_child_does_not_affect_existing_children() {
        let (gs, layout) = state(1);
        let mut root = Rnode::new(gs, layout);
        root.add_child();

        let (new_gs, new_layout) = state(4);
        root.graphics_state = new_gs;
        root.rendertarget_layout = new_layout;

        assert_eq!(root.children()[0].rendertarget_layout.samples, 1);
    }

    #[test]
    fn reset_clears_children_but_keeps_own_state() {
        let (gs, layout) = state(1);
        let mut root = Rnode::new(gs.clone(), layout.clone());
        root.add_child();
        root.add_child();
        assert_eq!(root.children().len(), 2);

        root.reset();
        assert_eq!(root.children().len(), 0);
        assert!(Arc::ptr_eq(&root.graphics_state, &gs));
        assert_eq!(root.rendertarget_layout, layout);
    }
}
