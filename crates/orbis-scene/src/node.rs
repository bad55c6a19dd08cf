//! Scene node contract and the per-frame contexts passed to it.

use orbis_render::GpuBackend;
use tracing::trace;

use crate::camera::Camera;
use crate::transform::NodeTransform;
use crate::ui::DebugPanel;

/// Global render switches owned by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSettings {
    /// Draw every primary submission as lines.
    pub wireframe: bool,
}

/// State handed to [`SceneNode::tick`].
pub struct TickContext<'a> {
    pub delta_time: f64,
    pub camera: &'a Camera,
    pub gpu: &'a mut dyn GpuBackend,
}

/// State handed to [`SceneNode::render`].
pub struct RenderContext<'a> {
    pub camera: &'a Camera,
    pub settings: RenderSettings,
    pub gpu: &'a mut dyn GpuBackend,
}

/// A node of the scene graph.
pub trait SceneNode {
    fn name(&self) -> &str;

    fn transform(&self) -> &NodeTransform;

    fn transform_mut(&mut self) -> &mut NodeTransform;

    /// Advance the node by one frame. Called before [`render`](Self::render).
    fn tick(&mut self, ctx: &mut TickContext<'_>);

    /// Submit draw calls for the frame.
    fn render(&mut self, ctx: &mut RenderContext<'_>);

    /// Describe editable state to a debug panel.
    fn draw_ui(&mut self, ui: &mut dyn DebugPanel) {
        let _ = ui;
    }
}

/// Flat list of root nodes, ticked then rendered in insertion order.
#[derive(Default)]
pub struct Scene {
    nodes: Vec<Box<dyn SceneNode>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Box<dyn SceneNode>) {
        self.nodes.push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &dyn SceneNode> {
        self.nodes.iter().map(|node| node.as_ref())
    }

    pub fn tick(&mut self, delta_time: f64, camera: &Camera, gpu: &mut dyn GpuBackend) {
        let mut ctx = TickContext {
            delta_time,
            camera,
            gpu,
        };
        for node in &mut self.nodes {
            trace!(node = node.name(), "tick");
            node.tick(&mut ctx);
        }
    }

    pub fn render(&mut self, camera: &Camera, settings: RenderSettings, gpu: &mut dyn GpuBackend) {
        let mut ctx = RenderContext {
            camera,
            settings,
            gpu,
        };
        for node in &mut self.nodes {
            node.render(&mut ctx);
        }
    }

    pub fn draw_ui(&mut self, ui: &mut dyn DebugPanel) {
        for node in &mut self.nodes {
            ui.text(node.name());
            node.draw_ui(ui);
            ui.separator();
        }
    }
}
