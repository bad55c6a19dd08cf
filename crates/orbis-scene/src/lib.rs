//! Scene graph contract consumed by the planet: node trait, transforms,
//! camera, per-frame contexts and the debug panel.

pub mod camera;
pub mod node;
pub mod transform;
pub mod ui;

pub use camera::Camera;
pub use node::{RenderContext, RenderSettings, Scene, SceneNode, TickContext};
pub use transform::NodeTransform;
pub use ui::{DebugPanel, PanelInput, ScriptedPanel};
