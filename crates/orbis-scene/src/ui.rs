//! Immediate-mode debug panel contract.
//!
//! Nodes describe their editable state through [`DebugPanel`] every frame;
//! each widget call returns `true` when the value was changed by the user.

use std::collections::HashMap;

/// Widgets a node may use in `draw_ui`.
pub trait DebugPanel {
    fn text(&mut self, text: &str);
    fn separator(&mut self);
    fn slider_int(&mut self, label: &str, value: &mut i32, min: i32, max: i32) -> bool;
    fn slider_float(&mut self, label: &str, value: &mut f32, min: f32, max: f32) -> bool;
    fn drag_float(&mut self, label: &str, value: &mut f32, speed: f32) -> bool;
    fn checkbox(&mut self, label: &str, value: &mut bool) -> bool;
}

/// Value queued on a [`ScriptedPanel`] widget.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PanelInput {
    Int(i32),
    Float(f32),
    Bool(bool),
}

/// Panel driven by queued inputs instead of a user. Each queued input is
/// applied once, the next time the matching widget is drawn.
#[derive(Debug, Default)]
pub struct ScriptedPanel {
    pending: HashMap<String, PanelInput>,
    labels: Vec<String>,
    texts: Vec<String>,
}

impl ScriptedPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `input` for the widget labelled `label`.
    pub fn set(&mut self, label: &str, input: PanelInput) {
        self.pending.insert(label.to_string(), input);
    }

    /// Labels of every widget drawn, in order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Every text line drawn.
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    fn take(&mut self, label: &str) -> Option<PanelInput> {
        self.labels.push(label.to_string());
        self.pending.remove(label)
    }
}

impl DebugPanel for ScriptedPanel {
    fn text(&mut self, text: &str) {
        self.texts.push(text.to_string());
    }

    fn separator(&mut self) {}

    fn slider_int(&mut self, label: &str, value: &mut i32, min: i32, max: i32) -> bool {
        match self.take(label) {
            Some(PanelInput::Int(v)) => {
                *value = v.clamp(min, max);
                true
            }
            _ => false,
        }
    }

    fn slider_float(&mut self, label: &str, value: &mut f32, min: f32, max: f32) -> bool {
        match self.take(label) {
            Some(PanelInput::Float(v)) => {
                *value = v.clamp(min, max);
                true
            }
            _ => false,
        }
    }

    fn drag_float(&mut self, label: &str, value: &mut f32, _speed: f32) -> bool {
        match self.take(label) {
            Some(PanelInput::Float(v)) => {
                *value = v;
                true
            }
            _ => false,
        }
    }

    fn checkbox(&mut self, label: &str, value: &mut bool) -> bool {
        match self.take(label) {
            Some(PanelInput::Bool(v)) => {
                *value = v;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_input_applies_once() {
        let mut panel = ScriptedPanel::new();
        panel.set("lods", PanelInput::Int(7));

        let mut lods = 3;
        assert!(panel.slider_int("lods", &mut lods, 1, 40));
        assert_eq!(lods, 7);
        assert!(!panel.slider_int("lods", &mut lods, 1, 40));
        assert_eq!(panel.labels(), &["lods".to_string(), "lods".to_string()]);
    }

    #[test]
    fn test_slider_clamps_to_range() {
        let mut panel = ScriptedPanel::new();
        panel.set("width", PanelInput::Float(50.0));
        let mut width = 1.0;
        assert!(panel.slider_float("width", &mut width, 0.05, 10.0));
        assert_eq!(width, 10.0);
    }

    #[test]
    fn test_mismatched_input_kind_is_ignored() {
        let mut panel = ScriptedPanel::new();
        panel.set("flag", PanelInput::Int(1));
        let mut flag = false;
        assert!(!panel.checkbox("flag", &mut flag));
        assert!(!flag);
    }
}
