//! Rigid transform of a scene node relative to its parent.

use glam::{DAffine3, DQuat, DVec3};

/// Local position and rotation, plus the parent's world frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeTransform {
    local_position: DVec3,
    local_rotation: DQuat,
    parent_position: DVec3,
    parent_rotation: DQuat,
}

impl NodeTransform {
    pub fn new(local_position: DVec3, local_rotation: DQuat) -> Self {
        Self {
            local_position,
            local_rotation,
            ..Self::default()
        }
    }

    pub fn local_position(&self) -> DVec3 {
        self.local_position
    }

    pub fn local_rotation(&self) -> DQuat {
        self.local_rotation
    }

    pub fn set_local_position(&mut self, position: DVec3) {
        self.local_position = position;
    }

    pub fn set_local_rotation(&mut self, rotation: DQuat) {
        self.local_rotation = rotation.normalize();
    }

    /// Re-parent under a node whose world frame is `parent`.
    pub fn set_parent(&mut self, parent: &NodeTransform) {
        self.parent_position = parent.world_position();
        self.parent_rotation = parent.world_rotation();
    }

    pub fn world_position(&self) -> DVec3 {
        self.parent_position + self.parent_rotation * self.local_position
    }

    pub fn world_rotation(&self) -> DQuat {
        self.parent_rotation * self.local_rotation
    }

    pub fn world_transform(&self) -> DAffine3 {
        DAffine3::from_rotation_translation(self.world_rotation(), self.world_position())
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self {
            local_position: DVec3::ZERO,
            local_rotation: DQuat::IDENTITY,
            parent_position: DVec3::ZERO,
            parent_rotation: DQuat::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_root_world_equals_local() {
        let transform = NodeTransform::new(DVec3::new(1.0, 2.0, 3.0), DQuat::IDENTITY);
        assert_eq!(transform.world_position(), DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.world_rotation(), DQuat::IDENTITY);
    }

    #[test]
    fn test_child_composes_parent_frame() {
        let parent = NodeTransform::new(
            DVec3::new(10.0, 0.0, 0.0),
            DQuat::from_rotation_z(FRAC_PI_2),
        );
        let mut child = NodeTransform::new(DVec3::X, DQuat::IDENTITY);
        child.set_parent(&parent);

        let world = child.world_position();
        assert!((world - DVec3::new(10.0, 1.0, 0.0)).length() < 1e-12);

        let point = child.world_transform().transform_point3(DVec3::X);
        assert!((point - DVec3::new(10.0, 2.0, 0.0)).length() < 1e-12);
    }
}
