//! Stepwise rotation of the mesh frame towards the camera.

use glam::{DQuat, DVec3};

/// Rotate `current` so that its +X axis moves towards `direction` in whole
/// steps of `max_step` radians.
///
/// Nothing changes while the angle between the axis and `direction` is within
/// one step, which keeps the mesh frame still for small camera motion. The
/// residual angle after the update is always below `max_step`.
pub fn closest_rotation_to(current: DQuat, direction: DVec3, max_step: f64) -> DQuat {
    let target = direction.normalize_or_zero();
    if target == DVec3::ZERO {
        return current;
    }

    let axis_x = current * DVec3::X;
    let angle = axis_x.angle_between(target);
    if !(max_step > 0.0) || !max_step.is_finite() {
        return (DQuat::from_rotation_arc(axis_x, target) * current).normalize();
    }
    if angle <= max_step {
        return current;
    }

    let turn = (angle / max_step).floor() * max_step;
    let axis = axis_x.cross(target);
    let axis = if axis.length_squared() > 1.0e-24 {
        axis.normalize()
    } else {
        // Opposite directions: any axis orthogonal to +X works.
        current * DVec3::Y
    };
    (DQuat::from_axis_angle(axis, turn) * current).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_small_offsets_keep_rotation() {
        let direction = DVec3::new(1.0, 0.001, 0.0);
        let rotation = closest_rotation_to(DQuat::IDENTITY, direction, 0.01);
        assert_eq!(rotation, DQuat::IDENTITY);
    }

    #[test]
    fn test_large_offsets_step_towards_target() {
        let step = 0.1;
        let direction = DVec3::new(0.35_f64.cos(), 0.35_f64.sin(), 0.0);
        let rotation = closest_rotation_to(DQuat::IDENTITY, direction, step);

        let axis = rotation * DVec3::X;
        let residual = axis.angle_between(direction.normalize());
        assert!(residual < step);
        // Three whole steps were taken.
        assert!((axis.angle_between(DVec3::X) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_opposite_direction_is_finite() {
        let rotation = closest_rotation_to(DQuat::IDENTITY, DVec3::NEG_X, 0.5);
        assert!(rotation.is_finite());
        let axis = rotation * DVec3::X;
        assert!(axis.angle_between(DVec3::NEG_X) < 0.5);
    }

    #[test]
    fn test_zero_direction_keeps_rotation() {
        let current = DQuat::from_rotation_z(0.3);
        assert_eq!(closest_rotation_to(current, DVec3::ZERO, 0.1), current);
    }

    #[test]
    fn test_non_positive_step_snaps_exactly() {
        let rotation = closest_rotation_to(DQuat::IDENTITY, DVec3::Y, 0.0);
        assert!(((rotation * DVec3::X) - DVec3::Y).length() < EPS);
    }
}
