//! Camera-relative chunk placement.
//!
//! The camera offset, expressed in the unrotated mesh frame, is projected on
//! the sphere to a 2D page coordinate. Each level snaps that coordinate to
//! its own grid and orients the ring template so that its wide sides face the
//! camera.

use std::f64::consts::{FRAC_PI_2, PI};

use glam::{DAffine3, DQuat, DVec2, DVec3};

/// `asin` with the argument clamped to `[-1, 1]`, so floating error past the
/// domain never turns into NaN.
pub fn guarded_asin(value: f64) -> f64 {
    value.clamp(-1.0, 1.0).asin()
}

/// Arc-length coordinate of the camera on the sphere, in the mesh frame.
///
/// `camera_local` is the camera offset from the planet centre rotated into
/// the mesh frame, whose +X axis points at the chunk origin. The first
/// component is the arc along Y, the second the arc along Z.
pub fn surface_coordinate(camera_local: DVec3, radius: f64) -> DVec2 {
    let along_y = DVec3::new(camera_local.x, camera_local.y, 0.0)
        .normalize_or_zero()
        .y;
    let along_z = camera_local.normalize_or_zero().z;
    DVec2::new(guarded_asin(along_y), guarded_asin(along_z)) * radius
}

/// Half-cell biased rounding: the result is always an odd multiple of
/// `snapping / 2`, never a grid line.
pub fn snap(local: f64, snapping: f64) -> f64 {
    ((local / snapping + 0.5).round() - 0.5) * snapping
}

pub fn snap_position(local: DVec2, snapping: f64) -> DVec2 {
    DVec2::new(snap(local.x, snapping), snap(local.y, snapping))
}

/// Rotation about +Y that puts the ring's wide sides on the camera's quadrant.
///
/// A camera exactly on both snapping lines gets a half turn.
pub fn quadrant_rotation(local: DVec2, chunk_position: DVec2) -> f64 {
    let past_x = local.x >= chunk_position.x;
    let past_y = local.y >= chunk_position.y;
    match (past_x, past_y) {
        (true, false) => -FRAC_PI_2,
        (false, true) => FRAC_PI_2,
        (true, true) => PI,
        (false, false) => 0.0,
    }
}

/// Where one level of the chain sits this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkPlacement {
    /// Camera surface coordinate.
    pub local: DVec2,
    /// Snapped chunk centre on the page.
    pub chunk_position: DVec2,
    /// Quadrant rotation about +Y, zero for the central disc.
    pub rotation: f64,
    /// Grid to chunk-local transform.
    pub transform: DAffine3,
}

impl ChunkPlacement {
    /// Place the level `current_lod` whose cells are `cell_size` wide.
    pub fn compute(camera_local: DVec3, radius: f64, cell_size: f64, current_lod: u32) -> Self {
        let local = surface_coordinate(camera_local, radius);
        let chunk_position = snap_position(local, cell_size * 2.0);
        let rotation = if current_lod == 0 {
            0.0
        } else {
            quadrant_rotation(local, chunk_position)
        };

        let transform = DAffine3::from_translation(DVec3::new(
            chunk_position.x,
            0.0,
            chunk_position.y,
        )) * DAffine3::from_scale(DVec3::splat(cell_size))
            * DAffine3::from_quat(DQuat::from_rotation_y(rotation));

        Self {
            local,
            chunk_position,
            rotation,
            transform,
        }
    }
}
