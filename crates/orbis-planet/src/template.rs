//! Shared chunk geometry.
//!
//! Vertices live on an integer grid in the chunk's local XZ plane. The Y
//! component does not carry height: it stores the blend weight used by the
//! vertex stage to morph towards the next coarser level near the outer edge.
//! Heights come from the chunk's height map.

/// Width and height in texels of a chunk's height and normal maps.
pub fn map_size(cell_count: u32) -> u32 {
    cell_count * 4 + 5
}

/// Position-only triangle list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshTemplate {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshTemplate {
    /// Full square disc covering `[-2c-1, 2c+1]²`, used by level 0.
    pub fn root(cell_count: u32) -> Self {
        let c = cell_count as i32;
        let mut mesh = Self::default();
        mesh.push_area(-c * 2 - 1, c * 2 + 1, -c * 2 - 1, c * 2 + 1, 0, c * 2);
        mesh
    }

    /// Square annulus around a hole of half-extent `c`, used by every other
    /// level. Built from four rectangles; the two leading sides are one cell
    /// wider so that an odd snapping offset can be absorbed by rotation.
    pub fn ring(cell_count: u32) -> Self {
        let c = cell_count as i32;
        let mut mesh = Self::default();
        // top
        mesh.push_area(c, c * 2 + 1, -c - 1, c * 2 + 1, c, c * 2 + 1);
        // right
        mesh.push_area(-c * 2 - 1, c, c, c * 2 + 1, c, c * 2 + 1);
        // bottom
        mesh.push_area(-c * 2 - 1, -c - 1, -c * 2 - 1, c, c + 1, c * 2 + 1);
        // left
        mesh.push_area(-c - 1, c * 2 + 1, -c * 2 - 1, -c - 1, c + 1, c * 2 + 1);
        mesh
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append the grid `[x_min, x_max] × [z_min, z_max]`. The blend weight
    /// ramps from 0 at Chebyshev distance `weight_min` to 1 at `weight_max`
    /// and is only set on every other vertex along the edge direction.
    fn push_area(
        &mut self,
        x_min: i32,
        x_max: i32,
        z_min: i32,
        z_max: i32,
        weight_min: i32,
        weight_max: i32,
    ) {
        let distance_max = weight_max as f32;
        let mut distance_min = weight_min as f32;
        if (distance_min - distance_max).abs() < 1.0e-4 {
            distance_min = 0.0;
        }

        let offset = self.positions.len() as u32;
        for z in z_min..=z_max {
            for x in x_min..=x_max {
                let linf_distance = x.abs().max(z.abs()) as f32;
                let weight = (linf_distance - distance_min) / (distance_max - distance_min);
                let x_aligned = x.abs() > z.abs();
                let odd_step = (x.abs() % 2 == 0 && !x_aligned) || (z.abs() % 2 == 0 && x_aligned);
                let y = if odd_step { weight } else { 0.0 };
                self.positions.push([x as f32, y, z as f32]);
            }
        }

        let x_width = x_min.abs_diff(x_max);
        let z_width = z_min.abs_diff(z_max);
        for z in 0..z_width {
            for x in 0..x_width {
                let base = offset + x + z * (x_width + 1);
                let [px, _, pz] = self.positions[base as usize];
                // Flip the diagonal per quadrant so triangles stay symmetric.
                if px * pz > 0.0 {
                    self.indices.extend_from_slice(&[
                        base,
                        base + x_width + 2,
                        base + x_width + 1,
                        base,
                        base + 1,
                        base + x_width + 2,
                    ]);
                } else {
                    self.indices.extend_from_slice(&[
                        base,
                        base + 1,
                        base + x_width + 1,
                        base + 1,
                        base + x_width + 2,
                        base + x_width + 1,
                    ]);
                }
            }
        }
    }
}
