//! Terrain textures shared by every chunk draw.

use std::path::Path;

use orbis_render::{RenderDevice, TextureHandle};
use tracing::info;

/// `(material binding, file under the texture root, sRGB)`.
const TEXTURE_FILES: [(&str, &str, bool); 11] = [
    ("grass_color", "terrain/wispy-grass-meadow_albedo.png", true),
    ("grass_normal", "terrain/wispy-grass-meadow_normal-dx.png", false),
    ("grass_mrao", "terrain/wispy-grass-meadow_mrao.jpg", false),
    ("rock_color", "terrain/pine_forest_ground1_albedo.png", true),
    ("rock_normal", "terrain/pine_forest_ground1_Normal-dx.png", false),
    ("rock_mrao", "terrain/pine_forest_ground1_mrao.jpg", false),
    ("sand_color", "terrain/wavy-sand_albedo.png", true),
    ("sand_normal", "terrain/wavy-sand_normal-dx.png", false),
    ("sand_mrao", "terrain/wavy-sand_mrao.jpg", false),
    ("water_normal", "water/water_normal.png", false),
    ("water_displacement", "water/water_distortion.png", false),
];

/// Streamed texture handles, requested once per planet.
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainTextures {
    bindings: Vec<(&'static str, TextureHandle)>,
}

impl TerrainTextures {
    /// Start streaming every terrain texture from `root`.
    pub fn request<D: RenderDevice + ?Sized>(gpu: &mut D, root: &Path) -> Self {
        info!(root = %root.display(), "Requesting terrain textures");
        let bindings = TEXTURE_FILES
            .iter()
            .map(|&(name, file, srgb)| {
                let label = format!("terrain {name}");
                (name, gpu.request_texture(&label, &root.join(file), srgb))
            })
            .collect();
        Self { bindings }
    }

    /// Material binding name and handle of every texture.
    pub fn bindings(&self) -> &[(&'static str, TextureHandle)] {
        &self.bindings
    }

    pub fn get(&self, name: &str) -> Option<TextureHandle> {
        self.bindings
            .iter()
            .find(|(binding, _)| *binding == name)
            .map(|(_, texture)| *texture)
    }
}
