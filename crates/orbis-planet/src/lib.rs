//! Planetary terrain made of a chain of nested, camera-centred chunks.
//!
//! Level 0 is the finest chunk, drawn with the root template. Every coarser
//! level doubles the cell size and is drawn with the ring template around the
//! level inside it. Each level owns a height map and a normal map, rebuilt on
//! the GPU only when its descriptor changes.

pub mod chunk;
pub mod descriptor;
pub mod pipeline;
pub mod placement;
pub mod planet;
pub mod rotation;
pub mod template;
pub mod textures;

pub use chunk::{ChunkDrawFlags, ChunkFrame, ChunkMeshes, ChunkNode};
pub use descriptor::{ChunkDescriptor, DescriptorCache};
pub use pipeline::{ChunkMaps, PipelineRun, PlanetKernels};
pub use placement::ChunkPlacement;
pub use planet::{LodWindow, Planet};
pub use rotation::closest_rotation_to;
pub use template::{MeshTemplate, map_size};
pub use textures::TerrainTextures;
