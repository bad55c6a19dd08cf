//! WGSL compute kernel loading, validation and hot reload.
//!
//! Kernels are validated with naga when loaded. A kernel that fails to
//! compile stays registered with its error message so that the debug UI can
//! show it and a later reload can fix it; backends refuse to bind it.

use log::{debug, info, warn};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

/// Error types for shader loading operations.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader '{name}' failed to compile: {message}")]
    CompilationFailed { name: String, message: String },

    #[error("shader '{name}' has no compute entry point")]
    MissingEntryPoint { name: String },

    #[error("shader file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read shader file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("shader '{name}' not found in library")]
    NotLoaded { name: String },

    #[error("no shader directory configured for file-based loading")]
    NoShaderDir,
}

/// Parse and validate WGSL, returning the naga module.
pub fn validate_wgsl(name: &str, source: &str) -> Result<naga::Module, ShaderError> {
    let module =
        naga::front::wgsl::parse_str(source).map_err(|err| ShaderError::CompilationFailed {
            name: name.to_string(),
            message: err.emit_to_string(source),
        })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|err| ShaderError::CompilationFailed {
            name: name.to_string(),
            message: err.as_inner().to_string(),
        })?;

    Ok(module)
}

/// Names of every global resource of a validated module, with their binding
/// index in bind group 0.
pub fn global_bindings(module: &naga::Module) -> Vec<(String, u32)> {
    module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            (binding.group == 0).then(|| (var.name.clone().unwrap_or_default(), binding.binding))
        })
        .collect()
}

/// Stable identifier of a kernel inside a [`KernelLibrary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KernelId(pub u32);

/// Compile state of a kernel.
#[derive(Clone, Debug, PartialEq)]
pub enum KernelStatus {
    /// Valid program with reflected entry point and resource bindings.
    Ready {
        entry_point: String,
        workgroup_size: [u32; 3],
        bindings: Vec<u32>,
    },
    /// Compilation failed; the message is kept for the debug UI.
    Failed { message: String },
}

/// A compute kernel with its current source and compile state.
#[derive(Clone, Debug)]
pub struct Kernel {
    id: KernelId,
    name: String,
    file_name: String,
    source: Arc<str>,
    revision: u64,
    status: KernelStatus,
}

impl Kernel {
    pub fn id(&self) -> KernelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Bumped on every (re)load, successful or not.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn status(&self) -> &KernelStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status, KernelStatus::Ready { .. })
    }

    /// Compute entry point name, when the kernel is ready.
    pub fn entry_point(&self) -> Option<&str> {
        match &self.status {
            KernelStatus::Ready { entry_point, .. } => Some(entry_point),
            KernelStatus::Failed { .. } => None,
        }
    }

    /// Bindings in group 0 used by the kernel, when ready.
    pub fn bindings(&self) -> &[u32] {
        match &self.status {
            KernelStatus::Ready { bindings, .. } => bindings,
            KernelStatus::Failed { .. } => &[],
        }
    }

    /// Compile error, when the kernel failed.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            KernelStatus::Failed { message } => Some(message),
            KernelStatus::Ready { .. } => None,
        }
    }
}

fn compile_kernel(name: &str, source: &str) -> Result<KernelStatus, ShaderError> {
    let module = validate_wgsl(name, source)?;
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga::ShaderStage::Compute)
        .ok_or_else(|| ShaderError::MissingEntryPoint {
            name: name.to_string(),
        })?;

    let mut bindings: Vec<u32> = global_bindings(&module)
        .into_iter()
        .map(|(_, binding)| binding)
        .collect();
    bindings.sort_unstable();

    Ok(KernelStatus::Ready {
        entry_point: entry.name.clone(),
        workgroup_size: entry.workgroup_size,
        bindings,
    })
}

/// Registry of compute kernels with hot-reload support.
pub struct KernelLibrary {
    kernels: Vec<Kernel>,
    shader_dir: Option<PathBuf>,
}

impl KernelLibrary {
    /// Create a new empty kernel library.
    pub fn new() -> Self {
        Self {
            kernels: Vec::new(),
            shader_dir: None,
        }
    }

    /// Set the directory to load .wgsl files from (development mode).
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }

    pub fn shader_dir(&self) -> Option<&Path> {
        self.shader_dir.as_deref()
    }

    /// Register (or replace) a kernel from WGSL source.
    ///
    /// `file_name` is the name looked up in the shader directory on reload.
    /// Compile failures do not fail the call: the kernel is registered in the
    /// failed state and reported through [`Kernel::error`].
    pub fn load_from_source(&mut self, name: &str, file_name: &str, source: &str) -> KernelId {
        debug!("Loading kernel '{}' from source", name);

        let status = match compile_kernel(name, source) {
            Ok(status) => status,
            Err(err) => {
                warn!("{}", err);
                KernelStatus::Failed {
                    message: err.to_string(),
                }
            }
        };

        if let Some(kernel) = self.kernels.iter_mut().find(|k| k.name == name) {
            kernel.file_name = file_name.to_string();
            kernel.source = source.into();
            kernel.status = status;
            kernel.revision += 1;
            info!("Replaced kernel '{}' (revision {})", name, kernel.revision);
            return kernel.id;
        }

        let id = KernelId(self.kernels.len() as u32);
        self.kernels.push(Kernel {
            id,
            name: name.to_string(),
            file_name: file_name.to_string(),
            source: source.into(),
            revision: 0,
            status,
        });
        info!("Loaded kernel '{}'", name);
        id
    }

    /// Load a kernel from a file in the shader directory.
    pub fn load_from_file(&mut self, name: &str, file_name: &str) -> Result<KernelId, ShaderError> {
        let source = self.read_source(file_name)?;
        Ok(self.load_from_source(name, file_name, &source))
    }

    /// Re-read a kernel from the shader directory. Returns whether it is ready.
    pub fn reload(&mut self, id: KernelId) -> Result<bool, ShaderError> {
        let kernel = self.get(id).ok_or_else(|| ShaderError::NotLoaded {
            name: format!("#{}", id.0),
        })?;
        let (name, file_name) = (kernel.name.clone(), kernel.file_name.clone());

        info!("Reloading kernel '{}'", name);
        let source = self.read_source(&file_name)?;
        self.load_from_source(&name, &file_name, &source);
        Ok(self.is_ready(id))
    }

    /// Reload every kernel. Returns how many were re-read from disk.
    pub fn reload_all(&mut self) -> usize {
        let ids: Vec<KernelId> = self.kernels.iter().map(|k| k.id).collect();
        ids.into_iter()
            .filter(|&id| match self.reload(id) {
                Ok(_) => true,
                Err(err) => {
                    warn!("Kernel reload skipped: {}", err);
                    false
                }
            })
            .count()
    }

    fn read_source(&self, file_name: &str) -> Result<String, ShaderError> {
        let shader_dir = self.shader_dir.as_ref().ok_or(ShaderError::NoShaderDir)?;
        let path = shader_dir.join(file_name);

        if !path.exists() {
            return Err(ShaderError::FileNotFound { path });
        }

        Ok(std::fs::read_to_string(&path)?)
    }

    pub fn get(&self, id: KernelId) -> Option<&Kernel> {
        self.kernels.get(id.0 as usize)
    }

    /// Look up a kernel by name.
    pub fn find(&self, name: &str) -> Option<KernelId> {
        self.kernels.iter().find(|k| k.name == name).map(|k| k.id)
    }

    pub fn is_ready(&self, id: KernelId) -> bool {
        self.get(id).is_some_and(Kernel::is_ready)
    }

    pub fn revision(&self, id: KernelId) -> Option<u64> {
        self.get(id).map(Kernel::revision)
    }

    /// `(name, message)` of every kernel that failed to compile.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.kernels
            .iter()
            .filter_map(|k| k.error().map(|message| (k.name(), message)))
    }

    /// Number of registered kernels.
    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    /// Check if the kernel library is empty.
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

impl Default for KernelLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_KERNEL: &str = r#"
        @group(0) @binding(0) var output: texture_storage_2d<r32float, write>;

        @compute @workgroup_size(8, 8, 1)
        fn main(@builtin(global_invocation_id) id: vec3<u32>) {
            textureStore(output, vec2<i32>(id.xy), vec4<f32>(1.0, 0.0, 0.0, 1.0));
        }
    "#;

    const INVALID_KERNEL: &str = r#"
        @compute @workgroup_size(1)
        fn main() {
            let x = undeclared_variable;
        }
    "#;

    const VERTEX_ONLY: &str = r#"
        @vertex
        fn vs_main() -> @builtin(position) vec4<f32> {
            return vec4<f32>(0.0, 0.0, 0.0, 1.0);
        }
    "#;

    #[test]
    fn test_valid_kernel_is_ready_with_reflection() {
        let mut library = KernelLibrary::new();
        let id = library.load_from_source("fill", "fill.wgsl", VALID_KERNEL);
        let kernel = library.get(id).unwrap();
        assert!(kernel.is_ready());
        assert_eq!(kernel.entry_point(), Some("main"));
        assert_eq!(kernel.bindings(), &[0]);
        assert!(matches!(
            kernel.status(),
            KernelStatus::Ready { workgroup_size: [8, 8, 1], .. }
        ));
    }

    #[test]
    fn test_invalid_kernel_is_registered_as_failed() {
        let mut library = KernelLibrary::new();
        let id = library.load_from_source("broken", "broken.wgsl", INVALID_KERNEL);
        assert!(!library.is_ready(id));
        let failures: Vec<_> = library.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "broken");
        assert!(!failures[0].1.is_empty());
    }

    #[test]
    fn test_missing_compute_entry_point_fails() {
        let mut library = KernelLibrary::new();
        let id = library.load_from_source("vertex", "vertex.wgsl", VERTEX_ONLY);
        let error = library.get(id).unwrap().error().unwrap();
        assert!(error.contains("no compute entry point"));
    }

    #[test]
    fn test_replacing_kernel_bumps_revision_and_keeps_id() {
        let mut library = KernelLibrary::new();
        let a = library.load_from_source("k", "k.wgsl", INVALID_KERNEL);
        assert_eq!(library.revision(a), Some(0));
        let b = library.load_from_source("k", "k.wgsl", VALID_KERNEL);
        assert_eq!(a, b);
        assert_eq!(library.revision(a), Some(1));
        assert!(library.is_ready(a));
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_library_starts_empty() {
        let library = KernelLibrary::new();
        assert!(library.is_empty());
        assert!(library.find("nothing").is_none());
    }

    #[test]
    fn test_load_from_file_without_shader_dir_returns_error() {
        let mut library = KernelLibrary::new();
        let result = library.load_from_file("k", "k.wgsl");
        assert!(matches!(result, Err(ShaderError::NoShaderDir)));
    }

    #[test]
    fn test_reload_picks_up_fixed_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("k.wgsl"), INVALID_KERNEL).unwrap();

        let mut library = KernelLibrary::new().with_shader_dir(dir.path());
        let id = library.load_from_file("k", "k.wgsl").unwrap();
        assert!(!library.is_ready(id));

        std::fs::write(dir.path().join("k.wgsl"), VALID_KERNEL).unwrap();
        assert!(library.reload(id).unwrap());
        assert_eq!(library.revision(id), Some(1));
        assert_eq!(library.failures().count(), 0);
    }

    #[test]
    fn test_reload_missing_file_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = KernelLibrary::new().with_shader_dir(dir.path());
        let id = library.load_from_source("k", "missing.wgsl", VALID_KERNEL);
        assert!(matches!(
            library.reload(id),
            Err(ShaderError::FileNotFound { .. })
        ));
        assert_eq!(library.reload_all(), 0);
        // A failed reload leaves the previous program in place.
        assert!(library.is_ready(id));
    }

    #[test]
    fn test_global_bindings_reflects_names() {
        let module = validate_wgsl("fill", VALID_KERNEL).unwrap();
        assert_eq!(global_bindings(&module), vec![("output".to_string(), 0)]);
    }
}
