use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the render device while creating or reading GPU resources.
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Failed to create '{label}': {message}")]
    ResourceCreation { label: String, message: String },

    #[error("Texture '{label}' is {width}x{height}, device limit is {limit}")]
    TooLarge {
        label: String,
        width: u32,
        height: u32,
        limit: u32,
    },

    #[error("Unsupported texture format for {operation}: {format:?}")]
    UnsupportedFormat {
        operation: &'static str,
        format: wgpu::TextureFormat,
    },

    #[error("GPU readback failed: {message}")]
    Readback { message: String },
}

/// Failures of the image source loader.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Image decoding error for '{path}': {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Unknown built-in image: {name}")]
    UnknownBuiltin { name: String },

    #[error("Required image '{name}' could not be loaded: {source}")]
    Mandatory {
        name: String,
        #[source]
        source: Box<LoadError>,
    },

    #[error("No loadable image left in the catalog")]
    CatalogExhausted,

    #[error("GPU upload failed: {0}")]
    Gpu(#[from] GpuError),
}

/// Errors surfaced by the harness to the shell. Every variant is fatal for the process.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Failed to create surface resources: {0}")]
    Resources(#[source] GpuError),

    #[error("Image load failed: {0}")]
    Load(#[from] LoadError),

    #[error("GPU processing error: {0}")]
    Gpu(#[from] GpuError),

    #[error("Export error for '{path}': {message}")]
    Export { path: PathBuf, message: String },

    #[error("Configuration error in '{path}': {message}")]
    Config { path: PathBuf, message: String },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, HarnessError>;

impl LoadError {
    /// Returns true if the loader may fall back to another catalog entry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LoadError::FileNotFound { .. }
                | LoadError::Decode { .. }
                | LoadError::UnknownBuiltin { .. }
                | LoadError::Gpu(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            LoadError::FileNotFound { .. } => "FILE_NOT_FOUND",
            LoadError::Decode { .. } => "DECODING_ERROR",
            LoadError::UnknownBuiltin { .. } => "UNKNOWN_BUILTIN",
            LoadError::Mandatory { .. } => "MANDATORY_IMAGE",
            LoadError::CatalogExhausted => "CATALOG_EXHAUSTED",
            LoadError::Gpu(_) => "GPU_UPLOAD",
        }
    }
}

impl HarnessError {
    /// Process exit code the shell reports for this error
    pub fn exit_code(&self) -> i32 {
        1
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            HarnessError::Resources(_) => "RESOURCE_GROUP_ERROR",
            HarnessError::Load(err) => err.error_code(),
            HarnessError::Gpu(_) => "GPU_ERROR",
            HarnessError::Export { .. } => "EXPORT_ERROR",
            HarnessError::Config { .. } => "CONFIG_ERROR",
            HarnessError::Io { .. } => "IO_ERROR",
        }
    }

    /// Logs the error with its code before the shell tears down.
    pub fn log(&self) {
        tracing::error!(code = self.error_code(), "{}", self);
    }
}
