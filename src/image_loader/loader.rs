use std::path::{Path, PathBuf};

use image::RgbaImage;

use super::builtin;
use super::catalog::{Catalog, CatalogEntry, ImageOrigin};
use crate::errors::LoadError;
use crate::gpu::{DepthImage, RenderDevice, TextureInfo};

pub const DEFAULT_DEPTH_EXTENSION: &str = "exr";

/// GPU-resident color texture and its optional companion depth texture.
#[derive(Debug)]
pub struct SourcePair<T> {
    pub name: String,
    pub color: T,
    pub depth: Option<T>,
}

impl<T: TextureInfo> SourcePair<T> {
    pub fn size(&self) -> (u32, u32) {
        self.color.size()
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }
}

/// Blocking user notification, provided by the shell.
pub trait Notifier {
    fn notify_error(&mut self, title: &str, message: &str);
}

/// Notifier for unattended runs: errors only go to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&mut self, title: &str, message: &str) {
        tracing::error!("{}: {}", title, message);
    }
}

/// Result of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub name: String,
    pub size: (u32, u32),
    pub has_depth: bool,
    /// Entries dropped from the catalog on the way.
    pub removed: Vec<String>,
}

/// `name` with its extension replaced by `extension`.
pub fn companion_name(name: &str, extension: &str) -> String {
    Path::new(name).with_extension(extension).to_string_lossy().to_string()
}

pub fn companion_path(path: &Path, extension: &str) -> PathBuf {
    path.with_extension(extension)
}

fn decode_color(entry: &CatalogEntry) -> Result<RgbaImage, LoadError> {
    match &entry.origin {
        ImageOrigin::Builtin => builtin::find(&entry.name)
            .map(|scene| scene.color())
            .ok_or_else(|| LoadError::UnknownBuiltin {
                name: entry.name.clone(),
            }),
        ImageOrigin::File(path) => {
            if !path.exists() {
                return Err(LoadError::FileNotFound { path: path.clone() });
            }
            image::open(path)
                .map(|img| img.to_rgba8())
                .map_err(|e| LoadError::Decode {
                    path: path.clone(),
                    message: e.to_string(),
                })
        }
    }
}

/// The companion depth image, if one exists and decodes. Never an error.
fn decode_depth(entry: &CatalogEntry, extension: &str) -> Option<DepthImage> {
    match &entry.origin {
        ImageOrigin::Builtin => builtin::find_depth(&companion_name(&entry.name, extension)).and_then(|scene| scene.depth()),
        ImageOrigin::File(path) => {
            let depth_path = companion_path(path, extension);
            if !depth_path.is_file() {
                return None;
            }
            match image::open(&depth_path) {
                Ok(img) => Some(img.to_luma32f()),
                Err(e) => {
                    tracing::warn!(path = %depth_path.display(), "ignoring unreadable depth companion: {}", e);
                    None
                }
            }
        }
    }
}

/// Resolves catalog entries to GPU textures and owns the current pair.
#[derive(Debug)]
pub struct ImageLoader<T> {
    current: Option<SourcePair<T>>,
    /// Catalog entry `current` was loaded from.
    last_good: Option<CatalogEntry>,
    depth_extension: String,
}

impl<T> Default for ImageLoader<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH_EXTENSION)
    }
}

impl<T> ImageLoader<T> {
    pub fn new(depth_extension: &str) -> Self {
        Self {
            current: None,
            last_good: None,
            depth_extension: depth_extension.to_string(),
        }
    }

    pub fn current(&self) -> Option<&SourcePair<T>> {
        self.current.as_ref()
    }

    pub fn release(&mut self) {
        if let Some(pair) = self.current.take() {
            tracing::debug!(name = %pair.name, "source pair released");
        }
    }
}

impl<T: TextureInfo> ImageLoader<T> {
    pub fn has_depth(&self) -> bool {
        self.current.as_ref().is_some_and(SourcePair::has_depth)
    }

    fn outcome(&self, removed: Vec<String>) -> Option<LoadOutcome> {
        self.current.as_ref().map(|pair| LoadOutcome {
            name: pair.name.clone(),
            size: pair.size(),
            has_depth: pair.has_depth(),
            removed,
        })
    }

    fn load_entry<D>(&self, device: &mut D, entry: &CatalogEntry) -> Result<SourcePair<T>, LoadError>
    where
        D: RenderDevice<Texture = T>,
    {
        let color_image = decode_color(entry)?;
        let color = device.upload_color("source_color", &color_image)?;

        let depth = match decode_depth(entry, &self.depth_extension) {
            Some(depth_image) if depth_image.dimensions() != color_image.dimensions() => {
                tracing::warn!(
                    name = %entry.name,
                    "depth companion is {:?}, color is {:?}; ignoring depth",
                    depth_image.dimensions(),
                    color_image.dimensions()
                );
                None
            }
            Some(depth_image) => Some(device.upload_depth("source_depth", &depth_image)?),
            None => None,
        };

        Ok(SourcePair {
            name: entry.name.clone(),
            color,
            depth,
        })
    }

    /// Loads the catalog's selected entry.
    ///
    /// A failing entry is removed from the catalog and reported through
    /// `notifier`. A mandatory entry is then fatal; otherwise the previous good
    /// selection is restored, or the next remaining entry tried. The current
    /// pair is only replaced once a new one has been uploaded.
    pub fn load_selected<D>(&mut self, device: &mut D, catalog: &mut Catalog, notifier: &mut dyn Notifier) -> Result<LoadOutcome, LoadError>
    where
        D: RenderDevice<Texture = T>,
    {
        let mut removed = Vec::new();

        loop {
            let Some(entry) = catalog.selected().cloned() else {
                return Err(LoadError::CatalogExhausted);
            };

            let error = match self.load_entry(device, &entry) {
                Ok(pair) => {
                    tracing::info!(name = %pair.name, size = ?pair.size(), depth = pair.has_depth(), "source loaded");
                    self.current = Some(pair);
                    self.last_good = Some(entry);
                    return self.outcome(removed).ok_or(LoadError::CatalogExhausted);
                }
                Err(error) => error,
            };

            tracing::warn!(name = %entry.name, code = error.error_code(), recoverable = error.is_recoverable(), "load failed: {}", error);
            notifier.notify_error("Image load failed", &format!("{}: {}", entry.name, error));
            catalog.remove(catalog.position());
            removed.push(entry.name.clone());

            if entry.mandatory {
                return Err(LoadError::Mandatory {
                    name: entry.name,
                    source: Box::new(error),
                });
            }

            let fallback = self.last_good.as_ref().and_then(|good| catalog.position_of(good));
            if let Some(index) = fallback {
                catalog.select(index);
                if self.current.is_some() {
                    return self.outcome(removed).ok_or(LoadError::CatalogExhausted);
                }
            }
        }
    }
}
