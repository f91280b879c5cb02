//! Texture lookup for decoded materials.
//!
//! Texture names in a 4DS file are bare file names. Games keep the images in
//! a `maps` directory next to the model, with inconsistent letter case, so
//! lookups try the name as stored, then lower case, then upper case.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;

use crate::error::{Diagnostics, Warning};
use crate::fourds::material::Material;

pub const MAPS_DIR: &str = "maps";

/// BMP offsets of the bit count and the first palette entry.
const BMP_BIT_COUNT_OFFSET: usize = 28;
const BMP_PALETTE_OFFSET: usize = 54;
const BMP_HEADER_LEN: usize = BMP_PALETTE_OFFSET + 3;

/// A decoded image shared between every material that names it.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    pub path: PathBuf,
    pub image: Arc<DynamicImage>,
}

pub trait AssetLoader {
    fn resolve(&mut self, name: &str) -> Option<ImageHandle>;

    /// Linear RGB colour key of a paletted texture.
    fn color_key(&self, _name: &str) -> Option<[f32; 3]> {
        None
    }
}

/// Lower-cased path with `\` folded to `/` and `.` segments dropped.
pub fn cache_key(name: &str) -> String {
    name.to_lowercase()
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Per-session image cache. Failed lookups are cached too.
#[derive(Debug, Default)]
pub struct TextureCache {
    entries: HashMap<String, Option<ImageHandle>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(
        &mut self,
        name: &str,
        load: impl FnOnce() -> Option<ImageHandle>,
    ) -> Option<ImageHandle> {
        self.entries.entry(cache_key(name)).or_insert_with(load).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Loads textures from `<root>/maps`.
#[derive(Debug)]
pub struct FsAssetLoader {
    root: PathBuf,
    cache: TextureCache,
}

impl FsAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsAssetLoader {
            root: root.into(),
            cache: TextureCache::new(),
        }
    }

    /// Loader rooted at the directory holding `model_path`.
    pub fn for_model(model_path: &Path) -> Self {
        Self::new(model_path.parent().unwrap_or_else(|| Path::new(".")))
    }

    pub fn maps_dir(&self) -> PathBuf {
        self.root.join(MAPS_DIR)
    }

    pub fn cache(&self) -> &TextureCache {
        &self.cache
    }

    /// First existing candidate for `name` in the maps directory.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        locate_in(&self.maps_dir(), name)
    }
}

fn locate_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let base = basename(name);
    if base.is_empty() {
        return None;
    }
    [base.to_string(), base.to_lowercase(), base.to_uppercase()]
        .into_iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.is_file())
}

impl AssetLoader for FsAssetLoader {
    fn resolve(&mut self, name: &str) -> Option<ImageHandle> {
        let dir = self.maps_dir();
        self.cache.get_or_load(name, || {
            let path = locate_in(&dir, name)?;
            match image::open(&path) {
                Ok(image) => {
                    log::debug!("loaded texture {}", path.display());
                    Some(ImageHandle {
                        path,
                        image: Arc::new(image),
                    })
                }
                Err(err) => {
                    log::warn!("failed to decode texture {}: {err}", path.display());
                    None
                }
            }
        })
    }

    fn color_key(&self, name: &str) -> Option<[f32; 3]> {
        probe_color_key(&self.locate(name)?)
    }
}

fn srgb_to_linear(c: u8) -> f32 {
    let v = c as f32 / 255.0;
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Linear RGB of palette entry 0 for BMPs of 8 bits per pixel or less.
pub fn probe_color_key(path: &Path) -> Option<[f32; 3]> {
    let mut header = Vec::with_capacity(BMP_HEADER_LEN);
    File::open(path)
        .ok()?
        .take(BMP_HEADER_LEN as u64)
        .read_to_end(&mut header)
        .ok()?;
    color_key_from_bmp(&header)
}

pub fn color_key_from_bmp(data: &[u8]) -> Option<[f32; 3]> {
    if data.len() < BMP_HEADER_LEN || &data[..2] != b"BM" {
        return None;
    }
    let bit_count = u16::from_le_bytes([data[BMP_BIT_COUNT_OFFSET], data[BMP_BIT_COUNT_OFFSET + 1]]);
    if bit_count > 8 {
        return None;
    }
    let bgr = &data[BMP_PALETTE_OFFSET..BMP_PALETTE_OFFSET + 3];
    Some([srgb_to_linear(bgr[2]), srgb_to_linear(bgr[1]), srgb_to_linear(bgr[0])])
}

/// Distance under which a texel counts as the colour key.
pub fn color_key_threshold(rgb: [f32; 3]) -> f32 {
    0.015 + 0.45 * (rgb[0] + rgb[1] + rgb[2])
}

/// Textures resolved for one material.
#[derive(Debug, Clone, Default)]
pub struct MaterialTextures {
    pub diffuse: Option<ImageHandle>,
    pub alpha: Option<ImageHandle>,
    pub env: Option<ImageHandle>,
    /// Set for colour-keyed materials whose diffuse map is a paletted BMP.
    pub color_key: Option<[f32; 3]>,
}

/// Resolves every texture a material names through `loader`. Each missing
/// texture is reported once.
pub fn resolve_materials<L: AssetLoader>(
    materials: &[Material],
    loader: &mut L,
    diagnostics: &mut Diagnostics,
) -> Vec<MaterialTextures> {
    let mut reported = HashSet::new();
    let mut lookup = |name: Option<&str>, loader: &mut L| -> Option<ImageHandle> {
        let name = name.filter(|n| !n.is_empty())?;
        let handle = loader.resolve(name);
        if handle.is_none() && reported.insert(cache_key(name)) {
            diagnostics.warn(Warning::AssetMissing {
                texture: name.to_string(),
            });
        }
        handle
    };

    materials
        .iter()
        .map(|material| {
            let diffuse = lookup(material.diffuse_texture.as_deref(), loader);
            let alpha = lookup(material.alpha_texture.as_deref(), loader);
            let env = lookup(material.env_map.as_ref().map(|e| e.texture.as_str()), loader);
            let color_key = if material.color_key && diffuse.is_some() {
                material.diffuse_texture.as_deref().and_then(|n| loader.color_key(n))
            } else {
                None
            };
            MaterialTextures {
                diffuse,
                alpha,
                env,
                color_key,
            }
        })
        .collect()
}
