//! Decoded image inputs for the renderer.
//!
//! Images come either from a directory of PNG files or are generated
//! procedurally. The renderer never decodes anything itself; it receives a
//! [`ResourceSet`] of ready RGBA8 images.
//!
//! Directory layout:
//!
//! ```text
//! lut.png            colour grade strip, size² × size
//! env_diffuse.png    equirectangular irradiance
//! env_specular.png   equirectangular radiance
//! distortion.png     composite distortion map
//! noise.png          optional; generated when absent
//! normals/*.png      normal-map set, in file-name order
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AssetError, ResourceId};
use crate::particle::SpawnRng;

/// Side of the generated sparkle noise texture.
pub const NOISE_SIZE: u32 = 512;

/// Slices in the generated identity LUT.
pub const IDENTITY_LUT_SIZE: u32 = 16;

/// Tightly packed RGBA8 image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ImageData {
    /// Wrap raw RGBA data (4 bytes per pixel).
    pub fn from_rgba(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self, AssetError> {
        if width == 0 || height == 0 || pixels.len() != (width as usize) * (height as usize) * 4 {
            return Err(AssetError::Dimensions {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// Decode an image file into RGBA8.
    pub fn from_file(path: &Path) -> Result<Self, AssetError> {
        let img = image::open(path)
            .map_err(|source| AssetError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .into_rgba8();
        let (width, height) = img.dimensions();
        Self::from_rgba(img.into_raw(), width, height)
    }

    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn generate(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        Self { width, height, pixels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    /// Save as PNG.
    pub fn save_png(&self, path: &Path) -> Result<(), AssetError> {
        image::save_buffer(path, &self.pixels, self.width, self.height, image::ColorType::Rgba8).map_err(
            |source| AssetError::Image {
                path: path.to_path_buf(),
                source,
            },
        )
    }
}

fn unorm(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Identity colour-grade strip: `size` slices of `size × size`, blue selects the slice.
pub fn identity_lut(size: u32) -> ImageData {
    let size = size.max(2);
    let max = (size - 1) as f32;
    ImageData::generate(size * size, size, |x, y| {
        let slice = x / size;
        let r = (x % size) as f32 / max;
        let g = y as f32 / max;
        let b = slice as f32 / max;
        [unorm(r), unorm(g), unorm(b), 255]
    })
}

/// Random red/green sparkle map with a constant blue channel.
pub fn sparkle_noise(size: u32, seed: u64) -> ImageData {
    let mut rng = SpawnRng::new(seed ^ 0x9E37_79B9_7F4A_7C15);
    ImageData::generate(size, size, |_, _| {
        let r = (rng.next_f32() * 256.0) as u8;
        let g = (rng.next_f32() * 256.0) as u8;
        [r, g, 255, 255]
    })
}

/// Tangent-space normal map of sine bumps. `frequency == 0` is flat.
pub fn bump_normal_map(size: u32, frequency: u32) -> ImageData {
    let tau = std::f32::consts::TAU;
    let f = frequency as f32;
    ImageData::generate(size, size, |x, y| {
        let u = x as f32 / size as f32;
        let v = y as f32 / size as f32;
        let dx = 0.35 * (tau * f * u).cos() * (tau * f * v).sin();
        let dy = 0.35 * (tau * f * u).sin() * (tau * f * v).cos();
        let n = glam::Vec3::new(-dx, -dy, 1.0).normalize();
        [unorm(n.x * 0.5 + 0.5), unorm(n.y * 0.5 + 0.5), unorm(n.z * 0.5 + 0.5), 255]
    })
}

/// Equirectangular sky gradient. `sharpness` concentrates the bright band near the horizon.
pub fn gradient_environment(width: u32, height: u32, sharpness: f32) -> ImageData {
    let zenith = glam::Vec3::new(0.25, 0.35, 0.6);
    let horizon = glam::Vec3::new(1.0, 0.92, 0.85);
    let ground = glam::Vec3::new(0.08, 0.07, 0.07);
    ImageData::generate(width, height, |x, y| {
        let elevation = 1.0 - 2.0 * (y as f32 + 0.5) / height as f32;
        let band = (1.0 - elevation.abs()).powf(sharpness);
        let sky = if elevation >= 0.0 { zenith } else { ground };
        let azimuth = std::f32::consts::TAU * x as f32 / width as f32;
        let c = sky.lerp(horizon, band) * (0.9 + 0.1 * azimuth.cos());
        [unorm(c.x), unorm(c.y), unorm(c.z), 255]
    })
}

/// Smooth two-channel distortion field centred on 0.5.
pub fn distortion_map(size: u32) -> ImageData {
    let tau = std::f32::consts::TAU;
    ImageData::generate(size, size, |x, y| {
        let u = x as f32 / size as f32;
        let v = y as f32 / size as f32;
        let r = 0.5 + 0.25 * (tau * (2.0 * u + v)).sin();
        let g = 0.5 + 0.25 * (tau * (u - 3.0 * v)).cos();
        [unorm(r), unorm(g), 128, 255]
    })
}

/// Images keyed by the resource slot they feed.
#[derive(Clone, Debug, Default)]
pub struct ResourceSet {
    images: HashMap<ResourceId, ImageData>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ResourceId, image: ImageData) {
        self.images.insert(id, image);
    }

    pub fn with(mut self, id: ResourceId, image: ImageData) -> Self {
        self.insert(id, image);
        self
    }

    pub fn get(&self, id: ResourceId) -> Option<&ImageData> {
        self.images.get(&id)
    }

    /// First required slot with no image, in [`ResourceId::ALL`] order.
    pub fn first_missing(&self) -> Option<ResourceId> {
        ResourceId::ALL.into_iter().find(|id| !self.images.contains_key(id))
    }
}

/// Every image the application may feed to the renderer.
#[derive(Clone, Debug, Default)]
pub struct AssetBundle {
    pub lut: Option<ImageData>,
    pub env_diffuse: Option<ImageData>,
    pub env_specular: Option<ImageData>,
    pub distortion: Option<ImageData>,
    pub noise: Option<ImageData>,
    pub normal_maps: Vec<ImageData>,
}

impl AssetBundle {
    /// Fully procedural bundle.
    pub fn procedural(seed: u64) -> Self {
        Self::default().with_procedural_fallbacks(seed)
    }

    /// Load from a directory. Missing files are skipped with a warning and left empty.
    pub fn load_dir(dir: &Path) -> Result<Self, AssetError> {
        let optional = |name: &str| -> Result<Option<ImageData>, AssetError> {
            let path = dir.join(name);
            if !path.is_file() {
                log::warn!("asset {} not found, skipping", path.display());
                return Ok(None);
            }
            ImageData::from_file(&path).map(Some)
        };

        let mut bundle = Self {
            lut: optional("lut.png")?,
            env_diffuse: optional("env_diffuse.png")?,
            env_specular: optional("env_specular.png")?,
            distortion: optional("distortion.png")?,
            noise: None,
            normal_maps: Vec::new(),
        };

        let noise_path = dir.join("noise.png");
        if noise_path.is_file() {
            bundle.noise = Some(ImageData::from_file(&noise_path)?);
        }

        let normals_dir = dir.join("normals");
        if normals_dir.is_dir() {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(&normals_dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")))
                .collect();
            paths.sort();
            for path in paths {
                bundle.normal_maps.push(ImageData::from_file(&path)?);
            }
        } else {
            log::warn!("normal-map directory {} not found", normals_dir.display());
        }

        log::info!(
            "loaded assets from {} ({} normal maps)",
            dir.display(),
            bundle.normal_maps.len()
        );
        Ok(bundle)
    }

    /// Fill every empty slot with a generated image.
    pub fn with_procedural_fallbacks(mut self, seed: u64) -> Self {
        self.lut.get_or_insert_with(|| identity_lut(IDENTITY_LUT_SIZE));
        self.env_diffuse.get_or_insert_with(|| gradient_environment(128, 64, 1.5));
        self.env_specular.get_or_insert_with(|| gradient_environment(256, 128, 12.0));
        self.distortion.get_or_insert_with(|| distortion_map(256));
        self.noise.get_or_insert_with(|| sparkle_noise(NOISE_SIZE, seed));
        if self.normal_maps.is_empty() {
            self.normal_maps = (0..4).map(|f| bump_normal_map(128, f * 2)).collect();
        }
        self
    }

    /// Generate just the sparkle noise when it was not supplied.
    pub fn with_generated_noise(mut self, seed: u64) -> Self {
        self.noise.get_or_insert_with(|| sparkle_noise(NOISE_SIZE, seed));
        self
    }

    pub fn normal_map(&self, id: usize) -> Option<&ImageData> {
        self.normal_maps.get(id)
    }

    /// Resource slots for the renderer, using normal map `normal_id`.
    pub fn resource_set(&self, normal_id: usize) -> ResourceSet {
        let mut set = ResourceSet::new();
        let slots = [
            (ResourceId::Lut, self.lut.as_ref()),
            (ResourceId::EnvDiffuse, self.env_diffuse.as_ref()),
            (ResourceId::EnvSpecular, self.env_specular.as_ref()),
            (ResourceId::NormalMap, self.normal_map(normal_id)),
            (ResourceId::Distortion, self.distortion.as_ref()),
            (ResourceId::Noise, self.noise.as_ref()),
        ];
        for (id, image) in slots {
            if let Some(image) = image {
                set.insert(id, image.clone());
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_lut_layout() {
        let lut = identity_lut(4);
        assert_eq!((lut.width(), lut.height()), (16, 4));
        assert_eq!(lut.pixel(0, 0), [0, 0, 0, 255]);
        // Last column of the last slice is white.
        assert_eq!(lut.pixel(15, 3), [255, 255, 255, 255]);
        // Slice 1, column 3, row 0: r = 1, g = 0, b = 1/3.
        assert_eq!(lut.pixel(7, 0), [255, 0, 85, 255]);
    }

    #[test]
    fn test_noise_channels() {
        let noise = sparkle_noise(32, 7);
        assert_eq!(noise.width(), 32);
        let mut distinct = std::collections::HashSet::new();
        for y in 0..32 {
            for x in 0..32 {
                let [r, g, b, a] = noise.pixel(x, y);
                assert_eq!((b, a), (255, 255));
                distinct.insert((r, g));
            }
        }
        assert!(distinct.len() > 100);
    }

    #[test]
    fn test_flat_normal_map() {
        let flat = bump_normal_map(8, 0);
        assert_eq!(flat.pixel(3, 5), [128, 128, 255, 255]);
    }

    #[test]
    fn test_from_rgba_checks_size() {
        assert!(ImageData::from_rgba(vec![0; 16], 2, 2).is_ok());
        let err = ImageData::from_rgba(vec![0; 15], 2, 2).unwrap_err();
        assert!(matches!(err, AssetError::Dimensions { width: 2, height: 2, len: 15 }));
        assert!(ImageData::from_rgba(Vec::new(), 0, 0).is_err());
    }

    #[test]
    fn test_procedural_bundle_is_complete() {
        let bundle = AssetBundle::procedural(1);
        let set = bundle.resource_set(bundle.normal_maps.len() - 1);
        assert_eq!(set.first_missing(), None);
    }

    #[test]
    fn test_missing_slot_is_reported() {
        let bundle = AssetBundle {
            normal_maps: Vec::new(),
            ..AssetBundle::procedural(1)
        };
        assert_eq!(bundle.resource_set(0).first_missing(), Some(ResourceId::NormalMap));
    }

    #[test]
    fn test_load_dir_skips_missing_files() {
        let dir = std::env::temp_dir().join(format!("marbles-assets-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("normals")).unwrap();
        identity_lut(2).save_png(&dir.join("lut.png")).unwrap();
        bump_normal_map(4, 1).save_png(&dir.join("normals").join("b.png")).unwrap();
        bump_normal_map(4, 0).save_png(&dir.join("normals").join("a.png")).unwrap();

        let bundle = AssetBundle::load_dir(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(bundle.lut, Some(identity_lut(2)));
        assert!(bundle.env_diffuse.is_none());
        assert_eq!(bundle.normal_maps.len(), 2);
        assert_eq!(bundle.normal_maps[0], bump_normal_map(4, 0));
    }
}
