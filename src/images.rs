use crate::error::ImageLoadError;
use crate::record::ImageSource;
use base64::Engine;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// A decoded image with known pixel dimensions, ready for placement.
pub struct LoadedImage {
    width: u32,
    height: u32,
    pixels: DynamicImage,
    // Original bytes, kept only for JPEG so the PDF can embed them as-is.
    jpeg: Option<Vec<u8>>,
    content_hash: u64,
}

impl LoadedImage {
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageLoadError> {
        let format = image::guess_format(bytes).ok();
        let pixels = image::load_from_memory(bytes)
            .map_err(|err| ImageLoadError::Decode(err.to_string()))?;
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageLoadError::EmptyImage);
        }
        let jpeg = matches!(format, Some(ImageFormat::Jpeg)).then(|| bytes.to_vec());
        Ok(Self {
            width,
            height,
            pixels,
            jpeg,
            content_hash: hash_bytes(bytes),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    pub(crate) fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub(crate) fn jpeg_bytes(&self) -> Option<&[u8]> {
        self.jpeg.as_deref()
    }
}

#[cfg(test)]
impl LoadedImage {
    /// Replaces the embedded JPEG bytes, keeping the decoded pixels.
    pub(crate) fn with_original_jpeg(mut self, bytes: Vec<u8>) -> Self {
        self.jpeg = Some(bytes);
        self
    }
}

impl fmt::Debug for LoadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("jpeg", &self.jpeg.is_some())
            .field("content_hash", &format_args!("{:016x}", self.content_hash))
            .finish()
    }
}

/// Resolves image references into decoded images.
///
/// Loads are awaited one at a time, in document order; implementations do
/// not need to be `Send` or reentrant.
pub trait ImageLoader {
    fn load(
        &self,
        source: &ImageSource,
    ) -> impl Future<Output = Result<Arc<LoadedImage>, ImageLoadError>>;
}

/// Reads paths from the file system (relative to an optional base
/// directory) and decodes inline `data:` URIs.
#[derive(Debug, Clone, Default)]
pub struct FsImageLoader {
    base_dir: Option<PathBuf>,
}

impl FsImageLoader {
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve_path(&self, raw: &str) -> PathBuf {
        let trimmed = raw.trim();
        let path = PathBuf::from(trimmed.trim_start_matches("file://"));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            // Web-style absolute references ("/assets/logo.png") are rooted at the base dir.
            Some(base) if trimmed.starts_with('/') => base.join(trimmed.trim_start_matches('/')),
            _ => path,
        }
    }
}

impl ImageLoader for FsImageLoader {
    async fn load(&self, source: &ImageSource) -> Result<Arc<LoadedImage>, ImageLoadError> {
        let bytes = match source {
            ImageSource::Inline(uri) => parse_data_uri(uri)?,
            ImageSource::Path(raw) => {
                let path = self.resolve_path(raw);
                match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        return Err(ImageLoadError::NotFound(path.display().to_string()));
                    }
                    Err(err) => return Err(ImageLoadError::Io(err)),
                }
            }
        };
        Ok(Arc::new(LoadedImage::decode(&bytes)?))
    }
}

/// Serves images from memory, keyed by the exact reference string. Inline
/// `data:` URIs that are not registered are decoded directly.
#[derive(Debug, Default)]
pub struct MemoryImageLoader {
    images: HashMap<String, Arc<LoadedImage>>,
}

impl MemoryImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, image: LoadedImage) {
        self.images.insert(key.into(), Arc::new(image));
    }

    pub fn insert_bytes(
        &mut self,
        key: impl Into<String>,
        bytes: &[u8],
    ) -> Result<(), ImageLoadError> {
        self.insert(key, LoadedImage::decode(bytes)?);
        Ok(())
    }
}

impl ImageLoader for MemoryImageLoader {
    async fn load(&self, source: &ImageSource) -> Result<Arc<LoadedImage>, ImageLoadError> {
        if let Some(image) = self.images.get(source.as_str()) {
            return Ok(image.clone());
        }
        match source {
            ImageSource::Inline(uri) => Ok(Arc::new(LoadedImage::decode(&parse_data_uri(uri)?)?)),
            ImageSource::Path(path) => Err(ImageLoadError::NotFound(path.clone())),
        }
    }
}

/// Decodes the payload of a `data:` URI. Non-base64 payloads are taken as raw bytes.
pub fn parse_data_uri(uri: &str) -> Result<Vec<u8>, ImageLoadError> {
    let Some(rest) = uri.trim().strip_prefix("data:") else {
        return Err(ImageLoadError::InvalidDataUri(
            "missing data: prefix".to_string(),
        ));
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(ImageLoadError::InvalidDataUri(
            "missing ',' separator".to_string(),
        ));
    };
    if header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        let cleaned: String = payload.chars().filter(|ch| !ch.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|err| ImageLoadError::InvalidDataUri(err.to_string()))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

fn hash_bytes(data: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: RgbaImage = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    pub(crate) fn translucent_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: RgbaImage = ImageBuffer::from_pixel(width, height, Rgba([10, 20, 30, 100]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg)
            .expect("encode jpeg");
        out.into_inner()
    }

    pub(crate) fn png_data_uri(width: u32, height: u32) -> String {
        use base64::Engine;
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png_bytes(width, height))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::*;
    use super::*;

    #[test]
    fn decode_reports_dimensions_and_aspect() {
        let image = LoadedImage::decode(&png_bytes(40, 20)).expect("decode");
        assert_eq!((image.width(), image.height()), (40, 20));
        assert!((image.aspect_ratio() - 2.0).abs() < f32::EPSILON);
        assert!(image.jpeg_bytes().is_none());
    }

    #[test]
    fn jpeg_keeps_original_bytes() {
        let bytes = jpeg_bytes(8, 8);
        let image = LoadedImage::decode(&bytes).expect("decode");
        assert_eq!(image.jpeg_bytes(), Some(bytes.as_slice()));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = LoadedImage::decode(b"not an image").expect_err("should fail");
        assert_eq!(err.code(), "IMAGE_DECODE");
    }

    #[test]
    fn data_uri_parsing() {
        assert_eq!(parse_data_uri("data:text/plain,abc").expect("raw"), b"abc");
        assert_eq!(
            parse_data_uri("data:image/png;base64,AAEC").expect("base64"),
            vec![0, 1, 2]
        );
        assert!(parse_data_uri("image/png;base64,AAEC").is_err());
        assert!(parse_data_uri("data:image/png;base64").is_err());
        assert!(parse_data_uri("data:image/png;base64,@@@").is_err());
    }

    #[tokio::test]
    async fn fs_loader_decodes_inline_sources() {
        let loader = FsImageLoader::new();
        let image = loader
            .load(&ImageSource::from(png_data_uri(12, 6).as_str()))
            .await
            .expect("inline image");
        assert_eq!(image.width(), 12);
    }

    #[tokio::test]
    async fn fs_loader_reads_web_style_paths_under_base_dir() {
        let dir = std::env::temp_dir().join(format!("evidence_report_img_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("assets")).expect("mkdir");
        std::fs::write(dir.join("assets").join("logo1.png"), png_bytes(30, 15)).expect("write");

        let loader = FsImageLoader::with_base_dir(&dir);
        let image = loader
            .load(&ImageSource::from("/assets/logo1.png"))
            .await
            .expect("logo");
        assert_eq!((image.width(), image.height()), (30, 15));

        let missing = loader
            .load(&ImageSource::from("/assets/missing.png"))
            .await
            .expect_err("missing");
        assert_eq!(missing.code(), "IMAGE_NOT_FOUND");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn memory_loader_prefers_registered_images() {
        let mut loader = MemoryImageLoader::new();
        loader
            .insert_bytes("logo-a", &png_bytes(10, 10))
            .expect("register");
        let image = loader
            .load(&ImageSource::from("logo-a"))
            .await
            .expect("registered");
        assert_eq!(image.width(), 10);
        assert!(loader.load(&ImageSource::from("logo-b")).await.is_err());
    }
}
