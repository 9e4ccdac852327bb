use {
    crate::{
        drawable::{Drawable, VectorImage},
        format::{extension, mime_essence, MediaDecoder},
    },
    resvg::{
        tiny_skia::{Pixmap, Transform},
        usvg,
    },
    std::{
        io::{self, Read},
        sync::Arc,
    },
};

/// Largest side of rasterized vector image, in pixels.
const MAX_DIMENSION: u32 = 8192;

#[derive(Debug, thiserror::Error)]
pub enum SvgError {
    #[error("Failed to read svg stream")]
    Read {
        #[from]
        source: io::Error,
    },

    #[error("Failed to parse svg")]
    Parse {
        #[from]
        source: usvg::Error,
    },

    #[error("Cannot rasterize svg into {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
}

/// Decodes SVG documents and rasterizes them at configured density.
#[derive(Clone, Copy, Debug)]
pub struct SvgDecoder {
    scale: f32,
}

impl Default for SvgDecoder {
    fn default() -> Self {
        SvgDecoder::new(1.0)
    }
}

impl SvgDecoder {
    /// `scale` multiplies document size, e.g. display density.
    pub fn new(scale: f32) -> Self {
        SvgDecoder { scale }
    }
}

impl MediaDecoder for SvgDecoder {
    type Error = SvgError;

    fn can_decode_by_file_name(&self, file_name: &str) -> bool {
        matches!(extension(file_name).as_deref(), Some("svg" | "svgz"))
    }

    fn can_decode_by_content_type(&self, content_type: Option<&str>) -> bool {
        content_type.map_or(false, |content_type| mime_essence(content_type) == "image/svg+xml")
    }

    fn decode(&self, stream: &mut dyn Read) -> Result<Option<Drawable>, SvgError> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;

        if bytes.is_empty() {
            return Ok(None);
        }

        let tree = usvg::Tree::from_data(&bytes, &usvg::Options::default())?;
        let size = tree.size();

        let width = (size.width() * self.scale).ceil() as u32;
        let height = (size.height() * self.scale).ceil() as u32;
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(SvgError::Canvas { width, height });
        }

        let mut pixmap = Pixmap::new(width, height).ok_or(SvgError::Canvas { width, height })?;
        resvg::render(
            &tree,
            Transform::from_scale(self.scale, self.scale),
            &mut pixmap.as_mut(),
        );

        Ok(Some(Drawable::Vector(Arc::new(VectorImage {
            intrinsic_width: size.width(),
            intrinsic_height: size.height(),
            scale: self.scale,
            pixmap,
        }))))
    }
}
