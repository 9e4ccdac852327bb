use {
    crate::{
        drawable::Drawable,
        format::{extension, MediaDecoder},
    },
    image::{ImageError, ImageFormat},
    std::{
        io::{self, Read},
        sync::Arc,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("Failed to read image stream")]
    Read {
        #[from]
        source: io::Error,
    },

    #[error("Failed to decode image")]
    Decode {
        #[from]
        source: ImageError,
    },
}

/// Decodes bitmap formats supported by `image` crate.
///
/// Format is sniffed from the stream itself,
/// so this decoder accepts any content type and should be registered last.
#[derive(Clone, Copy, Debug, Default)]
pub struct RasterDecoder;

impl MediaDecoder for RasterDecoder {
    type Error = RasterError;

    fn can_decode_by_file_name(&self, file_name: &str) -> bool {
        extension(file_name).map_or(false, |ext| ImageFormat::from_extension(ext).is_some())
    }

    fn can_decode_by_content_type(&self, _content_type: Option<&str>) -> bool {
        true
    }

    fn decode(&self, stream: &mut dyn Read) -> Result<Option<Drawable>, RasterError> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;

        if bytes.is_empty() {
            return Ok(None);
        }

        let image = image::load_from_memory(&bytes)?;
        tracing::trace!("Decoded {}x{} bitmap", image.width(), image.height());
        Ok(Some(Drawable::Raster(Arc::new(image.into_rgba8()))))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        image::{Rgba, RgbaImage},
        std::io::Cursor,
    };

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn decodes_png() {
        let drawable = RasterDecoder
            .decode(&mut Cursor::new(png(4, 3)))
            .unwrap()
            .unwrap();

        match drawable {
            Drawable::Raster(image) => {
                assert_eq!(image.dimensions(), (4, 3));
                assert_eq!(image.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_stream_is_nothing() {
        assert!(RasterDecoder.decode(&mut io::empty()).unwrap().is_none());
    }

    #[test]
    fn garbage_fails() {
        let err = RasterDecoder
            .decode(&mut Cursor::new(b"definitely not an image".to_vec()))
            .unwrap_err();
        assert!(matches!(err, RasterError::Decode { .. }));
    }

    #[test]
    fn claims() {
        assert!(RasterDecoder.can_decode_by_file_name("a.PNG"));
        assert!(RasterDecoder.can_decode_by_file_name("a.jpeg"));
        assert!(!RasterDecoder.can_decode_by_file_name("a.svg"));
        assert!(!RasterDecoder.can_decode_by_file_name("README"));
        assert!(RasterDecoder.can_decode_by_content_type(Some("image/png")));
        assert!(RasterDecoder.can_decode_by_content_type(None));
    }
}
