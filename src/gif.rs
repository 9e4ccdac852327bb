use {
    crate::{
        drawable::{AnimatedImage, Drawable, Frame},
        format::{extension, mime_essence, MediaDecoder},
    },
    image::{codecs::gif, AnimationDecoder as _, ImageDecoder as _, ImageError},
    std::{
        io::{self, Cursor, Read},
        sync::Arc,
        time::Duration,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum GifError {
    #[error("Failed to read gif stream")]
    Read {
        #[from]
        source: io::Error,
    },

    #[error("Failed to decode gif")]
    Decode {
        #[from]
        source: ImageError,
    },
}

/// Decodes GIF animations frame by frame.
#[derive(Clone, Copy, Debug)]
pub struct GifDecoder {
    autoplay: bool,
}

impl Default for GifDecoder {
    fn default() -> Self {
        GifDecoder::new(true)
    }
}

impl GifDecoder {
    /// `autoplay` is carried to produced drawables.
    pub fn new(autoplay: bool) -> Self {
        GifDecoder { autoplay }
    }
}

impl MediaDecoder for GifDecoder {
    type Error = GifError;

    fn can_decode_by_file_name(&self, file_name: &str) -> bool {
        extension(file_name).as_deref() == Some("gif")
    }

    fn can_decode_by_content_type(&self, content_type: Option<&str>) -> bool {
        content_type.map_or(false, |content_type| mime_essence(content_type) == "image/gif")
    }

    fn decode(&self, stream: &mut dyn Read) -> Result<Option<Drawable>, GifError> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;

        if bytes.is_empty() {
            return Ok(None);
        }

        let decoder = gif::GifDecoder::new(Cursor::new(bytes))?;
        let (width, height) = decoder.dimensions();

        let frames: Vec<Frame> = decoder
            .into_frames()
            .collect_frames()?
            .into_iter()
            .map(|frame| Frame {
                delay: Duration::from(frame.delay()),
                image: frame.into_buffer(),
            })
            .collect();

        if frames.is_empty() {
            return Ok(None);
        }

        tracing::trace!("Decoded {}x{} gif with {} frames", width, height, frames.len());

        Ok(Some(Drawable::Animated(Arc::new(AnimatedImage {
            width,
            height,
            frames,
            autoplay: self.autoplay,
        }))))
    }
}
