use {
    crate::{drawable::Drawable, error::Error},
    std::io::Read,
};

/// Decodes byte streams of one format family into [`Drawable`]s.
///
/// Examples would be [`SvgDecoder`] to load vector images and
/// [`GifDecoder`] to load animations.
/// Even though both are fetched as raw bytes.
///
/// [`SvgDecoder`]: crate::svg::SvgDecoder
/// [`GifDecoder`]: crate::gif::GifDecoder
pub trait MediaDecoder: Send + Sync + 'static {
    /// Error that can occur during decoding.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Cheap check by file name, usually by extension.
    fn can_decode_by_file_name(&self, file_name: &str) -> bool;

    /// Check by content type hint, used only when file name is unknown.
    fn can_decode_by_content_type(&self, content_type: Option<&str>) -> bool;

    /// Consumes stream and decodes it.
    /// `Ok(None)` means the stream holds nothing to show.
    ///
    /// Called on the blocking thread pool.
    fn decode(&self, stream: &mut dyn Read) -> Result<Option<Drawable>, Self::Error>;
}

pub(crate) trait AnyMediaDecoder: Send + Sync + 'static {
    fn can_decode_by_file_name(&self, file_name: &str) -> bool;
    fn can_decode_by_content_type(&self, content_type: Option<&str>) -> bool;
    fn decode(&self, stream: &mut dyn Read) -> Result<Option<Drawable>, Error>;
    fn name(&self) -> &'static str;
}

impl<D> AnyMediaDecoder for D
where
    D: MediaDecoder,
{
    fn can_decode_by_file_name(&self, file_name: &str) -> bool {
        MediaDecoder::can_decode_by_file_name(self, file_name)
    }

    fn can_decode_by_content_type(&self, content_type: Option<&str>) -> bool {
        MediaDecoder::can_decode_by_content_type(self, content_type)
    }

    fn decode(&self, stream: &mut dyn Read) -> Result<Option<Drawable>, Error> {
        MediaDecoder::decode(self, stream).map_err(Error::new)
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<D>()
    }
}

/// Ordered list of media decoders.
///
/// Registration order breaks ties between decoders claiming the same input.
#[derive(Default)]
pub struct Decoders {
    decoders: Vec<Box<dyn AnyMediaDecoder>>,
}

impl Decoders {
    pub fn new() -> Self {
        Decoders::default()
    }

    pub fn push(&mut self, decoder: impl MediaDecoder) -> &mut Self {
        self.decoders.push(Box::new(decoder));
        self
    }

    pub fn with(mut self, decoder: impl MediaDecoder) -> Self {
        self.push(decoder);
        self
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Returns position of the decoder to use.
    ///
    /// When file name is known, first decoder accepting it wins
    /// and content type is not consulted.
    /// Otherwise first decoder accepting the content type wins.
    pub fn select(&self, file_name: Option<&str>, content_type: Option<&str>) -> Option<usize> {
        match file_name {
            Some(file_name) => self
                .decoders
                .iter()
                .position(|d| d.can_decode_by_file_name(file_name)),
            None => self
                .decoders
                .iter()
                .position(|d| d.can_decode_by_content_type(content_type)),
        }
    }

    pub(crate) fn get(&self, index: usize) -> &dyn AnyMediaDecoder {
        &*self.decoders[index]
    }
}

/// Returns lowercase extension of the file name.
pub(crate) fn extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Returns lowercase essence of the content type, without parameters.
pub(crate) fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
