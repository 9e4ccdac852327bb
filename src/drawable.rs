use {
    image::{Rgba, RgbaImage},
    resvg::tiny_skia::Pixmap,
    std::{fmt, sync::Arc, time::Duration},
};

/// Decoded visual result handed over to a requester.
///
/// Clones share pixel data.
#[derive(Clone)]
pub enum Drawable {
    /// Single bitmap.
    Raster(Arc<RgbaImage>),

    /// Vector image rasterized at load time.
    Vector(Arc<VectorImage>),

    /// Sequence of frames with per-frame delays.
    Animated(Arc<AnimatedImage>),
}

impl Drawable {
    /// Returns drawable filled with single color.
    /// Handy as error placeholder.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Drawable::Raster(Arc::new(RgbaImage::from_pixel(width, height, Rgba(rgba))))
    }

    pub fn width(&self) -> u32 {
        match self {
            Drawable::Raster(image) => image.width(),
            Drawable::Vector(vector) => vector.pixmap.width(),
            Drawable::Animated(animated) => animated.width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Drawable::Raster(image) => image.height(),
            Drawable::Vector(vector) => vector.pixmap.height(),
            Drawable::Animated(animated) => animated.height,
        }
    }

    /// Checks if both drawables share the same pixel data.
    pub fn ptr_eq(&self, other: &Drawable) -> bool {
        match (self, other) {
            (Drawable::Raster(a), Drawable::Raster(b)) => Arc::ptr_eq(a, b),
            (Drawable::Vector(a), Drawable::Vector(b)) => Arc::ptr_eq(a, b),
            (Drawable::Animated(a), Drawable::Animated(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Drawable::Raster(_) => "Raster",
            Drawable::Vector(_) => "Vector",
            Drawable::Animated(_) => "Animated",
        }
    }
}

impl fmt::Debug for Drawable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.kind())
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Vector image together with its rasterization.
pub struct VectorImage {
    /// Size declared by the document, in user units.
    pub intrinsic_width: f32,
    pub intrinsic_height: f32,

    /// Density multiplier used for rasterization.
    pub scale: f32,

    /// Premultiplied RGBA pixels.
    pub pixmap: Pixmap,
}

pub struct Frame {
    pub image: RgbaImage,
    pub delay: Duration,
}

pub struct AnimatedImage {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<Frame>,

    /// Whether animation should start as soon as it is shown.
    pub autoplay: bool,
}

impl AnimatedImage {
    /// Total duration of one loop.
    pub fn duration(&self) -> Duration {
        self.frames.iter().map(|frame| frame.delay).sum()
    }
}
