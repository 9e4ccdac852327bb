use std::{
    fmt::{self, Debug, Display},
    sync::Arc,
};

/// Type-erased error produced by scheme handlers, media decoders or the
/// loading pipeline itself.
///
/// Cheap to clone, so the same failure can be logged and reported.
#[derive(Clone)]
#[repr(transparent)]
pub struct Error(Arc<dyn std::error::Error + Send + Sync>);

impl Error {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(Arc::new(error))
    }

    /// Returns reference to the inner error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.0.downcast_ref()
    }

    /// Checks if inner error is of type `E`.
    pub fn is<E>(&self) -> bool
    where
        E: std::error::Error + 'static,
    {
        self.0.is::<E>()
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.0)
    }
}

/// Failures detected by the loader between fetching and decoding.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Destination `{destination}` is not an absolute URL")]
    InvalidDestination {
        destination: Box<str>,
        #[source]
        source: url::ParseError,
    },

    #[error("No scheme handler registered for `{scheme}`")]
    UnknownScheme { scheme: Box<str> },

    #[error("Scheme handler produced no stream")]
    NoStream,

    #[error("No media decoder accepts file name {file_name:?} or content type {content_type:?}")]
    NoDecoder {
        file_name: Option<String>,
        content_type: Option<String>,
    },

    #[error("Media decoder produced no drawable")]
    Empty,

    #[error("Panicked while {0}")]
    Panicked(&'static str),

    #[error("Request was cancelled")]
    Cancelled,
}
