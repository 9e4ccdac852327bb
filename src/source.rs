use {
    crate::error::Error,
    futures::future::{BoxFuture, TryFutureExt as _},
    std::{fmt, future::Future, io::Read},
    url::Url,
};

/// Byte stream fetched by a [`SchemeHandler`] plus hints for decoder selection.
///
/// The stream is owned by the loading task that requested it
/// and is closed (dropped) by that task before it finishes.
pub struct FetchResult {
    stream: Box<dyn Read + Send>,
    file_name: Option<String>,
    content_type: Option<String>,
}

impl FetchResult {
    pub fn new(stream: impl Read + Send + 'static) -> Self {
        FetchResult::boxed(Box::new(stream))
    }

    pub fn boxed(stream: Box<dyn Read + Send>) -> Self {
        FetchResult {
            stream,
            file_name: None,
            content_type: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn into_parts(self) -> (Box<dyn Read + Send>, Option<String>, Option<String>) {
        (self.stream, self.file_name, self.content_type)
    }
}

impl fmt::Debug for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResult")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Resolves destinations of one URL scheme into byte streams.
pub trait SchemeHandler: Send + Sync + 'static {
    /// Error that may occur while fetching.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Future that resolves into fetched stream, error or `None`.
    type Fut: Future<Output = Result<Option<FetchResult>, Self::Error>> + Send + 'static;

    /// Fetch data for the destination.
    /// Returns `Ok(None)` if there is nothing to fetch.
    ///
    /// Blocking I/O belongs on the blocking pool
    /// and must stop once [`SchemeHandler::cancel`] is called for the destination.
    fn handle(&self, destination: &str, url: &Url) -> Self::Fut;

    /// Abort any handler-owned work associated with the destination.
    /// Must be safe to call when there is none.
    fn cancel(&self, destination: &str) {
        let _ = destination;
    }
}

pub(crate) trait AnySchemeHandler: Send + Sync + 'static {
    fn handle(&self, destination: &str, url: &Url) -> BoxFuture<'static, Result<Option<FetchResult>, Error>>;
    fn cancel(&self, destination: &str);
}

impl<H> AnySchemeHandler for H
where
    H: SchemeHandler,
{
    fn handle(&self, destination: &str, url: &Url) -> BoxFuture<'static, Result<Option<FetchResult>, Error>> {
        let fut = SchemeHandler::handle(self, destination, url);
        Box::pin(fut.map_err(Error::new))
    }

    fn cancel(&self, destination: &str) {
        SchemeHandler::cancel(self, destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_are_optional() {
        let result = FetchResult::new(std::io::empty());
        assert_eq!(result.file_name(), None);
        assert_eq!(result.content_type(), None);

        let result = result
            .with_file_name("logo.svg")
            .with_content_type("image/svg+xml");
        assert_eq!(result.file_name(), Some("logo.svg"));
        assert_eq!(result.content_type(), Some("image/svg+xml"));

        let (mut stream, file_name, content_type) = result.into_parts();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(file_name.as_deref(), Some("logo.svg"));
        assert_eq!(content_type.as_deref(), Some("image/svg+xml"));
    }
}
