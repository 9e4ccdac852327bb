use {
    crate::source::{FetchResult, SchemeHandler},
    base64::Engine as _,
    std::{
        future::{ready, Ready},
        io::Cursor,
    },
    url::Url,
};

/// Loads data embedded directly into URL with [data scheme](https://tools.ietf.org/html/rfc2397).
///
/// Media type of the URL becomes content type hint.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataUrlHandler;

#[derive(Debug, thiserror::Error)]
pub enum DataUrlError {
    #[error("Url is not a `data:` url")]
    NotDataUrl,

    #[error("Url head is not followed by the data")]
    MissingData,

    #[error("Failed to decode from base64")]
    DecodeBase64Error {
        #[from]
        source: base64::DecodeError,
    },
}

impl SchemeHandler for DataUrlHandler {
    type Error = DataUrlError;
    type Fut = Ready<Result<Option<FetchResult>, DataUrlError>>;

    #[tracing::instrument(skip(self, _url))]
    fn handle(&self, destination: &str, _url: &Url) -> Self::Fut {
        ready(decode(destination).map(Some))
    }
}

/// Decodes `data:` url into byte stream.
pub fn decode(url: &str) -> Result<FetchResult, DataUrlError> {
    // Raw string is parsed instead of `Url::path`
    // since the latter may normalize the payload.
    let rest = match url.get(..5) {
        Some(head) if head.eq_ignore_ascii_case("data:") => &url[5..],
        _ => return Err(DataUrlError::NotDataUrl),
    };

    let comma = rest.find(',').ok_or(DataUrlError::MissingData)?;
    let (head, data) = (&rest[..comma], &rest[comma + 1..]);

    let mut params = head.split(';');
    let media_type = params.next().unwrap_or("").trim();

    let mut base64 = false;
    for param in params {
        if param.trim().eq_ignore_ascii_case("base64") {
            base64 = true;
        }
    }

    let bytes = if base64 {
        let cleaned: Vec<u8> = data
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        base64::engine::general_purpose::STANDARD.decode(cleaned)?
    } else {
        percent_encoding::percent_decode_str(data).collect()
    };

    let result = FetchResult::new(Cursor::new(bytes));
    if media_type.is_empty() {
        Ok(result)
    } else {
        Ok(result.with_content_type(media_type))
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Read as _};

    fn bytes(result: FetchResult) -> Vec<u8> {
        let (mut stream, _, _) = result.into_parts();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn base64_payload() {
        let result = decode("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(result.content_type(), Some("image/png"));
        assert_eq!(result.file_name(), None);
        assert_eq!(bytes(result), b"hello");
    }

    #[test]
    fn whitespace_in_base64_is_ignored() {
        let result = decode("data:image/gif;base64,aGVs\n bG8=").unwrap();
        assert_eq!(bytes(result), b"hello");
    }

    #[test]
    fn percent_encoded_payload() {
        let result = decode("data:image/svg+xml,%3Csvg%2F%3E").unwrap();
        assert_eq!(result.content_type(), Some("image/svg+xml"));
        assert_eq!(bytes(result), b"<svg/>");
    }

    #[test]
    fn missing_media_type_gives_no_hint() {
        let result = decode("data:,abc").unwrap();
        assert_eq!(result.content_type(), None);
        assert_eq!(bytes(result), b"abc");
    }

    #[test]
    fn malformed_base64_fails() {
        assert!(matches!(
            decode("data:image/png;base64,!!!!"),
            Err(DataUrlError::DecodeBase64Error { .. })
        ));
    }

    #[test]
    fn missing_comma_fails() {
        assert!(matches!(
            decode("data:image/png;base64"),
            Err(DataUrlError::MissingData)
        ));
    }

    #[test]
    fn other_scheme_is_rejected() {
        assert!(matches!(
            decode("https://example.com/x.png"),
            Err(DataUrlError::NotDataUrl)
        ));
    }
}
