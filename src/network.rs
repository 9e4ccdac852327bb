use {
    crate::{
        cfg::NetworkConfig,
        source::{FetchResult, SchemeHandler},
    },
    futures::future::BoxFuture,
    hashbrown::HashMap,
    parking_lot::Mutex,
    std::{
        io::{self, Cursor, Read as _},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    },
    tracing::Instrument as _,
    url::Url,
};

const CHUNK_SIZE: usize = 16 * 1024;

type InFlight = Arc<Mutex<HashMap<Box<str>, Vec<Arc<AtomicBool>>>>>;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Request failed")]
    Request {
        #[from]
        source: ureq::Error,
    },

    #[error("Failed to read response body")]
    Body {
        #[source]
        source: io::Error,
    },

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Request task failed")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
}

/// Fetches `http` and `https` destinations with blocking GET requests
/// executed on the blocking thread pool.
///
/// Server-declared `Content-Type` becomes content type hint.
/// Non-success statuses are errors.
/// Cancelling a destination aborts its requests between body chunks,
/// dropping the connection.
/// A peer that stops sending holds its blocking thread
/// until `timeout_ms` of [`NetworkConfig`] elapses.
/// A request failing after cancellation reports [`NetworkError::Cancelled`].
#[derive(Clone)]
pub struct NetworkHandler {
    agent: ureq::Agent,
    user_agent: Arc<str>,
    max_body_size: u64,
    in_flight: InFlight,
}

impl NetworkHandler {
    pub fn new() -> Self {
        NetworkHandler::with_config(&NetworkConfig::default())
    }

    pub fn with_config(config: &NetworkConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build();

        NetworkHandler {
            agent: agent.into(),
            user_agent: config.user_agent.as_str().into(),
            max_body_size: config.max_body_size,
            in_flight: Arc::default(),
        }
    }

    fn register(&self, destination: &str) -> Registration {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.in_flight
            .lock()
            .entry(destination.into())
            .or_default()
            .push(cancelled.clone());

        Registration {
            in_flight: self.in_flight.clone(),
            destination: destination.into(),
            cancelled,
        }
    }
}

impl Default for NetworkHandler {
    fn default() -> Self {
        NetworkHandler::new()
    }
}

impl SchemeHandler for NetworkHandler {
    type Error = NetworkError;
    type Fut = BoxFuture<'static, Result<Option<FetchResult>, NetworkError>>;

    #[tracing::instrument(skip(self, url))]
    fn handle(&self, destination: &str, url: &Url) -> Self::Fut {
        let request = Request {
            agent: self.agent.clone(),
            url: url.as_str().into(),
            user_agent: self.user_agent.clone(),
            max_body_size: self.max_body_size,
            registration: self.register(destination),
        };

        Box::pin(
            async move { tokio::task::spawn_blocking(move || request.fetch()).await? }
                .in_current_span(),
        )
    }

    fn cancel(&self, destination: &str) {
        if let Some(requests) = self.in_flight.lock().get(destination) {
            tracing::debug!("Cancelling {} request(s) to `{}`", requests.len(), destination);
            for cancelled in requests {
                cancelled.store(true, Ordering::Release);
            }
        }
    }
}

/// Keeps cancellation flag reachable by destination while request is alive.
struct Registration {
    in_flight: InFlight,
    destination: Box<str>,
    cancelled: Arc<AtomicBool>,
}

impl Registration {
    fn check(&self) -> Result<(), NetworkError> {
        if self.cancelled.load(Ordering::Acquire) {
            Err(NetworkError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if let Some(requests) = in_flight.get_mut(&self.destination) {
            requests.retain(|cancelled| !Arc::ptr_eq(cancelled, &self.cancelled));
            if requests.is_empty() {
                in_flight.remove(&self.destination);
            }
        }
    }
}

struct Request {
    agent: ureq::Agent,
    url: Box<str>,
    user_agent: Arc<str>,
    max_body_size: u64,
    registration: Registration,
}

impl Request {
    fn fetch(self) -> Result<Option<FetchResult>, NetworkError> {
        self.registration.check()?;

        let mut response = match self
            .agent
            .get(&*self.url)
            .header("User-Agent", &*self.user_agent)
            .call()
        {
            Ok(response) => response,
            Err(err) => {
                self.registration.check()?;
                return Err(err.into());
            }
        };

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let mut reader = response
            .body_mut()
            .with_config()
            .limit(self.max_body_size)
            .reader();

        let mut bytes = Vec::new();
        let mut chunk = vec![0; CHUNK_SIZE];
        loop {
            self.registration.check()?;
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => bytes.extend_from_slice(&chunk[..read]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.registration.check()?;
                    return Err(NetworkError::Body { source: err });
                }
            }
        }

        tracing::trace!("Fetched {} bytes from `{}`", bytes.len(), self.url);

        let result = FetchResult::new(Cursor::new(bytes));
        Ok(Some(match content_type {
            Some(content_type) => result.with_content_type(content_type),
            None => result,
        }))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            io::{Read as _, Write as _},
            net::TcpListener,
            thread::{self, JoinHandle},
            time::{Duration, Instant},
        },
    };

    fn serve_once(status: &'static str, content_type: &'static str, body: &'static [u8]) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).unwrap() {
                    0 => break,
                    read => request.extend_from_slice(&buf[..read]),
                }
            }

            // Client may hang up early on error statuses.
            let _ = write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                content_type,
                body.len()
            );
            let _ = stream.write_all(body);
        });

        (format!("http://{}/image", addr), server)
    }

    fn fetch(handler: &NetworkHandler, destination: &str) -> Result<Option<FetchResult>, NetworkError> {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let url = Url::parse(destination).unwrap();
        runtime.block_on(handler.handle(destination, &url))
    }

    #[test]
    fn body_and_content_type() {
        let (destination, server) = serve_once("200 OK", "image/png", b"not really png");

        let handler = NetworkHandler::new();
        let result = fetch(&handler, &destination).unwrap().unwrap();
        server.join().unwrap();

        assert_eq!(result.content_type(), Some("image/png"));
        assert_eq!(result.file_name(), None);

        let (mut stream, _, _) = result.into_parts();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"not really png");

        assert!(handler.in_flight.lock().is_empty());
    }

    #[test]
    fn error_status_fails() {
        let (destination, server) = serve_once("404 Not Found", "text/plain", b"missing");

        let err = fetch(&NetworkHandler::new(), &destination).unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, NetworkError::Request { .. }));
    }

    #[test]
    fn cancelled_before_start() {
        let handler = NetworkHandler::new();
        let destination = "http://127.0.0.1:9/never";
        let url = Url::parse(destination).unwrap();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let fut = handler.handle(destination, &url);
        assert_eq!(handler.in_flight.lock().get(destination).map(Vec::len), Some(1));

        handler.cancel(destination);
        assert!(matches!(runtime.block_on(fut), Err(NetworkError::Cancelled)));
        assert!(handler.in_flight.lock().is_empty());
    }

    /// Sends headers and a piece of the body, then goes silent.
    fn serve_stalled() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0; 1024];
            let _ = stream.read(&mut buf);
            let _ = write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 4096\r\n\r\n"
            );
            let _ = stream.write_all(&[0; 16]);
            let _ = stream.flush();
            thread::sleep(Duration::from_secs(5));
        });

        format!("http://{}/stalled", addr)
    }

    #[test]
    fn stalled_body_reports_cancellation_within_timeout() {
        let destination = serve_stalled();
        let handler = NetworkHandler::with_config(&NetworkConfig {
            timeout_ms: 500,
            ..NetworkConfig::default()
        });

        let canceller = handler.clone();
        let cancel_destination = destination.clone();
        thread::spawn(move || {
            while !canceller.in_flight.lock().contains_key(&*cancel_destination) {
                thread::sleep(Duration::from_millis(5));
            }
            thread::sleep(Duration::from_millis(50));
            canceller.cancel(&cancel_destination);
        });

        let start = Instant::now();
        let err = fetch(&handler, &destination).unwrap_err();

        assert!(matches!(err, NetworkError::Cancelled), "{:?}", err);
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(handler.in_flight.lock().is_empty());
    }

    #[test]
    fn cancel_without_requests_is_noop() {
        NetworkHandler::new().cancel("https://example.com/x.png");
    }
}
