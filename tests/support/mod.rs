#![allow(dead_code)]

use {
    image::{ImageFormat, Rgba, RgbaImage},
    futures::future::BoxFuture,
    md_image_loader::{Drawable, FetchResult, Loader, Requester, SchemeHandler},
    parking_lot::Mutex,
    std::{
        future::{pending, ready, Pending, Ready},
        io::{self, Cursor, Read, Write as _},
        net::TcpListener,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc, Weak,
        },
        thread,
        time::{Duration, Instant},
    },
    url::Url,
};

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub const LOGO_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="12">
    <circle cx="6" cy="6" r="5" fill="blue"/>
</svg>"#;

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([0, 128, 255, 255]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// Serves single HTTP response on a local port and returns URL to request.
pub fn serve_once(content_type: &'static str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(read) => request.extend_from_slice(&buf[..read]),
            }
        }

        let _ = write!(
            stream,
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            content_type,
            body.len()
        );
        let _ = stream.write_all(&body);
    });

    format!("http://{}/x", addr)
}

/// Requester that records every delivery.
pub struct Recorder {
    attached: AtomicBool,
    results: Mutex<Vec<Drawable>>,
}

impl Recorder {
    pub fn attached() -> Arc<Self> {
        Arc::new(Recorder {
            attached: AtomicBool::new(true),
            results: Mutex::new(Vec::new()),
        })
    }

    pub fn detached() -> Arc<Self> {
        let recorder = Recorder::attached();
        recorder.detach();
        recorder
    }

    pub fn weak(self: &Arc<Self>) -> Weak<dyn Requester> {
        let weak: Weak<Self> = Arc::downgrade(self);
        weak
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    pub fn results(&self) -> Vec<Drawable> {
        self.results.lock().clone()
    }

    pub fn has_result(&self) -> bool {
        !self.results.lock().is_empty()
    }
}

impl Requester for Recorder {
    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn set_result(&self, drawable: Drawable) {
        self.results.lock().push(drawable);
    }
}

/// Waits until loader has no tasks in flight.
pub fn wait_idle(loader: &Loader) {
    let deadline = Instant::now() + TIMEOUT;
    while loader.in_flight() > 0 {
        assert!(Instant::now() < deadline, "loader is still busy");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Handler whose fetches never complete.
/// Records destinations it was asked to cancel.
#[derive(Clone, Default)]
pub struct Stalled {
    pub cancelled: Arc<Mutex<Vec<String>>>,
}

impl SchemeHandler for Stalled {
    type Error = io::Error;
    type Fut = Pending<Result<Option<FetchResult>, io::Error>>;

    fn handle(&self, _destination: &str, _url: &Url) -> Self::Fut {
        pending()
    }

    fn cancel(&self, destination: &str) {
        self.cancelled.lock().push(destination.to_owned());
    }
}

/// Stream that counts how many times it was closed.
pub struct Counted {
    bytes: Cursor<Vec<u8>>,
    closed: Arc<AtomicUsize>,
}

impl Read for Counted {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.bytes.read(buf)
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handler that serves fixed bytes through [`Counted`] streams.
#[derive(Clone)]
pub struct Fixed {
    pub bytes: Vec<u8>,
    pub file_name: Option<&'static str>,
    pub content_type: Option<&'static str>,
    pub closed: Arc<AtomicUsize>,
}

impl Fixed {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Fixed {
            bytes: bytes.into(),
            file_name: None,
            content_type: None,
            closed: Arc::default(),
        }
    }

    pub fn file_name(mut self, file_name: &'static str) -> Self {
        self.file_name = Some(file_name);
        self
    }

    pub fn content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SchemeHandler for Fixed {
    type Error = io::Error;
    type Fut = Ready<Result<Option<FetchResult>, io::Error>>;

    fn handle(&self, _destination: &str, _url: &Url) -> Self::Fut {
        let mut result = FetchResult::new(Counted {
            bytes: Cursor::new(self.bytes.clone()),
            closed: self.closed.clone(),
        });
        if let Some(file_name) = self.file_name {
            result = result.with_file_name(file_name);
        }
        if let Some(content_type) = self.content_type {
            result = result.with_content_type(content_type);
        }
        ready(Ok(Some(result)))
    }
}

/// Handler that serves [`Fixed`] content once the gate is opened.
/// Each fetch waits for its own `open` call.
#[derive(Clone)]
pub struct Gated {
    pub fixed: Fixed,
    gate: flume::Receiver<()>,
    opener: flume::Sender<()>,
}

impl Gated {
    pub fn new(fixed: Fixed) -> Self {
        let (opener, gate) = flume::unbounded();
        Gated { fixed, gate, opener }
    }

    /// Lets `count` pending or future fetches through.
    pub fn open(&self, count: usize) {
        for _ in 0..count {
            let _ = self.opener.send(());
        }
    }
}

impl SchemeHandler for Gated {
    type Error = io::Error;
    type Fut = BoxFuture<'static, Result<Option<FetchResult>, io::Error>>;

    fn handle(&self, destination: &str, url: &Url) -> Self::Fut {
        let gate = self.gate.clone();
        let fetch = self.fixed.handle(destination, url);
        Box::pin(async move {
            let _ = gate.recv_async().await;
            fetch.await
        })
    }
}
