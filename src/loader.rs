use {
    crate::{
        cfg::{Config, NetworkConfig},
        dataurl::DataUrlHandler,
        dispatch::Dispatcher,
        drawable::Drawable,
        error::{Error, PipelineError},
        format::{Decoders, MediaDecoder},
        fs::{DirAssets, FileHandler},
        gif::GifDecoder,
        network::NetworkHandler,
        raster::RasterDecoder,
        requester::Requester,
        source::{AnySchemeHandler, FetchResult, SchemeHandler},
        svg::SvgDecoder,
    },
    ahash::RandomState,
    futures::future::FutureExt as _,
    hashbrown::HashMap,
    parking_lot::Mutex,
    std::{
        io::Read,
        panic::{catch_unwind, AssertUnwindSafe},
        path::PathBuf,
        sync::{
            atomic::{AtomicBool, AtomicU64, Ordering},
            Arc, Weak,
        },
        time::Duration,
    },
    tokio::{
        runtime::{Handle, Runtime},
        task::AbortHandle,
    },
    tracing::Instrument as _,
    url::Url,
};

fn erase(handler: impl SchemeHandler) -> Arc<dyn AnySchemeHandler> {
    Arc::new(handler)
}

/// Builder for [`Loader`].
/// Allows configure worker pool, scheme handlers and media decoders.
///
/// Schemes without explicit handler get default one:
/// [`NetworkHandler`] for `http` and `https`, [`FileHandler`] for `file`
/// and [`DataUrlHandler`] for `data`.
/// If no media decoders are added, [`SvgDecoder`], [`GifDecoder`] and
/// [`RasterDecoder`] are used in that order.
pub struct LoaderBuilder {
    dispatcher: Arc<dyn Dispatcher>,
    worker_pool: Option<Handle>,
    worker_threads: usize,
    thread_name: String,
    shutdown_timeout: Duration,
    error_drawable: Option<Drawable>,
    handlers: HashMap<String, Option<Arc<dyn AnySchemeHandler>>>,
    decoders: Decoders,
    assets: Option<PathBuf>,
    network: NetworkConfig,
    svg_scale: f32,
    autoplay_gif: bool,
}

impl LoaderBuilder {
    /// Returns new [`LoaderBuilder`] that delivers results through the dispatcher.
    pub fn new(dispatcher: impl Dispatcher) -> Self {
        let config = Config::default();

        LoaderBuilder {
            dispatcher: Arc::new(dispatcher),
            worker_pool: None,
            worker_threads: config.worker_threads,
            thread_name: config.thread_name,
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
            error_drawable: None,
            handlers: HashMap::new(),
            decoders: Decoders::new(),
            assets: None,
            network: config.network,
            svg_scale: config.svg_scale,
            autoplay_gif: config.autoplay_gif,
        }
    }

    /// Applies settings from the config.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.worker_threads = config.worker_threads;
        self.thread_name = config.thread_name.clone();
        self.shutdown_timeout = config.shutdown_timeout();
        self.assets = config.assets.as_deref().map(PathBuf::from);
        self.network = config.network.clone();
        self.svg_scale = config.svg_scale;
        self.autoplay_gif = config.autoplay_gif;
        self
    }

    /// Runs loading tasks on existing runtime instead of owned one.
    pub fn with_worker_pool(mut self, handle: Handle) -> Self {
        self.worker_pool = Some(handle);
        self
    }

    /// Sets number of worker threads of the owned runtime.
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Sets drawable delivered in place of anything that failed to load.
    /// Without it failed loads deliver nothing.
    pub fn with_error_drawable(mut self, drawable: Drawable) -> Self {
        self.error_drawable = Some(drawable);
        self
    }

    /// Registers handler for the scheme, replacing previous one.
    pub fn add_scheme_handler(&mut self, scheme: &str, handler: impl SchemeHandler) -> &mut Self {
        self.handlers
            .insert(scheme.to_ascii_lowercase(), Some(erase(handler)));
        self
    }

    /// Registers handler for the scheme, replacing previous one.
    pub fn with_scheme_handler(mut self, scheme: &str, handler: impl SchemeHandler) -> Self {
        self.add_scheme_handler(scheme, handler);
        self
    }

    /// Leaves the scheme without handler, even default one.
    pub fn disable_scheme(mut self, scheme: &str) -> Self {
        self.handlers.insert(scheme.to_ascii_lowercase(), None);
        self
    }

    /// Appends media decoder.
    /// Decoders added earlier take precedence.
    pub fn add_media_decoder(&mut self, decoder: impl MediaDecoder) -> &mut Self {
        self.decoders.push(decoder);
        self
    }

    /// Appends media decoder.
    /// Decoders added earlier take precedence.
    pub fn with_media_decoder(mut self, decoder: impl MediaDecoder) -> Self {
        self.decoders.push(decoder);
        self
    }

    /// Replaces all media decoders.
    pub fn with_media_decoders(mut self, decoders: Decoders) -> Self {
        self.decoders = decoders;
        self
    }

    /// Builds and returns new [`Loader`] instance.
    ///
    /// Fails if owned runtime cannot be created.
    pub fn build(self) -> std::io::Result<Loader> {
        let mut handlers = self.handlers;

        if !handlers.contains_key("http") || !handlers.contains_key("https") {
            let network = erase(NetworkHandler::with_config(&self.network));
            handlers
                .entry("http".to_owned())
                .or_insert_with(|| Some(network.clone()));
            handlers.entry("https".to_owned()).or_insert(Some(network));
        }

        let assets = self.assets;
        handlers.entry("file".to_owned()).or_insert_with(|| {
            Some(match assets {
                Some(root) => erase(FileHandler::with_assets(DirAssets::new(root))),
                None => erase(FileHandler::new()),
            })
        });

        handlers
            .entry("data".to_owned())
            .or_insert_with(|| Some(erase(DataUrlHandler)));

        let handlers = handlers
            .into_iter()
            .filter_map(|(scheme, handler)| Some((scheme.into_boxed_str(), handler?)))
            .collect();

        let decoders = if self.decoders.is_empty() {
            Decoders::new()
                .with(SvgDecoder::new(self.svg_scale))
                .with(GifDecoder::new(self.autoplay_gif))
                .with(RasterDecoder)
        } else {
            self.decoders
        };

        let (handle, runtime) = match self.worker_pool {
            Some(handle) => (handle, None),
            None => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(self.worker_threads.max(1))
                    .thread_name(self.thread_name)
                    .enable_time()
                    .build()?;
                (runtime.handle().clone(), Some(runtime))
            }
        };

        Ok(Loader {
            shared: Arc::new(Shared {
                handlers,
                decoders,
                dispatcher: self.dispatcher,
                error_drawable: self.error_drawable,
                in_flight: Mutex::new(HashMap::with_hasher(RandomState::new())),
                next_id: AtomicU64::new(0),
            }),
            handle,
            runtime,
            shutdown_timeout: self.shutdown_timeout,
        })
    }
}

/// Loads drawables for destinations off the caller's thread
/// and delivers them to requesters through the dispatcher.
///
/// Every `load` spawns independent task,
/// even if the same destination is already loading.
/// Tasks are cancelled either per requester or all at once per destination.
pub struct Loader {
    shared: Arc<Shared>,
    handle: Handle,
    runtime: Option<Runtime>,
    shutdown_timeout: Duration,
}

struct Shared {
    handlers: HashMap<Box<str>, Arc<dyn AnySchemeHandler>>,
    decoders: Decoders,
    dispatcher: Arc<dyn Dispatcher>,
    error_drawable: Option<Drawable>,
    in_flight: Mutex<HashMap<Box<str>, Vec<Tracked>, RandomState>>,
    next_id: AtomicU64,
}

struct Tracked {
    id: u64,
    abort: AbortHandle,
    cancelled: Arc<AtomicBool>,
    requester: Weak<dyn Requester>,
}

impl Tracked {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.abort.abort();
    }
}

impl Loader {
    /// Returns [`LoaderBuilder`] instance.
    pub fn builder(dispatcher: impl Dispatcher) -> LoaderBuilder {
        LoaderBuilder::new(dispatcher)
    }

    /// Returns new [`Loader`] instance with default handlers and decoders.
    pub fn create(dispatcher: impl Dispatcher) -> std::io::Result<Self> {
        LoaderBuilder::new(dispatcher).build()
    }

    /// Starts loading the destination.
    ///
    /// Result is delivered to the requester if it is still alive and attached,
    /// failures deliver error drawable.
    #[tracing::instrument(skip(self, requester))]
    pub fn load(&self, destination: &str, requester: Weak<dyn Requester>) {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let destination: Box<str> = destination.into();

        let tracked_requester = requester.clone();
        let task = {
            let shared = self.shared.clone();
            let destination = destination.clone();
            let cancelled = cancelled.clone();

            async move {
                let _untrack = Untrack {
                    shared: shared.clone(),
                    destination: destination.clone(),
                    id,
                };
                run(shared, destination, requester, cancelled).await;
            }
            .in_current_span()
        };

        // Task untracks itself under this lock, so it cannot finish before being tracked.
        let mut in_flight = self.shared.in_flight.lock();
        let handle = self.handle.spawn(task);
        in_flight.entry(destination).or_default().push(Tracked {
            id,
            abort: handle.abort_handle(),
            cancelled,
            requester: tracked_requester,
        });
    }

    /// Cancels every task loading the destination
    /// and asks all scheme handlers to abandon work for it.
    ///
    /// Nothing is delivered for cancelled tasks.
    #[tracing::instrument(skip(self))]
    pub fn cancel(&self, destination: &str) {
        let tasks = self.shared.in_flight.lock().remove(destination);

        if let Some(tasks) = tasks {
            tracing::debug!("Cancelling {} task(s)", tasks.len());
            for task in &tasks {
                task.cancel();
            }
        }

        for handler in self.shared.handlers.values() {
            handler.cancel(destination);
        }
    }

    /// Cancels tasks loading the destination for this requester only.
    ///
    /// Scheme handlers are asked to abandon the destination
    /// only when no other task is loading it.
    #[tracing::instrument(skip(self, requester))]
    pub fn cancel_request(&self, destination: &str, requester: &Weak<dyn Requester>) {
        let (cancelled, others) = {
            let mut in_flight = self.shared.in_flight.lock();
            let tasks = match in_flight.get_mut(destination) {
                Some(tasks) => tasks,
                None => return,
            };

            let mut cancelled = Vec::new();
            tasks.retain(|task| {
                if same_requester(&task.requester, requester) {
                    task.cancel();
                    cancelled.push(task.id);
                    false
                } else {
                    true
                }
            });

            let others = tasks.iter().any(|task| !task.abort.is_finished());
            if tasks.is_empty() {
                in_flight.remove(destination);
            }
            (cancelled, others)
        };

        if cancelled.is_empty() {
            return;
        }

        tracing::debug!("Cancelled {} task(s)", cancelled.len());
        if !others {
            for handler in self.shared.handlers.values() {
                handler.cancel(destination);
            }
        }
    }

    /// Checks if any task is loading the destination.
    pub fn is_loading(&self, destination: &str) -> bool {
        self.shared
            .in_flight
            .lock()
            .get(destination)
            .map_or(false, |tasks| tasks.iter().any(|task| !task.abort.is_finished()))
    }

    /// Returns number of tasks in flight.
    pub fn in_flight(&self) -> usize {
        self.shared
            .in_flight
            .lock()
            .values()
            .flatten()
            .filter(|task| !task.abort.is_finished())
            .count()
    }

    /// Cancels all tasks and shuts owned runtime down,
    /// waiting for blocking work up to configured shutdown timeout.
    ///
    /// Must not be called from within asynchronous context.
    pub fn shutdown(mut self) {
        self.cancel_all();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(self.shutdown_timeout);
        }
    }

    fn cancel_all(&self) {
        let in_flight = std::mem::take(&mut *self.shared.in_flight.lock());
        if in_flight.is_empty() {
            return;
        }

        tracing::debug!("Cancelling loads of {} destination(s)", in_flight.len());
        for (destination, tasks) in in_flight {
            for task in &tasks {
                task.cancel();
            }
            for handler in self.shared.handlers.values() {
                handler.cancel(&destination);
            }
        }
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.cancel_all();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn same_requester(a: &Weak<dyn Requester>, b: &Weak<dyn Requester>) -> bool {
    a.as_ptr() as *const () == b.as_ptr() as *const ()
}

/// Removes task's own entry from in-flight table once the task is done.
struct Untrack {
    shared: Arc<Shared>,
    destination: Box<str>,
    id: u64,
}

impl Drop for Untrack {
    fn drop(&mut self) {
        let mut in_flight = self.shared.in_flight.lock();
        if let Some(tasks) = in_flight.get_mut(&*self.destination) {
            tasks.retain(|task| task.id != self.id);
            if tasks.is_empty() {
                in_flight.remove(&*self.destination);
            }
        }
    }
}

async fn run(
    shared: Arc<Shared>,
    destination: Box<str>,
    requester: Weak<dyn Requester>,
    cancelled: Arc<AtomicBool>,
) {
    let drawable = match fetch_and_decode(&shared, &destination, &cancelled).await {
        Ok(drawable) => Some(drawable),
        Err(err) => {
            match err.downcast_ref::<PipelineError>() {
                Some(PipelineError::Cancelled) => {
                    tracing::debug!("Load of `{}` cancelled", destination);
                    return;
                }
                Some(PipelineError::InvalidDestination { .. } | PipelineError::UnknownScheme { .. }) => {
                    tracing::debug!("Cannot resolve `{}`: {}", destination, err);
                }
                _ => {
                    tracing::warn!("Failed to load `{}`: {:#}", destination, err);
                }
            }
            shared.error_drawable.clone()
        }
    };

    let drawable = match drawable {
        Some(drawable) => drawable,
        None => return,
    };

    if cancelled.load(Ordering::Acquire) {
        tracing::debug!("Load of `{}` cancelled", destination);
        return;
    }

    shared
        .dispatcher
        .post(Box::new(move || deliver(&destination, drawable, &requester, &cancelled)));
}

fn check(cancelled: &AtomicBool) -> Result<(), Error> {
    if cancelled.load(Ordering::Acquire) {
        Err(Error::new(PipelineError::Cancelled))
    } else {
        Ok(())
    }
}

async fn fetch_and_decode(shared: &Arc<Shared>, destination: &str, cancelled: &AtomicBool) -> Result<Drawable, Error> {
    check(cancelled)?;

    let url = Url::parse(destination).map_err(|source| {
        Error::new(PipelineError::InvalidDestination {
            destination: destination.into(),
            source,
        })
    })?;

    let handler = shared.handlers.get(url.scheme()).ok_or_else(|| {
        Error::new(PipelineError::UnknownScheme {
            scheme: url.scheme().into(),
        })
    })?;

    let fetched = AssertUnwindSafe(async { handler.handle(destination, &url).await })
        .catch_unwind()
        .await
        .map_err(|_| Error::new(PipelineError::Panicked("fetching")))??
        .ok_or_else(|| Error::new(PipelineError::NoStream))?;

    tracing::debug!("Fetched `{}`", destination);
    check(cancelled)?;

    let span = tracing::Span::current();
    let shared = shared.clone();

    match tokio::task::spawn_blocking(move || span.in_scope(|| decode(&shared.decoders, fetched))).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(Error::new(PipelineError::Panicked("decoding"))),
        Err(_) => Err(Error::new(PipelineError::Cancelled)),
    }
}

/// Decodes fetched stream, closing it on every path.
fn decode(decoders: &Decoders, fetched: FetchResult) -> Result<Drawable, Error> {
    let (mut stream, file_name, content_type) = fetched.into_parts();
    let result = decode_stream(decoders, &mut *stream, file_name, content_type);
    drop(stream);
    result
}

fn decode_stream(
    decoders: &Decoders,
    stream: &mut dyn Read,
    file_name: Option<String>,
    content_type: Option<String>,
) -> Result<Drawable, Error> {
    let index = decoders
        .select(file_name.as_deref(), content_type.as_deref())
        .ok_or_else(|| {
            Error::new(PipelineError::NoDecoder {
                file_name,
                content_type,
            })
        })?;

    let decoder = decoders.get(index);
    tracing::trace!("Decoding with `{}`", decoder.name());

    match catch_unwind(AssertUnwindSafe(|| decoder.decode(stream))) {
        Ok(decoded) => decoded?.ok_or_else(|| Error::new(PipelineError::Empty)),
        Err(_) => Err(Error::new(PipelineError::Panicked("decoding"))),
    }
}

/// Runs on the dispatcher thread.
fn deliver(destination: &str, drawable: Drawable, requester: &Weak<dyn Requester>, cancelled: &AtomicBool) {
    if cancelled.load(Ordering::Acquire) {
        tracing::debug!("Load of `{}` cancelled before delivery", destination);
        return;
    }

    match requester.upgrade() {
        Some(requester) if requester.is_attached() => requester.set_result(drawable),
        Some(_) => tracing::debug!("Requester of `{}` is detached", destination),
        None => tracing::debug!("Requester of `{}` is gone", destination),
    }
}
