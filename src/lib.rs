//!
//! Asynchronous image loading for rendered markdown.
//!
//! [`Loader`] resolves destinations found in markdown into [`Drawable`]s.
//! Bytes are fetched by [`SchemeHandler`]s picked by URL scheme,
//! decoded by first matching [`MediaDecoder`] and delivered back
//! to the [`Requester`] on the thread that pumps the [`Dispatcher`].
//!

pub mod cfg;
pub mod dataurl;
pub mod dispatch;
pub mod drawable;
pub mod error;
pub mod format;
pub mod fs;
pub mod gif;
pub mod loader;
pub mod network;
pub mod raster;
pub mod requester;
pub mod source;
pub mod svg;

pub use self::{
    cfg::Config,
    dispatch::{Delivery, Dispatcher},
    drawable::Drawable,
    error::{Error, PipelineError},
    format::{Decoders, MediaDecoder},
    loader::{Loader, LoaderBuilder},
    requester::{AsyncDrawable, Requester},
    source::{FetchResult, SchemeHandler},
};

// Reexport crates used in public API.
pub use {image, resvg, url};

/// Installs default eyre handler.
pub fn install_eyre_handler() {
    if let Err(err) = color_eyre::install() {
        panic!("Failed to install eyre report handler: {}", err);
    }
}

/// Installs default tracing subscriber.
pub fn install_tracing_subscriber() {
    use tracing_subscriber::layer::SubscriberExt as _;
    if let Err(err) = tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish()
            .with(tracing_error::ErrorLayer::default()),
    ) {
        panic!("Failed to install tracing subscriber: {}", err);
    }
}
