use {
    crate::source::{FetchResult, SchemeHandler},
    futures::future::BoxFuture,
    hashbrown::HashMap,
    std::{
        fmt,
        fs::File,
        io::{self, Cursor, Read},
        path::{Component, Path, PathBuf},
        sync::Arc,
    },
    tracing::Instrument as _,
    url::Url,
};

/// Application-bundled read-only asset storage.
pub trait AssetStore: Send + Sync + 'static {
    /// Opens asset with given name.
    /// Names are `/`-separated and relative to the store.
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;
}

/// Assets stored as files under a root directory.
#[derive(Debug)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirAssets { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetStore for DirAssets {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let relative = Path::new(name);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Asset name `{}` escapes asset root", name),
            ));
        }

        let file = File::open(self.root.join(relative))?;
        Ok(Box::new(file))
    }
}

/// Assets compiled into the binary or otherwise held in memory.
#[derive(Default)]
pub struct EmbeddedAssets {
    assets: HashMap<Box<str>, Arc<[u8]>>,
}

impl EmbeddedAssets {
    pub fn new() -> Self {
        EmbeddedAssets::default()
    }

    pub fn insert(&mut self, name: &str, bytes: impl Into<Arc<[u8]>>) -> &mut Self {
        self.assets.insert(name.into(), bytes.into());
        self
    }

    pub fn with(mut self, name: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl AssetStore for EmbeddedAssets {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        match self.assets.get(name) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("Url `{0}` does not denote a local file")]
    NotAFile(Box<str>),

    #[error("Failed to open `{name}`")]
    Open {
        name: Box<str>,
        #[source]
        source: io::Error,
    },

    #[error("File task failed")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
}

/// Handles `file` scheme.
///
/// With an [`AssetStore`] destination path is an asset name (`file:///logo.svg` opens `logo.svg`),
/// without one the path is opened on the local file-system.
/// Last path segment is reported as file name hint.
/// Files are opened on the blocking thread pool.
#[derive(Clone, Default)]
pub struct FileHandler {
    assets: Option<Arc<dyn AssetStore>>,
}

impl fmt::Debug for FileHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandler")
            .field("assets", &self.assets.is_some())
            .finish()
    }
}

impl FileHandler {
    /// Returns handler that reads local file-system.
    pub const fn new() -> Self {
        FileHandler { assets: None }
    }

    /// Returns handler that reads from the asset store.
    pub fn with_assets(assets: impl AssetStore) -> Self {
        FileHandler {
            assets: Some(Arc::new(assets)),
        }
    }
}

impl SchemeHandler for FileHandler {
    type Error = FileError;
    type Fut = BoxFuture<'static, Result<Option<FetchResult>, FileError>>;

    #[tracing::instrument(skip(self, url))]
    fn handle(&self, destination: &str, url: &Url) -> Self::Fut {
        let handler = self.clone();
        let url = url.clone();

        Box::pin(
            async move { tokio::task::spawn_blocking(move || handler.open(&url)).await? }
                .in_current_span(),
        )
    }
}

impl FileHandler {
    fn open(&self, url: &Url) -> Result<Option<FetchResult>, FileError> {
        let file_name = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|segment| {
                percent_encoding::percent_decode_str(segment)
                    .decode_utf8_lossy()
                    .into_owned()
            });

        let file_name = match file_name {
            None => return Ok(None),
            Some(file_name) => file_name,
        };

        let (name, opened) = match &self.assets {
            Some(assets) => {
                let name = percent_encoding::percent_decode_str(url.path())
                    .decode_utf8_lossy()
                    .trim_start_matches('/')
                    .to_owned();
                let opened = assets.open(&name);
                (name, opened)
            }
            None => {
                let path = url
                    .to_file_path()
                    .map_err(|()| FileError::NotAFile(url.as_str().into()))?;
                let opened = File::open(&path).map(|file| Box::new(file) as Box<dyn Read + Send>);
                (path.display().to_string(), opened)
            }
        };

        match opened {
            Ok(stream) => Ok(Some(FetchResult::boxed(stream).with_file_name(file_name))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("`{}` not found", name);
                Ok(None)
            }
            Err(err) => Err(FileError::Open {
                name: name.into(),
                source: err,
            }),
        }
    }
}
