use std::{
    path::{Path, PathBuf},
    time::Duration,
};

const CONFIG_DEFAULT_NAME: &'static str = "ImageLoader.toml";

#[derive(Clone, Debug, serde::Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_network_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            timeout_ms: default_network_timeout(),
            user_agent: default_user_agent(),
            max_body_size: default_max_body_size(),
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Config {
    /// Number of worker threads of the owned runtime.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,

    /// Root of the bundled asset store served by `file` scheme.
    /// Local file-system is used when unset.
    #[serde(default)]
    pub assets: Option<Box<Path>>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default = "default_svg_scale")]
    pub svg_scale: f32,

    #[serde(default = "default_autoplay_gif")]
    pub autoplay_gif: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            worker_threads: default_worker_threads(),
            thread_name: default_thread_name(),
            shutdown_timeout_ms: default_shutdown_timeout(),
            assets: None,
            network: NetworkConfig::default(),
            svg_scale: default_svg_scale(),
            autoplay_gif: default_autoplay_gif(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        load_config(path)
    }

    pub fn load_default() -> Self {
        load_default_config()
    }

    pub fn parse(text: &str) -> eyre::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

fn default_thread_name() -> String {
    "md-image-loader".to_owned()
}

fn default_shutdown_timeout() -> u64 {
    5000
}

fn default_network_timeout() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned()
}

fn default_max_body_size() -> u64 {
    50 * 1024 * 1024
}

fn default_svg_scale() -> f32 {
    1.0
}

fn default_autoplay_gif() -> bool {
    true
}

#[tracing::instrument]
fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)?;
    let mut cfg = Config::parse(&text)?;

    if let Some(assets) = &cfg.assets {
        let assets = match path.parent() {
            Some(cfg_dir) if assets.is_relative() => cfg_dir.join(assets),
            _ => assets.to_path_buf(),
        };

        let assets = dunce::canonicalize(&assets).unwrap_or(assets);
        cfg.assets = Some(assets.into_boxed_path());
    }

    Ok(cfg)
}

fn try_load_default_config() -> eyre::Result<Config> {
    tracing::debug!("Loading config");

    match lookup_relpath(Path::new(CONFIG_DEFAULT_NAME)) {
        Some(path) => load_config(&path),
        None => Err(eyre::eyre!("Failed to locate config file")),
    }
}

fn load_default_config() -> Config {
    match try_load_default_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::debug!("Config file not loaded. {:#}", err);
            Config::default()
        }
    }
}

fn lookup_in_current_dir(relpath: &Path) -> Option<PathBuf> {
    let cd = std::env::current_dir().ok()?;

    for dir in cd.ancestors() {
        let candidate = dir.join(relpath);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn lookup_in_binary_dir(relpath: &Path) -> Option<PathBuf> {
    let ce = std::env::current_exe().ok()?;

    let mut ancestors = ce.ancestors();
    ancestors.next();

    for dir in ancestors {
        let candidate = dir.join(relpath);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn lookup_relpath(relpath: &Path) -> Option<PathBuf> {
    lookup_in_current_dir(relpath).or_else(|| lookup_in_binary_dir(relpath))
}
