//! Loads destinations given on the command line and prints what was delivered.
//!
//! Usage: `probe [--config <path>] <destination>...`

use {
    eyre::WrapErr as _,
    md_image_loader::{dispatch, AsyncDrawable, Config, Drawable, LoaderBuilder},
    std::{path::PathBuf, time::Duration},
};

fn main() -> eyre::Result<()> {
    md_image_loader::install_eyre_handler();
    md_image_loader::install_tracing_subscriber();

    let mut config_path = None;
    let mut destinations = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args
                .next()
                .ok_or_else(|| eyre::eyre!("`--config` requires a path"))?;
            config_path = Some(PathBuf::from(path));
        } else {
            destinations.push(arg);
        }
    }

    if destinations.is_empty() {
        eyre::bail!("Usage: probe [--config <path>] <destination>...");
    }

    let cfg = match config_path {
        Some(path) => Config::load(&path)
            .wrap_err_with(|| format!("Failed to load config from `{}`", path.display()))?,
        None => Config::load_default(),
    };

    let (dispatcher, queue) = dispatch::main_thread();
    let loader = LoaderBuilder::new(dispatcher)
        .with_config(&cfg)
        .with_error_drawable(Drawable::solid(1, 1, [255, 0, 255, 255]))
        .build()
        .wrap_err("Failed to start loader")?;

    let drawables: Vec<_> = destinations
        .iter()
        .map(|destination| AsyncDrawable::new(destination))
        .collect();

    for drawable in &drawables {
        drawable.attach(&loader);
    }

    let timeout = cfg.network.timeout() + Duration::from_secs(5);
    queue.run_until(timeout, || drawables.iter().all(|d| d.result().is_some()));

    for drawable in &drawables {
        match drawable.result() {
            Some(result) => println!("{}: {:?}", drawable.destination(), result),
            None => println!("{}: nothing delivered", drawable.destination()),
        }
        drawable.detach(&loader);
    }

    loader.shutdown();
    Ok(())
}
