use chrono::Local;
use eyre::Result;
use fern::Dispatch;
use log::LevelFilter;

/// Sets up the console logger used by the searcher.
///
/// The level comes from `RUST_LOG` (a single level such as `debug`), falling
/// back to `info`. Transport crates are capped at `warn` so block-by-block
/// output stays readable.
///
/// # Errors
/// * If a global logger has already been installed
pub fn setup_logger() -> Result<()> {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(LevelFilter::Info);

    Dispatch::new()
        .level(level)
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("alloy_transport_ws", LevelFilter::Warn)
        .level_for("alloy_pubsub", LevelFilter::Warn)
        .chain(std::io::stdout())
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ));
        })
        .apply()?;
    Ok(())
}
