//! Logger setup
//!
//! Plain fern dispatch to stderr; `--verbose` raises the level to debug.

/// Enable the logger
pub fn enable_logger(verbose: bool) {
    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{:<5} [{}] {}",
                record.level(),
                record.target().split("::").next().unwrap_or("anchorage"),
                message
            ))
        })
        .level(match verbose {
            true => log::LevelFilter::Debug,
            false => log::LevelFilter::Info,
        })
        .chain(std::io::stderr())
        .apply();

    // A second apply (e.g. from tests) is harmless.
    if let Err(e) = result {
        eprintln!("logger already initialized: {}", e);
    }
}
