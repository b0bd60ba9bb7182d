use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::LevelFilter;

/// Log to `path`, appending.  The terminal belongs to the panel, so nothing
/// goes to stdout or stderr.
pub fn init_logger(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let mut builder = Builder::from_env(Env::default().default_filter_or("red808_remote=info"));
    builder.filter_module("ureq", LevelFilter::Warn);
    builder.target(Target::Pipe(Box::new(file)));
    builder.format(|buf, record| {
        let module_path = record.module_path().unwrap_or("<unknown>");
        writeln!(buf, "{} [{}][{}] {}", buf.timestamp_millis(), record.level(), module_path, record.args())
    });

    let _ = builder.try_init();
    Ok(())
}

/// One-shot subcommands log to stderr.
pub fn init_stderr_logger() {
    let mut builder = Builder::from_env(Env::default().default_filter_or("red808_remote=warn"));
    builder.filter_module("ureq", LevelFilter::Warn);
    builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));
    let _ = builder.try_init();
}
