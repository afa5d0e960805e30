//! Process-wide logger setup.
//!
//! Grounded on `bluetool.__init__`'s `log_to_stream`/`log_to_file`/
//! `log_set_level`: a single logger, initialised once, whose formatter
//! prints the process name, level and message. `env_logger` is the
//! crate-idiomatic equivalent of that formatter/handler pair; `init`/
//! `init_to_file` must be called exactly once, before any worker is
//! spawned, so that every forked child inherits the same configured
//! logger (§9's "global logger" design note — a worker started without
//! `fork` would need to call this itself at start-up instead).

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

fn process_label() -> String {
    std::env::args()
        .next()
        .map(|p| {
            std::path::Path::new(&p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(p)
        })
        .unwrap_or_else(|| "hci-harness".to_string())
}

fn formatter(
    buf: &mut env_logger::fmt::Formatter,
    record: &log::Record,
) -> std::io::Result<()> {
    writeln!(
        buf,
        "{} [{}] ({}/{}) {}",
        buf.timestamp(),
        record.level(),
        process_label(),
        std::process::id(),
        record.args()
    )
}

/// Initialise the default logger, writing to stderr. Defaults to INFO
/// when `RUST_LOG` is unset, matching `log_to_stream` + `log_set_level
/// (logging.INFO)` in the original.
pub fn init() {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        let _ = env_logger::Builder::from_env(env).format(formatter).try_init();
    });
}

/// Initialise the default logger, writing to an opened file instead of
/// stderr — the counterpart of `log_to_file`.
pub fn init_to_file(path: &std::path::Path) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        let _ = env_logger::Builder::from_env(env)
            .format(formatter)
            .target(env_logger::Target::Pipe(Box::new(file)))
            .try_init();
    });
    Ok(())
}
