//! Logging context for one bridge process.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrome_debug_adapter::DiagnosticHook;
use tracing::subscriber::DefaultGuard;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Extra directives applied while a session asked for diagnostic logging.
const DIAGNOSTIC_DIRECTIVES: &str =
    "debug-adapter=trace,adapter-proxy=trace,breakpoints=trace,cdp-connection=trace,dap-server=debug";

/// Owns the process subscriber. It is the thread default for as long as this value
/// lives, which covers every task on the single-threaded runtime.
pub struct Logging {
    filter: reload::Handle<EnvFilter, Registry>,
    base: String,
    _default: DefaultGuard,
    _flush: Option<WorkerGuard>,
}

impl Logging {
    /// `RUST_LOG` wins over `level` when set.
    pub fn install(level: &str, log_file: Option<&Path>) -> Result<Self> {
        let base = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
        let filter = EnvFilter::try_new(&base).context("Invalid log level")?;
        let (filter_layer, handle) = reload::Layer::new(filter);

        let (writer, flush, ansi) = match log_file {
            Some(path) => {
                let directory = path
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .context("Log file path has no file name")?;
                let appender = tracing_appender::rolling::never(directory, file_name);
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                (BoxMakeWriter::new(non_blocking), Some(guard), false)
            }
            None => (BoxMakeWriter::new(std::io::stderr), None, true),
        };

        let subscriber = tracing_subscriber::registry().with(filter_layer).with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true),
        );
        let default = tracing::subscriber::set_default(subscriber);

        Ok(Self {
            filter: handle,
            base,
            _default: default,
            _flush: flush,
        })
    }

    pub fn set_diagnostic(&self, verbose: bool) {
        apply_verbosity(&self.filter, &self.base, verbose);
    }

    /// Hook the session calls on attach with the client's diagnostic setting.
    pub fn diagnostic_hook(&self) -> DiagnosticHook {
        let filter = self.filter.clone();
        let base = self.base.clone();
        Arc::new(move |verbose| apply_verbosity(&filter, &base, verbose))
    }
}

fn filter_directives(base: &str, verbose: bool) -> String {
    if verbose {
        format!("{base},{DIAGNOSTIC_DIRECTIVES}")
    } else {
        base.to_string()
    }
}

fn apply_verbosity(filter: &reload::Handle<EnvFilter, Registry>, base: &str, verbose: bool) {
    let directives = filter_directives(base, verbose);
    let result = EnvFilter::try_new(&directives)
        .map_err(|err| err.to_string())
        .and_then(|next| filter.reload(next).map_err(|err| err.to_string()));
    if let Err(err) = result {
        warn!(target: "dap-server", %directives, %err, "failed to change log verbosity");
    }
}
