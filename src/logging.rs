//! Logging and tracing configuration for ffx-mail
//!
//! Structured diagnostics go through `tracing`; the pipeline's progress
//! lines are printed to stdout separately.
//!
//! # Environment Variable Control
//!
//! Set `RUST_LOG` to control log levels at runtime:
//! ```bash
//! RUST_LOG=debug ffx-mail run disk.E01              # All debug logs
//! RUST_LOG=ffx_mail_lib::store=trace ffx-mail normalize
//! RUST_LOG=forensic_audit=info ffx-mail extract disk.E01  # Audit trail only
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn default_filter() -> EnvFilter {
    // Default: info in release, debug in debug builds
    if cfg!(debug_assertions) {
        EnvFilter::new("ffx_mail=debug,ffx_mail_lib=debug,forensic_audit=info")
    } else {
        EnvFilter::new("ffx_mail=info,ffx_mail_lib=info,forensic_audit=info")
    }
}

/// Initialize the logging/tracing system
///
/// Call this once at startup (in main.rs). Logs go to stderr so they never
/// interleave with the CSV paths printed on stdout.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        );

    // Ignore the error if a subscriber is already set
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Initialize logging with verbose output (file:line, thread IDs)
pub fn init_verbose() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        );

    let _ = tracing::subscriber::set_global_default(subscriber);
}
