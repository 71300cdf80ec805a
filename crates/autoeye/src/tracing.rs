//! Logging utilities with AutoEye segment prefixes.
//!
//! Provides consistent logging setup across AutoEye Rust components.

use tracing_subscriber::fmt::format::{Compact, DefaultFields, Format};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with AutoEye defaults.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (RUST_LOG)
/// - Compact format suitable for terminal output, written to stderr so that
///   stdout stays free for report output
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with a custom default filter.
///
/// `RUST_LOG` still wins when it is set.
pub fn init_with_filter(default_filter: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt_layer(std::io::stderr))
        .init();
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Compact formatter writing to `writer`
fn fmt_layer<S, W>(writer: W) -> fmt::Layer<S, DefaultFields, Format<Compact>, W>
where
    W: for<'w> MakeWriter<'w> + 'static,
{
    fmt::layer().compact().with_target(false).with_writer(writer)
}

/// AutoEye segment prefixes for logging.
pub mod prefix {
    /// Cycle pulse (one capture/infer/publish pass)
    pub const PULSE: &str = "꩜";
    /// Graceful startup prefix
    pub const PULSE_OPEN: &str = "✿";
    /// Graceful shutdown prefix
    pub const PULSE_CLOSE: &str = "❀";
    /// Image pipeline operations prefix
    pub const PIPELINE: &str = "⊞";
    /// Report publication prefix
    pub const PUBLISH: &str = "⇪";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn events_go_to_the_layer_writer() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new("info"))
            .with(fmt_layer(move || writer.clone()).with_ansi(false));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("{} cycle loop running", prefix::PULSE);
        });

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("꩜ cycle loop running"));
        assert!(text.contains("INFO"));
    }
}
