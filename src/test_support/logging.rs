//! Captures the recipe's own tracing output for assertions.
//!
//! Only events under the recipe log target are kept, rendered without
//! timestamps or colours, so a test can look for a lifecycle message such as
//! "failed to stop PostgreSQL" without noise from dependencies like `reqwest`.
//! Span fields (the part name, the data directory) stay on each line.

use std::io::{Result as IoResult, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Level;
use tracing::subscriber::with_default;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::observability::LOG_TARGET;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// Runs `action` and returns the recipe's warnings alongside its result.
///
/// # Examples
/// ```
/// use pg_provision::test_support::{
///     RecordingRunner, capture_warn_logs, option_map, sandbox_context, utf8_tempdir,
/// };
/// use pg_provision::{InstanceConfig, create_cluster};
///
/// let (_temp, root) = utf8_tempdir();
/// let cfg = InstanceConfig::resolve(&sandbox_context(&root), &option_map(&[]))?;
/// std::fs::create_dir_all(cfg.data_dir())?;
///
/// let (logs, outcome) = capture_warn_logs(|| create_cluster(&cfg, &RecordingRunner::succeeding()));
/// assert!(outcome.is_ok());
/// assert!(logs.iter().any(|line| line.contains("cluster directory already exists")));
/// # Ok::<(), color_eyre::Report>(())
/// ```
#[must_use]
pub fn capture_warn_logs<F, R>(action: F) -> (Vec<String>, R)
where
    F: FnOnce() -> R,
{
    capture_recipe_logs(Level::WARN, action)
}

/// Runs `action` and returns the recipe's progress messages, `INFO` and above.
#[must_use]
pub fn capture_info_logs<F, R>(action: F) -> (Vec<String>, R)
where
    F: FnOnce() -> R,
{
    capture_recipe_logs(Level::INFO, action)
}

fn capture_recipe_logs<F, R>(level: Level, action: F) -> (Vec<String>, R)
where
    F: FnOnce() -> R,
{
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let directive = format!("{LOG_TARGET}={}", level.as_str().to_ascii_lowercase());
    let subscriber = fmt()
        .with_env_filter(EnvFilter::new(directive))
        .without_time()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let result = with_default(subscriber, action);
    (buffer.lines(), result)
}
