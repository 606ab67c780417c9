//! Waits for a freshly started server to accept connections.
//!
//! The poller is generic over its probe and its sleep so the retry budget can
//! be exercised without a server or a clock.

use std::num::NonZeroU32;
use std::time::Duration;

use color_eyre::eyre::eyre;
use tracing::{debug, info, info_span};

use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::observability::LOG_TARGET;
use crate::settings::InstanceConfig;

/// Progress of a [`ReadinessPoller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    /// Probes are still being attempted.
    Probing {
        /// Probes made so far.
        attempts: u32,
    },
    /// A probe succeeded.
    Ready {
        /// Probes made, including the successful one.
        attempts: u32,
    },
    /// Every probe failed.
    TimedOut {
        /// Output of the last failed probe.
        last_output: String,
    },
}

/// Outcome of one readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The server accepted the connection.
    Ready,
    /// The server refused; carries the probe's output for diagnostics.
    NotReady(String),
}

const DEFAULT_MAX_ATTEMPTS: NonZeroU32 = match NonZeroU32::new(10) {
    Some(attempts) => attempts,
    None => NonZeroU32::MIN,
};
const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Bounded retry loop around a readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPoller {
    max_attempts: NonZeroU32,
    delay: Duration,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}

impl ReadinessPoller {
    /// Creates a poller making at most `max_attempts` probes.
    #[must_use]
    pub const fn new(max_attempts: NonZeroU32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Uses the budget configured for `cfg`.
    #[must_use]
    pub fn for_config(cfg: &InstanceConfig) -> Self {
        Self::new(cfg.startup_attempts(), cfg.startup_delay())
    }

    /// Maximum number of probes.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    /// Pause between failed probes.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Probes until ready or the budget is spent.
    ///
    /// A probe that succeeds on attempt `k` yields [`ReadinessState::Ready`]
    /// after `k` probes and `k - 1` sleeps. When every attempt fails the
    /// result is [`ReadinessState::TimedOut`] after exactly `max_attempts`
    /// probes; no sleep follows the last one.
    ///
    /// # Examples
    /// ```
    /// use std::num::NonZeroU32;
    /// use std::time::Duration;
    /// use pg_provision::readiness::{ProbeResult, ReadinessPoller, ReadinessState};
    ///
    /// let attempts = NonZeroU32::new(5).ok_or("zero attempts")?;
    /// let poller = ReadinessPoller::new(attempts, Duration::from_millis(10));
    /// let mut calls = 0;
    /// let mut slept = Vec::new();
    /// let state = poller.poll(
    ///     || {
    ///         calls += 1;
    ///         if calls == 3 { ProbeResult::Ready } else { ProbeResult::NotReady(String::new()) }
    ///     },
    ///     |pause| slept.push(pause),
    /// );
    /// assert_eq!(state, ReadinessState::Ready { attempts: 3 });
    /// assert_eq!(slept.len(), 2);
    /// # Ok::<(), &'static str>(())
    /// ```
    #[must_use]
    pub fn poll<P, S>(&self, mut probe: P, mut sleep: S) -> ReadinessState
    where
        P: FnMut() -> ProbeResult,
        S: FnMut(Duration),
    {
        let mut state = ReadinessState::Probing { attempts: 0 };
        loop {
            state = match state {
                ReadinessState::Probing { attempts } => {
                    let attempt = attempts.saturating_add(1);
                    match probe() {
                        ProbeResult::Ready => ReadinessState::Ready { attempts: attempt },
                        ProbeResult::NotReady(last_output) if attempt >= self.max_attempts.get() => {
                            ReadinessState::TimedOut { last_output }
                        }
                        ProbeResult::NotReady(_) => {
                            debug!(target: LOG_TARGET, attempt, "server not ready yet");
                            sleep(self.delay);
                            ReadinessState::Probing { attempts: attempt }
                        }
                    }
                }
                done @ (ReadinessState::Ready { .. } | ReadinessState::TimedOut { .. }) => {
                    return done;
                }
            };
        }
    }
}

/// Blocks until the server answers `psql -l` or the startup budget is spent.
///
/// # Errors
/// Returns a [`ProvisionErrorKind::ReadinessTimeout`] error carrying the last
/// probe's output when the server never becomes ready. A probe that cannot be
/// run at all counts as a failed attempt and its spawn error is the output.
pub fn wait_until_ready(cfg: &InstanceConfig, runner: &dyn CommandRunner) -> ProvisionResult<u32> {
    let poller = ReadinessPoller::for_config(cfg);
    let _span = info_span!(
        target: LOG_TARGET,
        "wait_until_ready",
        max_attempts = poller.max_attempts()
    )
    .entered();
    info!(target: LOG_TARGET, "waiting for the database to start");

    let probe_invocation = probe(cfg);
    let state = poller.poll(
        || match runner.run(&probe_invocation) {
            Ok(output) => classify(&output),
            Err(err) => ProbeResult::NotReady(format!("{err:#}")),
        },
        std::thread::sleep,
    );

    match state {
        ReadinessState::Ready { attempts } => {
            info!(target: LOG_TARGET, attempts, "database is accepting connections");
            Ok(attempts)
        }
        ReadinessState::TimedOut { last_output } => Err(ProvisionError::new(
            ProvisionErrorKind::ReadinessTimeout,
            eyre!("unable to communicate with PostgreSQL:\n{last_output}"),
        )),
        ReadinessState::Probing { attempts } => Err(ProvisionError::new(
            ProvisionErrorKind::ReadinessTimeout,
            eyre!("readiness polling stopped after {attempts} attempts"),
        )),
    }
}

fn probe(cfg: &InstanceConfig) -> Invocation {
    Invocation::new(cfg.binary("psql"))
        .args(["-h", cfg.socket_dir().as_str()])
        .args(["-p".to_owned(), cfg.port().to_string()])
        .args(["-U", cfg.admin(), "-l"])
        .capture_output()
}

fn classify(output: &CommandOutput) -> ProbeResult {
    if output.success() {
        ProbeResult::Ready
    } else {
        ProbeResult::NotReady(output.combined())
    }
}
