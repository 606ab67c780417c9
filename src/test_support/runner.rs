//! Command runners that never spawn processes.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use camino::Utf8PathBuf;

use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::error::ProvisionResult;
use crate::finalize::{FIELD_SEPARATOR, RECORD_SEPARATOR, SETTINGS_QUERY};
use crate::fs::write_file;

type Responder = Box<dyn Fn(&Invocation) -> CommandOutput + Send + Sync>;

/// Records every invocation and answers with a caller-supplied responder.
pub struct RecordingRunner {
    responder: Responder,
    calls: Mutex<Vec<Invocation>>,
}

impl fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingRunner")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl RecordingRunner {
    /// Answers every invocation with `responder`.
    #[must_use]
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Invocation) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every invocation with a successful, silent exit.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::new(|_| CommandOutput::ok())
    }

    /// Invocations received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Invocations whose program file name is `name`.
    #[must_use]
    pub fn calls_to(&self, name: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|invocation| invocation.program_name() == name)
            .collect()
    }

    /// Forgets the recorded invocations.
    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> ProvisionResult<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        Ok((self.responder)(invocation))
    }
}

/// `pg_settings` rows returned by [`simulated_postgres`].
pub const SIMULATED_SETTINGS: [[&str; 4]; 3] = [
    [
        "lc_messages",
        "",
        "Client Connection Defaults / Locale and Formatting",
        "Sets the language in which messages are displayed.",
    ],
    [
        "port",
        "5432",
        "Connections and Authentication / Connection Settings",
        "Sets the TCP port the server listens on.",
    ],
    [
        "work_mem",
        "4MB",
        "Resource Usage / Memory",
        "Sets the maximum memory to be used for query workspaces.",
    ],
];

/// Formats `rows` the way `psql` prints the settings query: separator-joined
/// fields, separator-terminated rows and a final newline.
#[must_use]
pub fn settings_output(rows: &[[&str; 4]]) -> String {
    let mut out: String = rows
        .iter()
        .map(|row| format!("{}{RECORD_SEPARATOR}", row.join(&FIELD_SEPARATOR.to_string())))
        .collect();
    out.push('\n');
    out
}

/// Runner that behaves like a healthy PostgreSQL installation.
///
/// `initdb` populates the data directory with a `PG_VERSION` file, the
/// settings query returns [`SIMULATED_SETTINGS`], and every other command
/// succeeds silently.
#[must_use]
pub fn simulated_postgres() -> RecordingRunner {
    RecordingRunner::new(simulated_response)
}

/// Answer [`simulated_postgres`] gives to `invocation`.
///
/// Custom responders delegate here for the commands they do not override.
#[must_use]
pub fn simulated_response(invocation: &Invocation) -> CommandOutput {
    match invocation.program_name() {
        "initdb" => simulate_initdb(invocation),
        "psql" if invocation.arguments().iter().any(|arg| arg == SETTINGS_QUERY) => {
            CommandOutput::new(Some(0), settings_output(&SIMULATED_SETTINGS), "")
        }
        _ => CommandOutput::ok(),
    }
}

fn simulate_initdb(invocation: &Invocation) -> CommandOutput {
    let data_dir = invocation
        .arguments()
        .iter()
        .skip_while(|arg| arg.as_str() != "-D")
        .nth(1)
        .map(Utf8PathBuf::from);
    let Some(dir) = data_dir else {
        return CommandOutput::new(Some(1), "", "initdb: no data directory specified");
    };
    match write_file(&dir.join("PG_VERSION"), "16\n", 0o600) {
        Ok(()) => CommandOutput::ok(),
        Err(err) => CommandOutput::new(Some(1), "", err.to_string()),
    }
}
