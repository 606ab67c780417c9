//! Provisions a local PostgreSQL instance from the command line.
//!
//! See [`pg_provision::cli`] for the accepted flags and how options are
//! merged. The binary exits with status code `0` on success and `1` on error.

fn main() -> color_eyre::eyre::Result<()> {
    pg_provision::cli::run()
}
