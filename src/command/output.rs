//! Output truncation and failure rendering for captured subprocess output.

use color_eyre::eyre::{Report, eyre};

use super::CommandOutput;

pub(crate) const OUTPUT_CHAR_LIMIT: usize = 2_048;
pub(crate) const TRUNCATION_SUFFIX: &str = "… [truncated]";

/// Builds a report naming `context` with the child's exit code and truncated output.
pub(crate) fn render_failure(context: &str, output: &CommandOutput) -> Report {
    let stdout = truncate_output(&output.stdout);
    let stderr = truncate_output(&output.stderr);
    let code = output
        .exit_code
        .map_or_else(|| "signal".to_owned(), |code| code.to_string());
    eyre!("{context} (exit: {code})\nstdout: {stdout}\nstderr: {stderr}")
}

pub(crate) fn truncate_output(text: &str) -> String {
    let mut out = String::with_capacity(OUTPUT_CHAR_LIMIT + TRUNCATION_SUFFIX.len());
    let mut chars = text.chars();
    for _ in 0..OUTPUT_CHAR_LIMIT {
        match chars.next() {
            Some(ch) => out.push(ch),
            None => return text.to_owned(),
        }
    }

    if chars.next().is_none() {
        return text.to_owned();
    }

    out.push_str(TRUNCATION_SUFFIX);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_is_returned_verbatim() {
        assert_eq!(truncate_output("ready"), "ready");
    }

    #[test]
    fn long_output_is_truncated_with_suffix() {
        let text = "x".repeat(OUTPUT_CHAR_LIMIT + 10);
        let truncated = truncate_output(&text);
        assert!(truncated.ends_with(TRUNCATION_SUFFIX));
        assert_eq!(
            truncated.chars().count(),
            OUTPUT_CHAR_LIMIT + TRUNCATION_SUFFIX.chars().count()
        );
    }

    #[test]
    fn render_failure_mentions_exit_code_and_streams() {
        let output = CommandOutput::new(Some(2), "out", "err");
        let message = render_failure("initdb failed", &output).to_string();
        assert!(message.contains("initdb failed (exit: 2)"));
        assert!(message.contains("stdout: out"));
        assert!(message.contains("stderr: err"));
    }
}
