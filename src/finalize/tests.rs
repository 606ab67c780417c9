//! Unit tests for the configuration finaliser.

use camino::Utf8Path;
use rstest::rstest;

use super::*;
use crate::command::{CommandOutput, MockCommandRunner};
use crate::settings::{OptionMap, RecipeContext};
use crate::test_support::{settings_output, utf8_tempdir};

const SAMPLE_ROWS: [[&str; 4]; 5] = [
    ["autovacuum", "on", "Autovacuum", "Starts the autovacuum subprocess."],
    [
        "lc_messages",
        "",
        "Client Connection Defaults / Locale and Formatting",
        "Sets the language in which messages are displayed.",
    ],
    [
        "log_line_prefix",
        "%m [%p] ",
        "Reporting and Logging / What to Log",
        "Controls information prefixed to each log line.",
    ],
    [
        "transaction_isolation",
        "read committed",
        "Client Connection Defaults / Statement Behavior",
        "Sets the current transaction's isolation level.",
    ],
    [
        "work_mem",
        "4MB",
        "Resource Usage / Memory",
        "Sets the maximum memory to be used for query workspaces.",
    ],
];

fn sample() -> String {
    settings_output(&SAMPLE_ROWS)
}

fn config(parts: &Utf8Path, overrides: &str) -> InstanceConfig {
    let context = RecipeContext::new("postgresql", parts, parts.join("bin"));
    let mut options = OptionMap::new();
    options.insert("postgresql.conf".to_owned(), overrides.to_owned());
    InstanceConfig::resolve(&context, &options).expect("resolve config")
}

/// Value of the last assignment to `name`, as PostgreSQL would read it.
fn effective_value<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    text.lines().rev().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('\''))
    })
}

#[test]
fn pipes_in_values_and_descriptions_are_kept() {
    let output = settings_output(&[[
        "log_line_prefix",
        "%t | %p | ",
        "Reporting and Logging / What to Log",
        "Controls information prefixed to each log line | per session.",
    ]]);
    let rows = parse_settings(&output).expect("parse rows");
    assert_eq!(
        rows,
        [SettingRow {
            name: "log_line_prefix".to_owned(),
            setting: "%t | %p | ".to_owned(),
            category: "Reporting and Logging / What to Log".to_owned(),
            description: "Controls information prefixed to each log line | per session.".to_owned(),
        }]
    );

    let text = render_config(&rows, "");
    assert!(text.contains("log_line_prefix = '%t | %p | '\n"));
    assert_eq!(text.matches("## ").count(), 1, "one category banner expected:\n{text}");
}

#[test]
fn settings_query_requests_unambiguous_separators() {
    let (_temp, root) = utf8_tempdir();
    let cfg = config(&root, "");
    let args = settings_query(&cfg).arguments().to_vec();
    let field = FIELD_SEPARATOR.to_string();
    let record = RECORD_SEPARATOR.to_string();
    assert!(args.windows(2).any(|pair| pair == ["-F", field.as_str()]));
    assert!(args.windows(2).any(|pair| pair == ["-R", record.as_str()]));
}

#[rstest]
#[case::short_row("work_mem\u{1f}4MB\u{1e}\n")]
#[case::extra_field("work_mem\u{1f}4MB\u{1f}Memory\u{1f}Sets work mem.\u{1f}extra\u{1e}\n")]
fn rows_without_four_fields_are_query_errors(#[case] output: &str) {
    let err = parse_settings(output).expect_err("malformed row");
    assert_eq!(err.kind(), ProvisionErrorKind::Query);
    assert!(err.to_string().contains("malformed pg_settings row"));
}

#[test]
fn trailing_newline_and_blank_rows_are_ignored() {
    let rows = parse_settings("\n").expect("empty output");
    assert!(rows.is_empty());
}

#[test]
fn rendered_config_groups_by_category_with_banners() {
    let rows = parse_settings(&sample()).expect("parse sample");
    let text = render_config(&rows, "");

    assert!(text.starts_with("# Default configuration from PostgreSQL\n"));
    assert!(text.contains("\n################\n## Autovacuum ##\n################\n"));
    assert!(text.contains(
        "# Starts the autovacuum subprocess.\nautovacuum = 'on'\n\n"
    ));
    assert!(text.contains("log_line_prefix = '%m [%p] '\n"));
    assert!(text.ends_with("\n\n# Override default values here\n"));
}

#[test]
fn empty_lc_messages_becomes_c() {
    let rows = parse_settings(&sample()).expect("parse sample");
    let text = render_config(&rows, "");
    assert!(text.contains("lc_messages = 'C'\n"));
}

#[rstest]
#[case::transaction_prefix("transaction_isolation")]
#[case::config_file("config_file")]
#[case::role("role")]
fn settings_rejected_in_config_files_are_skipped(#[case] name: &str) {
    let output = settings_output(&[[name, "x", "Misc", "Not allowed here."]]);
    let rows = parse_settings(&output).expect("parse");
    let text = render_config(&rows, "");
    assert!(!text.contains(&format!("{name} =")));
}

#[test]
fn overrides_win_over_server_defaults() {
    let rows = parse_settings(&sample()).expect("parse sample");
    let text = render_config(&rows, "work_mem = 8MB\n");
    assert_eq!(effective_value(&text, "work_mem"), Some("8MB"));
    assert_eq!(effective_value(&text, "autovacuum"), Some("on"));
}

#[test]
fn finalize_writes_the_config_file() {
    let (_temp, root) = utf8_tempdir();
    let cfg = config(&root, "work_mem = 8MB\n");

    let mut runner = MockCommandRunner::new();
    runner
        .expect_run()
        .withf(|inv| {
            inv.program_name() == "psql"
                && inv.arguments().iter().any(|arg| arg == SETTINGS_QUERY)
                && inv.captures_output()
        })
        .times(1)
        .returning(|_| Ok(CommandOutput::new(Some(0), sample(), "")));

    let written = finalize_config(&cfg, &runner).expect("finalize");
    assert_eq!(written, 4);

    let text = std::fs::read_to_string(cfg.postgresql_conf()).expect("read config");
    assert_eq!(effective_value(&text, "work_mem"), Some("8MB"));
    assert!(text.contains("lc_messages = 'C'"));
}

#[rstest]
#[case::non_zero_exit(Some(2), "")]
#[case::stderr_text(Some(0), "WARNING: could not open statistics file")]
fn query_failures_are_fatal(#[case] exit_code: Option<i32>, #[case] stderr: &'static str) {
    let (_temp, root) = utf8_tempdir();
    let cfg = config(&root, "");

    let mut runner = MockCommandRunner::new();
    runner
        .expect_run()
        .returning(move |_| Ok(CommandOutput::new(exit_code, sample(), stderr)));

    let err = finalize_config(&cfg, &runner).expect_err("query failure");
    assert_eq!(err.kind(), ProvisionErrorKind::Query);
    assert!(err.to_string().contains("unable to get settings from PostgreSQL"));
    assert!(!cfg.postgresql_conf().exists());
}

#[test]
fn empty_descriptions_leave_a_bare_comment_marker() {
    let rows = parse_settings(&settings_output(&[["plan_cache_mode", "auto", "Query Tuning", ""]]))
        .expect("parse");
    let text = render_config(&rows, "");
    assert!(text.contains("\n# \nplan_cache_mode = 'auto'\n"), "{text}");
}
