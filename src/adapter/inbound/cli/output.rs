//! Terminal and JSON rendering for deployment commands.
//!
//! Handlers receive an [`Output`] built once from the global flags. In JSON
//! mode every call emits one `{"type": ..., "payload": ...}` line; in quiet
//! mode only warnings, errors and final reports are printed.

use std::fmt::Display;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde_json::{json, Value};
use tabled::{Table, Tabled};

use crate::application::watcher::{LogOutcome, Observation, ReadinessOutcome};
use crate::domain::record::DeploymentRecord;

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// How command results are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Output {
    json: bool,
    quiet: bool,
}

/// One row of `deployment list`.
#[derive(Tabled)]
struct DeploymentRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Tag")]
    tag: String,
    #[tabled(rename = "Node")]
    node: String,
}

impl From<&DeploymentRecord> for DeploymentRow {
    fn from(record: &DeploymentRecord) -> Self {
        Self {
            name: record.name.to_string(),
            image: format!("{}/{}", record.image.registry, record.image.repository),
            tag: record.image.tag.to_string(),
            node: record.node.clone(),
        }
    }
}

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Good,
    Bad,
    Info,
}

/// Readiness as a status line, or nothing when it was not waited for.
fn readiness_status(readiness: &ReadinessOutcome) -> Option<(Status, String)> {
    match readiness {
        ReadinessOutcome::Ready => Some((Status::Good, "pods ready".to_string())),
        ReadinessOutcome::TimedOut => {
            Some((Status::Bad, "pods did not become ready in time".to_string()))
        }
        ReadinessOutcome::Failed(reason) => {
            Some((Status::Bad, format!("could not wait for readiness: {reason}")))
        }
        ReadinessOutcome::Skipped => None,
    }
}

fn log_status(logs: &LogOutcome) -> (Status, String) {
    match logs {
        LogOutcome::Completed { lines } => (Status::Info, format!("{lines} log lines, streams ended")),
        LogOutcome::TimedOut { lines } => (Status::Info, format!("{lines} log lines")),
        LogOutcome::Failed { lines, reason } => (
            Status::Bad,
            format!("log stream failed after {lines} lines: {reason}"),
        ),
        LogOutcome::NoPods => (Status::Bad, "no pods found".to_string()),
    }
}

impl Output {
    #[must_use]
    pub const fn new(json: bool, quiet: bool) -> Self {
        Self { json, quiet }
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        self.json
    }

    fn text(self) -> bool {
        !self.json && !self.quiet
    }

    fn event(self, kind: &str, payload: Value) {
        println!("{}", json!({ "type": kind, "payload": payload }));
    }

    /// Tool name, version and the environment being operated on.
    pub fn header(self, environment: &str) {
        let version = env!("CARGO_PKG_VERSION");
        if self.json {
            self.event("header", json!({ "version": version, "environment": environment }));
        } else if self.text() {
            println!(
                "{} {} {}\n",
                "uc-deploy".bold(),
                version.dimmed(),
                format!("({environment})").dimmed()
            );
        }
    }

    pub fn section(self, title: &str) {
        if self.text() {
            println!("\n{}", title.bold());
        }
    }

    pub fn field(self, label: &str, value: impl Display) {
        if self.json {
            self.event("field", json!({ "label": label, "value": value.to_string() }));
        } else if self.text() {
            println!("  {:<14} {value}", label.dimmed());
        }
    }

    /// A finished step, e.g. "Deleted feature-x".
    pub fn done(self, message: &str) {
        self.status(Status::Good, message);
    }

    /// Shown in quiet mode too.
    pub fn warning(self, message: &str) {
        self.status(Status::Bad, message);
    }

    pub fn note(self, message: &str) {
        self.status(Status::Info, message);
    }

    fn status(self, status: Status, message: &str) {
        if self.json {
            let kind = match status {
                Status::Good => "done",
                Status::Bad => "warning",
                Status::Info => "note",
            };
            self.event(kind, json!({ "message": message }));
            return;
        }
        match status {
            Status::Good if self.text() => println!("  {} {message}", "✓".green()),
            Status::Bad => println!("  {} {message}", "⚠".yellow()),
            Status::Info if self.text() => println!("  {}", message.dimmed()),
            Status::Good | Status::Info => {}
        }
    }

    /// Printed to stderr in every mode.
    pub fn error(self, message: &str) {
        if self.json {
            eprintln!("{}", json!({ "type": "error", "payload": { "message": message } }));
        } else {
            eprintln!("  {} {message}", "×".red());
        }
    }

    /// One line of a pod's log.
    pub fn log_line(self, pod: &str, line: &str) {
        if self.json {
            self.event("log", json!({ "pod": pod, "line": line }));
        } else if self.text() {
            println!("  {} {} {line}", pod.dimmed(), "│".dimmed());
        }
    }

    /// The registered deployments as a table.
    pub fn deployments(self, records: &[DeploymentRecord]) {
        if self.json {
            self.report(json!({ "command": "deployment.list", "deployments": records }));
            return;
        }
        if records.is_empty() {
            self.note("No user-code deployments are active.");
            return;
        }
        let table = Table::new(records.iter().map(DeploymentRow::from)).to_string();
        for line in table.lines() {
            println!("  {line}");
        }
    }

    /// Readiness and log outcome of a watched deployment.
    pub fn observation(self, observation: &Observation) {
        if self.json {
            let readiness = readiness_status(&observation.readiness).map(|(_, text)| text);
            self.event(
                "observation",
                json!({
                    "pods": observation.pods,
                    "ready": observation.readiness == ReadinessOutcome::Ready,
                    "readiness": readiness,
                    "logs": log_status(&observation.logs).1,
                }),
            );
            return;
        }
        if let Some((status, text)) = readiness_status(&observation.readiness) {
            self.status(status, &text);
        }
        self.logs(&observation.logs);
    }

    pub fn logs(self, logs: &LogOutcome) {
        let (status, text) = log_status(logs);
        self.status(status, &text);
    }

    /// Highlight a value inside human output.
    #[must_use]
    pub fn highlight(self, value: impl Display) -> String {
        if self.json {
            value.to_string()
        } else {
            value.cyan().to_string()
        }
    }

    /// The final JSON document of a command. Ignored outside JSON mode.
    pub fn report(self, value: Value) {
        if self.json {
            println!("{value}");
        }
    }

    /// Start a spinner; hidden in JSON and quiet mode.
    #[must_use]
    pub fn progress(self, message: &str) -> Progress {
        let bar = if self.text() {
            let style = ProgressStyle::default_spinner()
                .tick_strings(SPINNER_FRAMES)
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            let bar = ProgressBar::new_spinner().with_style(style);
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(message.to_string());
        Progress { bar, out: self }
    }
}

/// A running spinner.
pub struct Progress {
    bar: ProgressBar,
    out: Output,
}

impl Progress {
    pub fn finish(self, message: &str) {
        self.bar.finish_and_clear();
        self.out.done(message);
    }

    pub fn fail(self, message: &str) {
        self.bar.finish_and_clear();
        self.out.warning(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::domain::record;

    #[test]
    fn row_splits_image_and_tag() {
        let row = DeploymentRow::from(&record("feature-x", "abc123"));
        assert_eq!(row.name, "feature-x");
        assert_eq!(row.image, "registry.example.com/dagster/feature-x");
        assert_eq!(row.tag, "abc123");
        assert_eq!(row.node, "userpool");
    }

    #[test]
    fn skipped_readiness_prints_nothing() {
        assert!(readiness_status(&ReadinessOutcome::Skipped).is_none());
        assert_eq!(
            readiness_status(&ReadinessOutcome::TimedOut).map(|(s, _)| s),
            Some(Status::Bad)
        );
    }

    #[test]
    fn log_failures_are_warnings() {
        let (status, text) = log_status(&LogOutcome::Failed {
            lines: 3,
            reason: "stream reset".into(),
        });
        assert_eq!(status, Status::Bad);
        assert!(text.contains("3 lines"));
        assert!(text.contains("stream reset"));
        assert_eq!(log_status(&LogOutcome::TimedOut { lines: 7 }).0, Status::Info);
    }

    #[test]
    fn highlight_is_plain_in_json_mode() {
        assert_eq!(Output::new(true, false).highlight("feature-x"), "feature-x");
    }
}
