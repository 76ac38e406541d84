//! Console reporting of workflow progress

use console::style;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::module::ModuleResult;

const STATUS_COLUMN: usize = 28;

/// Trait for reporting workflow progress
pub trait WorkflowDisplay: Send + Sync {
    /// Display the banner for a process
    fn process_header(&self, name: &str);

    /// Display the banner for a step
    fn step_header(&self, name: &str);

    /// Display the result of a step, or one loop iteration, on a host
    fn host_result(&self, host: &str, label: Option<&str>, result: &ModuleResult);

    /// Display a warning not tied to a host result
    fn warning(&self, message: &str);
}

/// Kind of a rendered report line, used for styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Skipped,
    Failed,
    Changed,
    Unchanged,
    Error,
    Detail,
    Warning,
    Message,
}

/// Status word for a result
pub fn status(result: &ModuleResult) -> (&'static str, LineKind) {
    if result.failed {
        ("FAILED", LineKind::Failed)
    } else if result.skipped {
        ("SKIPPED", LineKind::Skipped)
    } else if result.changed {
        ("CHANGED", LineKind::Changed)
    } else {
        ("NOT CHANGED", LineKind::Unchanged)
    }
}

/// Render the report lines for one host result
pub fn format_host_result(
    host: &str,
    label: Option<&str>,
    result: &ModuleResult,
) -> Vec<(LineKind, String)> {
    let subject = match label {
        Some(label) => format!("  {host}->{label}:"),
        None => format!("  {host}:"),
    };
    let (word, kind) = status(result);
    let mut lines = vec![(kind, format!("{subject:<STATUS_COLUMN$} {word}"))];

    if result.failed {
        lines.push((
            LineKind::Error,
            format!("    ERROR:   {}", result.error_message()),
        ));
        if let Some(detail) = &result.error_detail {
            for line in detail.lines() {
                lines.push((LineKind::Detail, format!("      DETAIL:  {line}")));
            }
        }
        if result.ignored_failure {
            lines.push((
                LineKind::Warning,
                "    WARNING: failure ignored by continue_on_fail".to_string(),
            ));
        }
    }
    for warning in &result.warnings {
        lines.push((LineKind::Warning, format!("    WARNING: {warning}")));
    }
    for message in &result.messages {
        lines.push((LineKind::Message, format!("    MESSAGE: {message}")));
    }
    lines
}

/// Display that writes styled text to the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDisplay;

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self
    }

    fn styled(kind: LineKind, text: &str) -> String {
        match kind {
            LineKind::Skipped => style(text).cyan().to_string(),
            LineKind::Failed | LineKind::Error => style(text).red().to_string(),
            LineKind::Detail => style(text).red().dim().to_string(),
            LineKind::Changed | LineKind::Warning => style(text).yellow().to_string(),
            LineKind::Unchanged => style(text).green().to_string(),
            LineKind::Message => text.to_string(),
        }
    }
}

impl WorkflowDisplay for ConsoleDisplay {
    fn process_header(&self, name: &str) {
        println!();
        println!("{}", style(format!("PROCESS - {name}")).bold().underlined());
    }

    fn step_header(&self, name: &str) {
        println!();
        println!("{}", style(format!("STEP - {name}")).bold());
    }

    fn host_result(&self, host: &str, label: Option<&str>, result: &ModuleResult) {
        // Lines for one host stay together when hosts finish concurrently.
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for (kind, line) in format_host_result(host, label, result) {
            let _ = writeln!(out, "{}", Self::styled(kind, &line));
        }
    }

    fn warning(&self, message: &str) {
        eprintln!("{}", style(format!("WARNING: {message}")).yellow());
    }
}

/// Display that records plain lines, for tests and benchmarks
#[derive(Debug, Default, Clone)]
pub struct RecordingDisplay {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl WorkflowDisplay for RecordingDisplay {
    fn process_header(&self, name: &str) {
        self.lock().push(format!("PROCESS - {name}"));
    }

    fn step_header(&self, name: &str) {
        self.lock().push(format!("STEP - {name}"));
    }

    fn host_result(&self, host: &str, label: Option<&str>, result: &ModuleResult) {
        let lines = format_host_result(host, label, result);
        self.lock().extend(lines.into_iter().map(|(_, line)| line));
    }

    fn warning(&self, message: &str) {
        self.lock().push(format!("WARNING: {message}"));
    }
}
