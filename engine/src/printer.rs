//! Output seam for commands that print.
//!
//! Commands never write to stdout directly; they go through the world's
//! printer so tests can capture output and the repl can route it through
//! the logging stack.

use std::sync::Mutex;

use scen_common::Value;

pub trait Printer: Send + Sync {
    fn print_line(&self, line: &str);

    fn print_value(&self, value: &Value) {
        self.print_line(&value.to_string());
    }

    fn print_error(&self, error: &dyn std::fmt::Display) {
        self.print_line(&format!("Error: {}", error));
    }
}

/// Routes script output through the `log` facade.
#[derive(Debug, Default)]
pub struct LogPrinter;

impl Printer for LogPrinter {
    fn print_line(&self, line: &str) {
        log::info!("{}", line);
    }

    fn print_error(&self, error: &dyn std::fmt::Display) {
        log::error!("{}", error);
    }
}

/// Captures lines for assertions in tests.
#[derive(Debug, Default)]
pub struct BufferPrinter {
    lines: Mutex<Vec<String>>,
}

impl BufferPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl Printer for BufferPrinter {
    fn print_line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_owned());
        }
    }
}
