//! The caller-supplied diagnostic sink named in §6: a place for the
//! non-fatal conditions in §7 to go without aborting the decode.

/// Receives one-line, free-form diagnostic strings.
pub trait DiagnosticSink {
    fn report(&mut self, message: &str);
}

/// Forwards every line to the `log` crate. Non-fatal error kinds log at
/// `warn!`; debug-mode opcode traces (prefixed with the byte offset by the
/// caller before reaching here) log at `trace!`.
#[derive(Debug, Default)]
pub struct LogDiagnosticSink;

impl DiagnosticSink for LogDiagnosticSink {
    fn report(&mut self, message: &str) {
        if message.starts_with("trace:") {
            log::trace!("{message}");
        } else {
            log::warn!("{message}");
        }
    }
}

/// Records every line in memory; used by tests that need to assert on a
/// specific diagnostic (e.g. S6's backpointer mismatch).
#[derive(Debug, Default)]
pub struct VecDiagnosticSink {
    pub lines: Vec<String>,
}

impl DiagnosticSink for VecDiagnosticSink {
    fn report(&mut self, message: &str) {
        self.lines.push(message.to_owned());
    }
}

/// Discards everything; useful when a caller truly does not care.
#[derive(Debug, Default)]
pub struct NullDiagnosticSink;

impl DiagnosticSink for NullDiagnosticSink {
    fn report(&mut self, _message: &str) {}
}
