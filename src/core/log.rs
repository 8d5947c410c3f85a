//! Leveled logging capability handed to the client. The default
//! implementation forwards to `tracing`; a no-op implementation is
//! available for callers that want silence without a subscriber.

use std::fmt::Display;

/// A structured context entry attached to a log line.
pub type Field<'a> = (&'a str, &'a dyn Display);

/// Best-effort leveled logger with a structured context bag. `notice`
/// sits between `info` and `error` for events an operator should see by
/// default.
pub trait Logger {
    fn debug(&self, message: &str, fields: &[Field<'_>]);
    fn info(&self, message: &str, fields: &[Field<'_>]);
    fn notice(&self, message: &str, fields: &[Field<'_>]);
    fn error(&self, message: &str, fields: &[Field<'_>]);
}

fn render(fields: &[Field<'_>]) -> String {
    let mut out = String::new();
    for (key, value) in fields {
        out.push(' ');
        out.push_str(key);
        out.push('=');
        out.push_str(&value.to_string());
    }
    out
}

/// Forwards to the `tracing` macros under the `photon` target. `notice`
/// maps onto the info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str, fields: &[Field<'_>]) {
        tracing::debug!(target: "photon", "{}{}", message, render(fields));
    }

    fn info(&self, message: &str, fields: &[Field<'_>]) {
        tracing::info!(target: "photon", "{}{}", message, render(fields));
    }

    fn notice(&self, message: &str, fields: &[Field<'_>]) {
        tracing::info!(target: "photon", "{}{}", message, render(fields));
    }

    fn error(&self, message: &str, fields: &[Field<'_>]) {
        tracing::error!(target: "photon", "{}{}", message, render(fields));
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _message: &str, _fields: &[Field<'_>]) {}
    fn info(&self, _message: &str, _fields: &[Field<'_>]) {}
    fn notice(&self, _message: &str, _fields: &[Field<'_>]) {}
    fn error(&self, _message: &str, _fields: &[Field<'_>]) {}
}
