use std::fmt;

/// Append-only collector of warnings and errors produced while loading a debug file.
///
/// Messages are never removed; the log is consumed once, by value, when the run ends.
#[derive(Debug, Default)]
pub struct DiagnosticsLog {
    messages: Vec<String>,
}

impl DiagnosticsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "symbridge::diagnostics", %message, "diagnostic recorded");
        self.messages.push(message);
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

impl fmt::Display for DiagnosticsLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in &self.messages {
            writeln!(f, "{message}")?;
        }
        Ok(())
    }
}
