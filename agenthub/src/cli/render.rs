//! Terminal rendering of a session log that is still growing.

use std::io::{self, Write};

use agenthub::models::{Message, MessageRole};

/// Prints a message log incrementally: each call prints only what was
/// added since the previous one, including fragments appended to the
/// reply that is still streaming.
#[derive(Debug, Default)]
pub struct LogPrinter {
    next: usize,
    printed: usize,
}

impl LogPrinter {
    /// Start printing at message index `from`.
    pub const fn starting_at(from: usize) -> Self {
        Self {
            next: from,
            printed: 0,
        }
    }

    pub fn render(&mut self, messages: &[Message], out: &mut impl Write) -> io::Result<()> {
        while let Some(message) = messages.get(self.next) {
            let is_last = self.next + 1 == messages.len();

            if message.role == MessageRole::Assistant && message.is_plain_text() {
                let rest = message.content.get(self.printed..).unwrap_or_default();
                write!(out, "{rest}")?;
                self.printed = message.content.len();
                if is_last {
                    // may still grow
                    break;
                }
                writeln!(out)?;
            } else {
                write_line(message, out)?;
            }

            self.next += 1;
            self.printed = 0;
        }
        out.flush()
    }

    /// Terminate the current line if a reply was being printed.
    pub fn finish(&self, out: &mut impl Write) -> io::Result<()> {
        if self.printed > 0 {
            writeln!(out)?;
        }
        out.flush()
    }
}

/// One complete non-streaming message.
pub fn write_line(message: &Message, out: &mut impl Write) -> io::Result<()> {
    match (message.role, message.message_type) {
        (MessageRole::User, _) => writeln!(out, "> {}", message.content),
        (MessageRole::System, _) => writeln!(out, "! {}", message.content),
        (MessageRole::Assistant, Some(kind)) if !message.is_plain_text() => {
            let task = message.task_name.as_deref().unwrap_or("-");
            if message.content.is_empty() {
                writeln!(out, "  [{kind}] {task}")
            } else {
                writeln!(out, "  [{kind}] {task}: {}", message.content)
            }
        }
        (MessageRole::Assistant, _) => writeln!(out, "{}", message.content),
    }
}
