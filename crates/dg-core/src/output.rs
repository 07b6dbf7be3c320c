//! Console output for `dgchat`.
//!
//! The reply text goes to one writer (stdout) as it streams in. Status lines
//! go to another (stderr) with a `[dg]` prefix so the reply stays pipeable.

use std::fmt::Display;
use std::io::Write;

use dg_protocol::Message;

const PREFIX: &str = "[dg]";

pub struct ReplyPrinter<O: Write, E: Write> {
    out: O,
    err: E,
    /// Bytes of the current reply already written to `out`.
    printed: usize,
}

impl<O: Write, E: Write> ReplyPrinter<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            printed: 0,
        }
    }

    /// Write whatever part of `partial` has not been printed yet.
    pub fn update(&mut self, partial: &str) {
        self.write_tail(partial);
    }

    /// Print the rest of the finished reply and its agent metadata.
    pub fn finish(&mut self, message: &Message) {
        self.write_tail(&message.content);
        self.end_line();
        let status = match &message.mode {
            Some(mode) => format!("{PREFIX} {} ({mode})", message.agent_type),
            None => format!("{PREFIX} {}", message.agent_type),
        };
        let _ = writeln!(self.err, "{status}");
    }

    pub fn error(&mut self, error: &dyn Display) {
        self.end_line();
        let _ = writeln!(self.err, "{PREFIX} error: {error}");
    }

    pub fn cancelled(&mut self) {
        self.end_line();
        let _ = writeln!(self.err, "{PREFIX} cancelled");
    }

    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }

    fn write_tail(&mut self, content: &str) {
        let Some(tail) = content.get(self.printed..) else {
            return;
        };
        if tail.is_empty() {
            return;
        }
        let _ = self.out.write_all(tail.as_bytes());
        let _ = self.out.flush();
        self.printed = content.len();
    }

    fn end_line(&mut self) {
        if self.printed > 0 {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
        }
        self.printed = 0;
    }
}
