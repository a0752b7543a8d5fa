//! Terminal Rendering

use std::io::{self, Write};

use agent_core::{FinalizedMessage, InFlightMessage, ToolInvocation};

/// Writes the reply as it grows, then a summary of reasoning and tool calls
pub struct Renderer<W: Write> {
    out: W,

    /// Bytes of `content` already written
    written: usize,
}

impl Renderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Renderer<W> {
    pub const fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Write whatever content arrived since the last update
    pub fn update(&mut self, message: &InFlightMessage) -> io::Result<()> {
        if let Some(delta) = message.content.get(self.written..) {
            if !delta.is_empty() {
                self.out.write_all(delta.as_bytes())?;
                self.out.flush()?;
                self.written = message.content.len();
            }
        }
        Ok(())
    }

    /// Complete the content and append reasoning and tool calls
    pub fn finish(&mut self, message: &FinalizedMessage) -> io::Result<()> {
        if let Some(rest) = message.content.get(self.written..) {
            self.out.write_all(rest.as_bytes())?;
        }
        self.written = message.content.len();
        writeln!(self.out)?;

        if !message.reasoning.is_empty() {
            writeln!(self.out, "\n[reasoning]\n{}", message.reasoning)?;
        }
        for call in message.tools.iter() {
            write_tool(&mut self.out, call)?;
        }
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

fn write_tool(out: &mut impl Write, call: &ToolInvocation) -> io::Result<()> {
    let name = if call.name.is_empty() { "<unnamed>" } else { &call.name };
    writeln!(out, "\n[tool {name} #{}]", call.id)?;
    writeln!(out, "  arguments: {}", call.arguments)?;
    match &call.result {
        Some(result) => writeln!(out, "  result: {result}"),
        None => writeln!(out, "  result: (pending)"),
    }
}
