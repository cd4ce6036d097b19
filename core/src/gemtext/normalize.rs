//! Canonical gemtext re-serialization.

use std::io::{BufRead, Write};

use super::{parse_lines, Visitor};
use crate::error::GemtextError;
use crate::uri::UriRef;

/// Visitor that writes each event back out as canonical gemtext: one space
/// after every marker, `=> target` or `=> target name` for links, and a bare
/// closing fence.
#[derive(Debug)]
pub struct GmiWriter<W> {
    writer: W,
    pre: bool,
}

impl<W: Write> GmiWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, pre: false }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, marker: &str, text: &str) -> Result<(), GemtextError> {
        writeln!(self.writer, "{marker}{text}")?;
        Ok(())
    }
}

impl<W: Write> Visitor for GmiWriter<W> {
    fn text(&mut self, text: &str) -> Result<(), GemtextError> {
        self.line("", text)
    }

    fn link(&mut self, target: &UriRef, friendly_name: &str) -> Result<(), GemtextError> {
        if friendly_name.is_empty() {
            writeln!(self.writer, "=> {target}")?;
        } else {
            writeln!(self.writer, "=> {target} {friendly_name}")?;
        }
        Ok(())
    }

    fn preformatting_toggle(&mut self, alt_text: &str) -> Result<(), GemtextError> {
        self.pre = !self.pre;
        if self.pre {
            self.line("```", alt_text)
        } else {
            self.line("```", "")
        }
    }

    fn preformatted_text(&mut self, text: &str) -> Result<(), GemtextError> {
        self.line("", text)
    }

    fn heading1(&mut self, text: &str) -> Result<(), GemtextError> {
        self.line("# ", text)
    }

    fn heading2(&mut self, text: &str) -> Result<(), GemtextError> {
        self.line("## ", text)
    }

    fn heading3(&mut self, text: &str) -> Result<(), GemtextError> {
        self.line("### ", text)
    }

    fn unordered_list_item(&mut self, text: &str) -> Result<(), GemtextError> {
        self.line("* ", text)
    }

    fn quote(&mut self, text: &str) -> Result<(), GemtextError> {
        self.line("> ", text)
    }
}

/// Parse gemtext from `reader` and write its canonical form to `writer`.
pub fn normalize<R: BufRead, W: Write>(reader: R, writer: W) -> Result<(), GemtextError> {
    parse_lines(reader, &mut GmiWriter::new(writer))
}
