//! Gemtext parsing and the visitor contract.
//!
//! # Design
//! `parse_lines` makes one forward pass over a line-oriented byte stream and
//! reports each line to a `Visitor` as a structural event. The parser never
//! knows which sink it drives; sinks own all output decisions.
//!
//! Ordering guarantees for a clean run: one `begin`, then one call per line
//! in source order, then one `end`. The first error (from a visitor or from
//! the reader) stops the pass; `end` is only reached at end of stream.

pub mod html;
pub mod normalize;

use std::io::BufRead;

use crate::error::GemtextError;
use crate::uri::UriRef;

pub use html::{gmi_to_html, BlockState, HtmlWriter, UrlRewriter};
pub use normalize::{normalize, GmiWriter};

/// Whitespace trimmed after line markers.
const WS: [char; 2] = [' ', '\t'];

/// Receiver of gemtext structural events.
pub trait Visitor {
    fn begin(&mut self) -> Result<(), GemtextError> {
        Ok(())
    }

    fn end(&mut self) -> Result<(), GemtextError> {
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), GemtextError>;

    /// `friendly_name` is empty when the line names only a target.
    fn link(&mut self, target: &UriRef, friendly_name: &str) -> Result<(), GemtextError>;

    fn preformatting_toggle(&mut self, alt_text: &str) -> Result<(), GemtextError>;

    fn preformatted_text(&mut self, text: &str) -> Result<(), GemtextError>;

    fn heading1(&mut self, text: &str) -> Result<(), GemtextError>;

    fn heading2(&mut self, text: &str) -> Result<(), GemtextError>;

    fn heading3(&mut self, text: &str) -> Result<(), GemtextError>;

    fn unordered_list_item(&mut self, text: &str) -> Result<(), GemtextError>;

    fn quote(&mut self, text: &str) -> Result<(), GemtextError>;
}

impl<V: Visitor + ?Sized> Visitor for &mut V {
    fn begin(&mut self) -> Result<(), GemtextError> {
        (**self).begin()
    }

    fn end(&mut self) -> Result<(), GemtextError> {
        (**self).end()
    }

    fn text(&mut self, text: &str) -> Result<(), GemtextError> {
        (**self).text(text)
    }

    fn link(&mut self, target: &UriRef, friendly_name: &str) -> Result<(), GemtextError> {
        (**self).link(target, friendly_name)
    }

    fn preformatting_toggle(&mut self, alt_text: &str) -> Result<(), GemtextError> {
        (**self).preformatting_toggle(alt_text)
    }

    fn preformatted_text(&mut self, text: &str) -> Result<(), GemtextError> {
        (**self).preformatted_text(text)
    }

    fn heading1(&mut self, text: &str) -> Result<(), GemtextError> {
        (**self).heading1(text)
    }

    fn heading2(&mut self, text: &str) -> Result<(), GemtextError> {
        (**self).heading2(text)
    }

    fn heading3(&mut self, text: &str) -> Result<(), GemtextError> {
        (**self).heading3(text)
    }

    fn unordered_list_item(&mut self, text: &str) -> Result<(), GemtextError> {
        (**self).unordered_list_item(text)
    }

    fn quote(&mut self, text: &str) -> Result<(), GemtextError> {
        (**self).quote(text)
    }
}

/// Parse gemtext from `reader`, reporting each line to `visitor`.
///
/// Lines end at `\n`; a preceding `\r` is dropped too. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn parse_lines<R, V>(mut reader: R, visitor: &mut V) -> Result<(), GemtextError>
where
    R: BufRead,
    V: Visitor + ?Sized,
{
    visitor.begin()?;

    let mut pre = false;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf);
        dispatch(&line, &mut pre, visitor)?;
    }

    visitor.end()
}

fn dispatch<V>(line: &str, pre: &mut bool, visitor: &mut V) -> Result<(), GemtextError>
where
    V: Visitor + ?Sized,
{
    if let Some(alt) = line.strip_prefix("```") {
        *pre = !*pre;
        return visitor.preformatting_toggle(alt);
    }
    if *pre {
        return visitor.preformatted_text(line);
    }

    if let Some(rest) = line.strip_prefix("=>") {
        let rest = rest.trim_start_matches(WS);
        let (target, name) = match rest.find(WS) {
            Some(split) => (&rest[..split], rest[split..].trim_start_matches(WS)),
            None => (rest, ""),
        };
        let target = UriRef::parse(target).map_err(|source| GemtextError::InvalidLink {
            target: target.to_string(),
            source,
        })?;
        return visitor.link(&target, name);
    }
    if let Some(rest) = line.strip_prefix('*') {
        return visitor.unordered_list_item(rest.trim_start_matches(WS));
    }
    if let Some(rest) = line.strip_prefix("###") {
        return visitor.heading3(rest.trim_start_matches(WS));
    }
    if let Some(rest) = line.strip_prefix("##") {
        return visitor.heading2(rest.trim_start_matches(WS));
    }
    if let Some(rest) = line.strip_prefix('#') {
        return visitor.heading1(rest.trim_start_matches(WS));
    }
    if let Some(rest) = line.strip_prefix('>') {
        return visitor.quote(rest.trim_start_matches(WS));
    }
    visitor.text(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, BufReader, Read};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Begin,
        End,
        Text(String),
        Link(String, String),
        Toggle(String),
        Pre(String),
        H1(String),
        H2(String),
        H3(String),
        Item(String),
        Quote(String),
    }

    /// Records every call; fails on the `fail_at`-th event when set.
    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        fail_at: Option<usize>,
    }

    impl Recorder {
        fn push(&mut self, event: Event) -> Result<(), GemtextError> {
            if self.fail_at == Some(self.events.len()) {
                return Err(GemtextError::Rewrite {
                    target: String::new(),
                    message: "stop".to_string(),
                });
            }
            self.events.push(event);
            Ok(())
        }
    }

    impl Visitor for Recorder {
        fn begin(&mut self) -> Result<(), GemtextError> {
            self.push(Event::Begin)
        }
        fn end(&mut self) -> Result<(), GemtextError> {
            self.push(Event::End)
        }
        fn text(&mut self, text: &str) -> Result<(), GemtextError> {
            self.push(Event::Text(text.into()))
        }
        fn link(&mut self, target: &UriRef, name: &str) -> Result<(), GemtextError> {
            self.push(Event::Link(target.to_string(), name.into()))
        }
        fn preformatting_toggle(&mut self, alt: &str) -> Result<(), GemtextError> {
            self.push(Event::Toggle(alt.into()))
        }
        fn preformatted_text(&mut self, text: &str) -> Result<(), GemtextError> {
            self.push(Event::Pre(text.into()))
        }
        fn heading1(&mut self, text: &str) -> Result<(), GemtextError> {
            self.push(Event::H1(text.into()))
        }
        fn heading2(&mut self, text: &str) -> Result<(), GemtextError> {
            self.push(Event::H2(text.into()))
        }
        fn heading3(&mut self, text: &str) -> Result<(), GemtextError> {
            self.push(Event::H3(text.into()))
        }
        fn unordered_list_item(&mut self, text: &str) -> Result<(), GemtextError> {
            self.push(Event::Item(text.into()))
        }
        fn quote(&mut self, text: &str) -> Result<(), GemtextError> {
            self.push(Event::Quote(text.into()))
        }
    }

    fn events(input: &str) -> Vec<Event> {
        let mut rec = Recorder::default();
        parse_lines(input.as_bytes(), &mut rec).unwrap();
        rec.events
    }

    use Event::*;

    #[test]
    fn empty_input_is_begin_then_end() {
        assert_eq!(events(""), vec![Begin, End]);
    }

    #[test]
    fn classifies_every_line_kind() {
        let input = "# One\n## Two\n### Three\n#### Four\n* item\n*tight\n> quoted\n=> a.gmi  A link\n=>\tb.gmi\nplain  \n";
        assert_eq!(
            events(input),
            vec![
                Begin,
                H1("One".into()),
                H2("Two".into()),
                H3("Three".into()),
                H3("# Four".into()),
                Item("item".into()),
                Item("tight".into()),
                Quote("quoted".into()),
                Link("a.gmi".into(), "A link".into()),
                Link("b.gmi".into(), "".into()),
                Text("plain  ".into()),
                End,
            ]
        );
    }

    #[test]
    fn text_lines_are_not_trimmed() {
        assert_eq!(events("  indented\n\n"), vec![Begin, Text("  indented".into()), Text("".into()), End]);
    }

    #[test]
    fn preformatted_lines_are_verbatim() {
        let input = "```rust\n# not a heading\n=> not a link\n```\n# heading\n";
        assert_eq!(
            events(input),
            vec![
                Begin,
                Toggle("rust".into()),
                Pre("# not a heading".into()),
                Pre("=> not a link".into()),
                Toggle("".into()),
                H1("heading".into()),
                End,
            ]
        );
    }

    #[test]
    fn crlf_and_missing_final_newline() {
        assert_eq!(
            events("* a\r\n* b"),
            vec![Begin, Item("a".into()), Item("b".into()), End]
        );
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut rec = Recorder::default();
        parse_lines(&b"caf\xe9\n"[..], &mut rec).unwrap();
        assert_eq!(rec.events[1], Text("caf\u{fffd}".into()));
    }

    #[test]
    fn absolute_link_target() {
        assert_eq!(
            events("=> gemini://example.org/ Home"),
            vec![Begin, Link("gemini://example.org/".into(), "Home".into()), End]
        );
    }

    #[test]
    fn unparseable_link_aborts() {
        let mut rec = Recorder::default();
        let err = parse_lines("# ok\n=> http://[::1/ broken\n# never\n".as_bytes(), &mut rec).unwrap_err();
        assert!(matches!(err, GemtextError::InvalidLink { ref target, .. } if target == "http://[::1/"));
        assert_eq!(rec.events, vec![Begin, H1("ok".into())]);
    }

    #[test]
    fn visitor_error_stops_the_scan() {
        let mut rec = Recorder {
            fail_at: Some(2),
            ..Recorder::default()
        };
        assert!(parse_lines("one\ntwo\nthree\n".as_bytes(), &mut rec).is_err());
        assert_eq!(rec.events, vec![Begin, Text("one".into())]);
    }

    struct Broken {
        sent: bool,
    }

    impl Read for Broken {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            self.sent = true;
            let line = b"first\n";
            buf[..line.len()].copy_from_slice(line);
            Ok(line.len())
        }
    }

    #[test]
    fn read_error_skips_end() {
        let mut rec = Recorder::default();
        let err = parse_lines(BufReader::new(Broken { sent: false }), &mut rec).unwrap_err();
        assert!(matches!(err, GemtextError::Io(_)));
        assert_eq!(rec.events, vec![Begin, Text("first".into())]);
    }
}
