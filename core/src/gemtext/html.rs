//! HTML rendering of gemtext.
//!
//! # Design
//! `HtmlWriter` keeps exactly one open block element at a time in
//! `BlockState`. Text, quote and list events extend the block they opened;
//! every other event (and any change of block kind) closes the open block
//! first. `end` closes whatever is left, so a finished traversal always
//! leaves balanced markup.
//!
//! Every fragment is built from a fixed format string with escaped
//! arguments. Nothing from the document reaches the output unescaped.

use std::fmt;
use std::io::{BufRead, Write};
use std::sync::Arc;

use super::{parse_lines, Visitor};
use crate::error::GemtextError;
use crate::uri::UriRef;

/// The block element currently open in an `HtmlWriter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockState {
    #[default]
    Clear,
    Pre,
    AltPre,
    Quoting,
    Paragraph,
    List,
}

impl BlockState {
    pub fn closing_tag(self) -> &'static str {
        match self {
            BlockState::Clear => "",
            BlockState::Pre => "</pre>\n",
            BlockState::AltPre => "</pre>\n</div>\n",
            BlockState::Quoting => "</blockquote>\n",
            BlockState::Paragraph => "</p>\n",
            BlockState::List => "</ul>\n",
        }
    }
}

/// Maps a link target to the reference to emit and its CSS class.
pub trait UrlRewriter: Send + Sync {
    fn rewrite(&self, target: &UriRef) -> Result<(UriRef, String), GemtextError>;
}

impl<F> UrlRewriter for F
where
    F: Fn(&UriRef) -> Result<(UriRef, String), GemtextError> + Send + Sync,
{
    fn rewrite(&self, target: &UriRef) -> Result<(UriRef, String), GemtextError> {
        self(target)
    }
}

/// Visitor writing HTML fragments to `W`.
pub struct HtmlWriter<W> {
    writer: W,
    rewriter: Option<Arc<dyn UrlRewriter>>,
    state: BlockState,
}

impl<W> fmt::Debug for HtmlWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlWriter")
            .field("state", &self.state)
            .field("rewriter", &self.rewriter.is_some())
            .finish()
    }
}

impl<W: Write> HtmlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            rewriter: None,
            state: BlockState::Clear,
        }
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn UrlRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    /// Raw access to the output, for wrappers that emit their own markup.
    /// Callers must `close_block` first.
    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Close the open block, if any.
    pub fn close_block(&mut self) -> Result<(), GemtextError> {
        self.writer.write_all(self.state.closing_tag().as_bytes())?;
        self.state = BlockState::Clear;
        Ok(())
    }

    /// Run `target` through the rewriter. Without one the target is kept
    /// and its scheme becomes the class.
    pub fn resolve_link(&self, target: &UriRef) -> Result<(UriRef, String), GemtextError> {
        match &self.rewriter {
            Some(rewriter) => rewriter.rewrite(target),
            None => Ok((target.clone(), target.scheme().to_string())),
        }
    }

    fn open(&mut self, state: BlockState, tag: &str) -> Result<(), GemtextError> {
        if self.state != state {
            self.close_block()?;
            self.writer.write_all(tag.as_bytes())?;
            self.state = state;
        }
        Ok(())
    }

    fn escaped_line(&mut self, text: &str) -> Result<(), GemtextError> {
        writeln!(self.writer, "{}", escape(text))?;
        Ok(())
    }
}

impl<W: Write> Visitor for HtmlWriter<W> {
    fn end(&mut self) -> Result<(), GemtextError> {
        self.close_block()
    }

    fn text(&mut self, text: &str) -> Result<(), GemtextError> {
        self.open(BlockState::Paragraph, "<p>\n")?;
        self.escaped_line(text)
    }

    fn link(&mut self, target: &UriRef, friendly_name: &str) -> Result<(), GemtextError> {
        self.close_block()?;
        let (target, class) = self.resolve_link(target)?;
        let name = if friendly_name.is_empty() {
            target.as_str()
        } else {
            friendly_name
        };
        write_anchor(&mut self.writer, target.as_str(), &class, name)
    }

    fn preformatting_toggle(&mut self, alt_text: &str) -> Result<(), GemtextError> {
        let was = self.state;
        self.close_block()?;
        if matches!(was, BlockState::Pre | BlockState::AltPre) {
            return Ok(());
        }
        if alt_text.is_empty() {
            self.writer.write_all(b"<pre>\n")?;
            self.state = BlockState::Pre;
        } else {
            let alt = escape(alt_text);
            write!(
                self.writer,
                "<div aria-label=\"{alt}\">\n<pre aria-hidden=\"true\" alt=\"{alt}\">\n"
            )?;
            self.state = BlockState::AltPre;
        }
        Ok(())
    }

    fn preformatted_text(&mut self, text: &str) -> Result<(), GemtextError> {
        self.escaped_line(text)
    }

    fn heading1(&mut self, text: &str) -> Result<(), GemtextError> {
        self.close_block()?;
        writeln!(self.writer, "<h1>{}</h1>", escape(text))?;
        Ok(())
    }

    fn heading2(&mut self, text: &str) -> Result<(), GemtextError> {
        self.close_block()?;
        writeln!(self.writer, "<h2>{}</h2>", escape(text))?;
        Ok(())
    }

    fn heading3(&mut self, text: &str) -> Result<(), GemtextError> {
        self.close_block()?;
        writeln!(self.writer, "<h3>{}</h3>", escape(text))?;
        Ok(())
    }

    fn unordered_list_item(&mut self, text: &str) -> Result<(), GemtextError> {
        self.open(BlockState::List, "<ul>\n")?;
        writeln!(self.writer, "<li>{}</li>", escape(text))?;
        Ok(())
    }

    fn quote(&mut self, text: &str) -> Result<(), GemtextError> {
        self.open(BlockState::Quoting, "<blockquote>\n")?;
        self.escaped_line(text)
    }
}

/// Write `<a href="…"[ class="…"]>…</a><br/>` and a newline.
pub fn write_anchor<W: Write + ?Sized>(
    writer: &mut W,
    href: &str,
    class: &str,
    text: &str,
) -> Result<(), GemtextError> {
    write!(writer, "<a href=\"{}\"", escape(safe_href(href)))?;
    if !class.is_empty() {
        write!(writer, " class=\"{}\"", escape(class))?;
    }
    writeln!(writer, ">{}</a><br/>", escape(text))?;
    Ok(())
}

/// Escape text for HTML element content and quoted attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '\0' => out.push('\u{fffd}'),
            c => out.push(c),
        }
    }
    out
}

/// Replace hrefs that would execute code when followed with `#`.
pub fn safe_href(href: &str) -> &str {
    let scheme = match href.split_once(':') {
        Some((scheme, _)) => scheme.trim(),
        None => return href,
    };
    const UNSAFE: [&str; 3] = ["javascript", "vbscript", "data"];
    if UNSAFE.iter().any(|bad| scheme.eq_ignore_ascii_case(bad)) {
        "#"
    } else {
        href
    }
}

/// Parse gemtext from `reader` and write it to `writer` as HTML, without
/// rewriting links.
pub fn gmi_to_html<R: BufRead, W: Write>(reader: R, writer: W) -> Result<(), GemtextError> {
    parse_lines(reader, &mut HtmlWriter::new(writer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn html(input: &str) -> String {
        let mut out = Vec::new();
        gmi_to_html(input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn empty_document_renders_nothing() {
        assert_eq!(html(""), "");
    }

    #[test]
    fn named_link() {
        assert_eq!(html("=> hello.gmi Hello!"), "<a href=\"hello.gmi\">Hello!</a><br/>\n");
    }

    #[test]
    fn unnamed_link_shows_target() {
        assert_eq!(html("=> hello.gmi"), "<a href=\"hello.gmi\">hello.gmi</a><br/>\n");
    }

    #[test]
    fn absolute_link_is_classed_by_scheme() {
        assert_eq!(
            html("=> gemini://example.org/ Home"),
            "<a href=\"gemini://example.org/\" class=\"gemini\">Home</a><br/>\n"
        );
    }

    #[test]
    fn complex_document() {
        let input = "# Heading 1\n\nText, more text.\n\n=> hello.gmi Hello!\n\n> One\n> Two\n> Three\n\n```a\ntested\n```b\n";
        let expected = "<h1>Heading 1</h1>\n\
<p>\n\
\n\
Text, more text.\n\
\n\
</p>\n\
<a href=\"hello.gmi\">Hello!</a><br/>\n\
<p>\n\
\n\
</p>\n\
<blockquote>\n\
One\n\
Two\n\
Three\n\
</blockquote>\n\
<p>\n\
\n\
</p>\n\
<div aria-label=\"a\">\n\
<pre aria-hidden=\"true\" alt=\"a\">\n\
tested\n\
</pre>\n\
</div>\n";
        assert_eq!(html(input), expected);
    }

    #[test]
    fn list_items_share_one_list() {
        assert_eq!(html("* a\n* b\ntext"), "<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n<p>\ntext\n</p>\n");
    }

    #[test]
    fn everything_is_escaped() {
        assert_eq!(
            html("# <b>&\"'\n=> x.gmi <i>\n"),
            "<h1>&lt;b&gt;&amp;&#34;&#39;</h1>\n<a href=\"x.gmi\">&lt;i&gt;</a><br/>\n"
        );
        assert_eq!(html("```\n<script>\n```"), "<pre>\n&lt;script&gt;\n</pre>\n");
    }

    #[test]
    fn script_hrefs_are_neutralized() {
        assert_eq!(
            html("=> javascript:alert(1) click"),
            "<a href=\"#\" class=\"javascript\">click</a><br/>\n"
        );
        assert_eq!(safe_href(" DATA:text/html,x"), "#");
        assert_eq!(safe_href("hello.gmi"), "hello.gmi");
        assert_eq!(safe_href("https://example.org/"), "https://example.org/");
    }

    #[test]
    fn rewriter_supplies_target_and_class() {
        let rewriter = |target: &UriRef| -> Result<(UriRef, String), GemtextError> {
            let url = target.resolve(&url::Url::parse("gemini://example.org/").unwrap()).map_err(|e| {
                GemtextError::Rewrite {
                    target: target.to_string(),
                    message: e.to_string(),
                }
            })?;
            Ok((UriRef::Absolute(url), "local".to_string()))
        };
        let mut writer = HtmlWriter::new(Vec::new()).with_rewriter(Arc::new(rewriter));
        parse_lines("=> a.gmi".as_bytes(), &mut writer).unwrap();
        assert_eq!(
            String::from_utf8(writer.into_inner()).unwrap(),
            "<a href=\"gemini://example.org/a.gmi\" class=\"local\">gemini://example.org/a.gmi</a><br/>\n"
        );
    }

    #[test]
    fn rewriter_error_aborts() {
        let rewriter = |target: &UriRef| -> Result<(UriRef, String), GemtextError> {
            Err(GemtextError::Rewrite {
                target: target.to_string(),
                message: "no".to_string(),
            })
        };
        let mut writer = HtmlWriter::new(Vec::new()).with_rewriter(Arc::new(rewriter));
        assert!(parse_lines("=> a.gmi".as_bytes(), &mut writer).is_err());
    }

    #[derive(Debug, Clone, Copy)]
    enum Event {
        Text,
        Link,
        Toggle,
        AltToggle,
        H1,
        H2,
        H3,
        Item,
        Quote,
    }

    const EVENTS: [Event; 9] = [
        Event::Text,
        Event::Link,
        Event::Toggle,
        Event::AltToggle,
        Event::H1,
        Event::H2,
        Event::H3,
        Event::Item,
        Event::Quote,
    ];

    fn apply(w: &mut HtmlWriter<Vec<u8>>, event: Event) {
        let target = UriRef::parse("x.gmi").unwrap();
        let result = match event {
            Event::Text => w.text("t"),
            Event::Link => w.link(&target, "l"),
            Event::Toggle => w.preformatting_toggle(""),
            Event::AltToggle => w.preformatting_toggle("alt"),
            Event::H1 => w.heading1("h"),
            Event::H2 => w.heading2("h"),
            Event::H3 => w.heading3("h"),
            Event::Item => w.unordered_list_item("i"),
            Event::Quote => w.quote("q"),
        };
        result.unwrap();
    }

    /// Writer positioned in `state` with an empty output buffer.
    fn writer_in(state: BlockState) -> HtmlWriter<Vec<u8>> {
        let mut w = HtmlWriter::new(Vec::new());
        match state {
            BlockState::Clear => {}
            BlockState::Pre => apply(&mut w, Event::Toggle),
            BlockState::AltPre => apply(&mut w, Event::AltToggle),
            BlockState::Quoting => apply(&mut w, Event::Quote),
            BlockState::Paragraph => apply(&mut w, Event::Text),
            BlockState::List => apply(&mut w, Event::Item),
        }
        assert_eq!(w.state(), state);
        w.writer_mut().clear();
        w
    }

    /// State an event leaves behind when applied from `from`.
    fn next_state(from: BlockState, event: Event) -> BlockState {
        let in_pre = matches!(from, BlockState::Pre | BlockState::AltPre);
        match event {
            Event::Toggle | Event::AltToggle if in_pre => BlockState::Clear,
            Event::Toggle => BlockState::Pre,
            Event::AltToggle => BlockState::AltPre,
            Event::Text => BlockState::Paragraph,
            Event::Item => BlockState::List,
            Event::Quote => BlockState::Quoting,
            Event::Link | Event::H1 | Event::H2 | Event::H3 => BlockState::Clear,
        }
    }

    #[test]
    fn transition_matrix() {
        const STATES: [BlockState; 6] = [
            BlockState::Clear,
            BlockState::Pre,
            BlockState::AltPre,
            BlockState::Quoting,
            BlockState::Paragraph,
            BlockState::List,
        ];
        let all_closers = ["</pre>", "</blockquote>", "</p>", "</ul>"];

        for from in STATES {
            for event in EVENTS {
                let mut w = writer_in(from);
                apply(&mut w, event);
                let out = String::from_utf8(w.writer_mut().clone()).unwrap();
                let to = next_state(from, event);
                assert_eq!(w.state(), to, "{from:?} --{event:?}-->");

                let continues = from == to && from != BlockState::Clear;
                let closes: usize = all_closers.iter().map(|c| out.matches(c).count()).sum();
                if continues || from == BlockState::Clear {
                    assert_eq!(closes, 0, "{from:?} --{event:?}--> {out:?}");
                } else {
                    assert!(out.starts_with(from.closing_tag()), "{from:?} --{event:?}--> {out:?}");
                    assert_eq!(closes, 1, "{from:?} --{event:?}--> {out:?}");
                }
            }
        }
    }

    #[test]
    fn toggle_inside_either_pre_only_closes() {
        // A labeled fence arriving inside a plain block closes it and does
        // not reopen with the new label.
        let mut w = writer_in(BlockState::Pre);
        w.preformatting_toggle("new label").unwrap();
        assert_eq!(String::from_utf8(w.into_inner()).unwrap(), "</pre>\n");

        let mut w = writer_in(BlockState::AltPre);
        w.preformatting_toggle("").unwrap();
        assert_eq!(String::from_utf8(w.into_inner()).unwrap(), "</pre>\n</div>\n");
    }

    #[test]
    fn end_closes_open_block() {
        for state in [BlockState::Pre, BlockState::Quoting, BlockState::Paragraph, BlockState::List] {
            let mut w = writer_in(state);
            w.end().unwrap();
            assert_eq!(w.state(), BlockState::Clear);
            assert_eq!(String::from_utf8(w.into_inner()).unwrap(), state.closing_tag());
        }
    }
}
