//! The visitor behind success pages: HTML body plus page title and inline
//! images.

use std::io::Write;
use std::sync::Arc;

use gemini_core::gemtext::html::{escape, safe_href, write_anchor};
use gemini_core::gemtext::{HtmlWriter, UrlRewriter, Visitor};
use gemini_core::{GemtextError, UriRef};
use regex::Regex;

use crate::links::LOCAL;

/// Wraps an `HtmlWriter` and tracks the page title: the first heading of
/// the highest rank seen so far.
pub struct SuccessContext {
    html: HtmlWriter<Vec<u8>>,
    title: Option<String>,
    // 4 = no heading yet; gemtext has three levels
    title_level: u8,
    image_pattern: Option<Regex>,
}

impl SuccessContext {
    pub fn new(rewriter: Arc<dyn UrlRewriter>, image_pattern: Option<Regex>) -> Self {
        Self {
            html: HtmlWriter::new(Vec::new()).with_rewriter(rewriter),
            title: None,
            title_level: 4,
            image_pattern,
        }
    }

    /// Close any open block and return `(title, body)`. Safe to call after a
    /// traversal that stopped early.
    pub fn finish(mut self) -> Result<(Option<String>, String), GemtextError> {
        self.html.close_block()?;
        let body = String::from_utf8_lossy(&self.html.into_inner()).into_owned();
        Ok((self.title, body))
    }

    fn heading(&mut self, level: u8, text: &str) {
        if self.title_level > level {
            self.title = Some(text.to_string());
            self.title_level = level;
        }
    }

    fn is_image(&self, target: &UriRef) -> bool {
        self.image_pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(target.path()))
    }
}

impl Visitor for SuccessContext {
    fn end(&mut self) -> Result<(), GemtextError> {
        self.html.end()
    }

    fn text(&mut self, text: &str) -> Result<(), GemtextError> {
        self.html.text(text)
    }

    fn link(&mut self, target: &UriRef, friendly_name: &str) -> Result<(), GemtextError> {
        if !self.is_image(target) {
            return self.html.link(target, friendly_name);
        }

        self.html.close_block()?;
        let (href, class) = self.html.resolve_link(target)?;
        let out = self.html.writer_mut();
        if class.starts_with(LOCAL) {
            let src = escape(safe_href(href.as_str()));
            let class = escape(&class);
            let alt = escape(friendly_name);
            writeln!(
                out,
                "<a href=\"{src}\" class=\"{class}\"><img alt=\"{alt}\" src=\"{src}\" /></a><br/>"
            )?;
            Ok(())
        } else {
            let name = if friendly_name.is_empty() {
                href.as_str()
            } else {
                friendly_name
            };
            write_anchor(out, href.as_str(), &class, name)
        }
    }

    fn preformatting_toggle(&mut self, alt_text: &str) -> Result<(), GemtextError> {
        self.html.preformatting_toggle(alt_text)
    }

    fn preformatted_text(&mut self, text: &str) -> Result<(), GemtextError> {
        self.html.preformatted_text(text)
    }

    fn heading1(&mut self, text: &str) -> Result<(), GemtextError> {
        self.heading(1, text);
        self.html.heading1(text)
    }

    fn heading2(&mut self, text: &str) -> Result<(), GemtextError> {
        self.heading(2, text);
        self.html.heading2(text)
    }

    fn heading3(&mut self, text: &str) -> Result<(), GemtextError> {
        self.heading(3, text);
        self.html.heading3(text)
    }

    fn unordered_list_item(&mut self, text: &str) -> Result<(), GemtextError> {
        self.html.unordered_list_item(text)
    }

    fn quote(&mut self, text: &str) -> Result<(), GemtextError> {
        self.html.quote(text)
    }
}
