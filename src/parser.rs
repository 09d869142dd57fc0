//! Template tokenizers
//!
//! Small tokenizers turning template source into calls on a
//! [`TemplateHandlerAdapter`], which builds the engine events:
//!
//! - markup (HTML and XML): elements, attributes, text, comments, CDATA
//!   sections, DOCTYPE clauses, processing instructions and XML declarations
//! - textual (TEXT, JAVASCRIPT and CSS): `[#name attr="v"]...[/name]` and
//!   `[#name/]` elements, everything else being text
//! - RAW: the whole source as a single text event
//!
//! Markup is balanced while tokenizing: a close tag for an element opened
//! further up the stack auto-closes the elements in between, elements still
//! open at the end are auto-closed, and close tags with no open counterpart
//! are reported as unmatched. Auto-generated tags are marked synthetic and
//! never written back.

use std::sync::Arc;

use log::trace;

use crate::config::EngineConfiguration;
use crate::definitions::HtmlElementType;
use crate::error::{Error, Location, Result};
use crate::event_queue::EngineEventQueue;
use crate::model::Model;
use crate::template_handler::{TemplateHandler, TemplateHandlerAdapter};
use crate::template_mode::TemplateMode;

/// Parse a whole template, template start and end events included
pub fn parse_template(
    configuration: &EngineConfiguration,
    template_mode: TemplateMode,
    template_name: Option<&str>,
    source: &str,
) -> Result<Model> {
    let mut queue = EngineEventQueue::with_capacity(template_mode, 64);
    parse(configuration, template_mode, template_name, source, true, &mut queue)?;
    Ok(Model::from_queue(queue))
}

/// Parse a fragment: no template start or end events
pub(crate) fn parse_fragment(
    configuration: &EngineConfiguration,
    template_mode: TemplateMode,
    fragment: &str,
) -> Result<Model> {
    let mut queue = EngineEventQueue::new(template_mode);
    parse(configuration, template_mode, None, fragment, false, &mut queue)?;
    Ok(Model::from_queue(queue))
}

/// Tokenize `source`, sending the resulting events to `handler`
///
/// `document` adds the template start and end events.
pub fn parse(
    configuration: &EngineConfiguration,
    template_mode: TemplateMode,
    template_name: Option<&str>,
    source: &str,
    document: bool,
    handler: &mut dyn TemplateHandler,
) -> Result<()> {
    trace!(target: "thymeleaf.engine.parser", "parsing {} bytes as {template_mode}", source.len());
    let buffer: Arc<str> = Arc::from(source);
    let mut adapter = TemplateHandlerAdapter::new(
        configuration,
        template_mode,
        template_name,
        Arc::clone(&buffer),
        handler,
    );
    if document {
        adapter.handle_document_start()?;
    }
    if template_mode == TemplateMode::Raw {
        adapter.handle_text(0..buffer.len(), 1, 1)?;
    } else {
        let mut tokenizer = Tokenizer::new(configuration, template_mode, template_name, &buffer);
        tokenizer.run(&mut adapter)?;
    }
    if document {
        adapter.handle_document_end()?;
    }
    Ok(())
}

/// Attribute-area token of an element tag
enum TagToken {
    WhiteSpace(std::ops::Range<usize>),
    Attribute {
        name: std::ops::Range<usize>,
        operator: Option<std::ops::Range<usize>>,
        value: Option<std::ops::Range<usize>>,
        value_outer: Option<std::ops::Range<usize>>,
        pos: usize,
    },
}

/// Scanned element tag, before it is sent to the adapter
struct ScannedTag {
    name: std::ops::Range<usize>,
    tokens: Vec<TagToken>,
    minimized: bool,
    end: usize,
}

struct Tokenizer<'s> {
    configuration: &'s EngineConfiguration,
    template_mode: TemplateMode,
    template_name: Option<&'s str>,
    source: &'s str,
    line_starts: Vec<usize>,
    open_elements: Vec<String>,
}

impl<'s> Tokenizer<'s> {
    fn new(
        configuration: &'s EngineConfiguration,
        template_mode: TemplateMode,
        template_name: Option<&'s str>,
        source: &'s str,
    ) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            configuration,
            template_mode,
            template_name,
            source,
            line_starts,
            open_elements: Vec::new(),
        }
    }

    /// 1-based line and column of a byte position
    fn line_col(&self, pos: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&pos) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let col = self.source[self.line_starts[line]..pos].chars().count() + 1;
        (line + 1, col)
    }

    fn error(&self, message: String, pos: usize) -> Error {
        let (line, col) = self.line_col(pos);
        Error::parse_owned(message, Location::new(self.template_name, line, col))
    }

    fn byte(&self, pos: usize) -> Option<u8> {
        self.source.as_bytes().get(pos).copied()
    }

    fn find(&self, from: usize, pattern: &str) -> Option<usize> {
        self.source[from..].find(pattern).map(|i| from + i)
    }

    fn skip_white_space(&self, mut pos: usize) -> usize {
        while self.byte(pos).map_or(false, |b| b.is_ascii_whitespace()) {
            pos += 1;
        }
        pos
    }

    /// End of the name starting at `pos`
    fn scan_name(&self, mut pos: usize, close: u8) -> usize {
        while let Some(b) = self.byte(pos) {
            if b.is_ascii_whitespace() || b == close || b == b'/' || b == b'=' || b == b'<' {
                break;
            }
            pos += 1;
        }
        pos
    }

    fn run(&mut self, adapter: &mut TemplateHandlerAdapter<'_>) -> Result<()> {
        let len = self.source.len();
        let mut pos = 0;
        let mut text_start = 0;

        while pos < len {
            let Some(next) = self.next_structure(pos) else {
                break;
            };
            let Some(kind) = self.structure_at(next) else {
                pos = next + 1;
                continue;
            };
            self.flush_text(adapter, text_start, next)?;
            let end = match kind {
                Structure::Comment => self.comment(adapter, next)?,
                Structure::CData => self.cdata_section(adapter, next)?,
                Structure::DocType => self.doctype(adapter, next)?,
                Structure::XmlDeclaration => self.xml_declaration(adapter, next)?,
                Structure::ProcessingInstruction => self.processing_instruction(adapter, next)?,
                Structure::CloseElement => self.close_element(adapter, next)?,
                Structure::Element => self.element(adapter, next)?,
            };
            text_start = end;
            pos = match kind {
                Structure::Element => self.raw_text_end(end),
                _ => end,
            };
        }

        self.flush_text(adapter, text_start, len)?;
        let (line, col) = self.line_col(len);
        while let Some(name) = self.open_elements.pop() {
            adapter.handle_auto_close_element(&name, line, col)?;
        }
        Ok(())
    }

    fn flush_text(&self, adapter: &mut TemplateHandlerAdapter<'_>, start: usize, end: usize) -> Result<()> {
        if start >= end {
            return Ok(());
        }
        let (line, col) = self.line_col(start);
        adapter.handle_text(start..end, line, col)
    }

    fn next_structure(&self, from: usize) -> Option<usize> {
        if self.template_mode.is_text() {
            self.find(from, "[")
        } else {
            self.find(from, "<")
        }
    }

    fn structure_at(&self, pos: usize) -> Option<Structure> {
        let rest = &self.source[pos..];
        let is_name_start = |b: Option<u8>| b.map_or(false, |b| b.is_ascii_alphabetic() || b == b'_' || b == b':');

        if self.template_mode.is_text() {
            // Textual element names may be empty: `[# th:each="..."]`, `[/]`
            let textual_name = |b: Option<u8>| {
                b.map_or(false, |b| b == b']' || b == b'/' || b.is_ascii_whitespace()) || is_name_start(b)
            };
            return if rest.starts_with("[#") && textual_name(self.byte(pos + 2)) {
                Some(Structure::Element)
            } else if rest.starts_with("[/") && textual_name(self.byte(pos + 2)) {
                Some(Structure::CloseElement)
            } else {
                None
            };
        }

        if rest.starts_with("<!--") {
            Some(Structure::Comment)
        } else if rest.starts_with("<![CDATA[") {
            Some(Structure::CData)
        } else if rest.len() >= 9 && rest[..9].eq_ignore_ascii_case("<!DOCTYPE") {
            Some(Structure::DocType)
        } else if rest.starts_with("<?xml") && self.byte(pos + 5).map_or(false, |b| b.is_ascii_whitespace()) {
            Some(Structure::XmlDeclaration)
        } else if rest.starts_with("<?") {
            Some(Structure::ProcessingInstruction)
        } else if rest.starts_with("</") && is_name_start(self.byte(pos + 2)) {
            Some(Structure::CloseElement)
        } else if is_name_start(self.byte(pos + 1)) {
            Some(Structure::Element)
        } else {
            None
        }
    }

    fn comment(&self, adapter: &mut TemplateHandlerAdapter<'_>, pos: usize) -> Result<usize> {
        let content_start = pos + 4;
        let content_end = self
            .find(content_start, "-->")
            .ok_or_else(|| self.error("Unterminated comment".to_owned(), pos))?;
        let (line, col) = self.line_col(pos);
        adapter.handle_comment(pos..content_end + 3, content_start..content_end, line, col)?;
        Ok(content_end + 3)
    }

    fn cdata_section(&self, adapter: &mut TemplateHandlerAdapter<'_>, pos: usize) -> Result<usize> {
        let content_start = pos + 9;
        let content_end = self
            .find(content_start, "]]>")
            .ok_or_else(|| self.error("Unterminated CDATA section".to_owned(), pos))?;
        let (line, col) = self.line_col(pos);
        adapter.handle_cdata_section(content_start..content_end, line, col)?;
        Ok(content_end + 3)
    }

    fn doctype(&self, adapter: &mut TemplateHandlerAdapter<'_>, pos: usize) -> Result<usize> {
        let end = self
            .find(pos, ">")
            .ok_or_else(|| self.error("Unterminated DOCTYPE clause".to_owned(), pos))?;
        let words = split_quoted(&self.source[pos + 9..end]);
        let element_name = words.first().copied();
        let (public_id, system_id) = match words.get(1) {
            Some(keyword) if keyword.eq_ignore_ascii_case("PUBLIC") => (words.get(2).copied(), words.get(3).copied()),
            Some(keyword) if keyword.eq_ignore_ascii_case("SYSTEM") => (None, words.get(2).copied()),
            _ => (None, None),
        };
        let (line, col) = self.line_col(pos);
        adapter.handle_doctype(pos..end + 1, element_name, public_id, system_id, line, col)?;
        Ok(end + 1)
    }

    fn xml_declaration(&self, adapter: &mut TemplateHandlerAdapter<'_>, pos: usize) -> Result<usize> {
        let end = self
            .find(pos, "?>")
            .ok_or_else(|| self.error("Unterminated XML declaration".to_owned(), pos))?;
        let content = &self.source[pos + 5..end];
        let (line, col) = self.line_col(pos);
        adapter.handle_xml_declaration(
            pos..end + 2,
            pseudo_attribute(content, "version"),
            pseudo_attribute(content, "encoding"),
            pseudo_attribute(content, "standalone"),
            line,
            col,
        )?;
        Ok(end + 2)
    }

    fn processing_instruction(&self, adapter: &mut TemplateHandlerAdapter<'_>, pos: usize) -> Result<usize> {
        let end = self
            .find(pos, "?>")
            .ok_or_else(|| self.error("Unterminated processing instruction".to_owned(), pos))?;
        let inner = &self.source[pos + 2..end];
        let (target, content) = match inner.find(|c: char| c.is_ascii_whitespace()) {
            Some(split) => {
                let content = inner[split..].trim();
                (&inner[..split], (!content.is_empty()).then_some(content))
            }
            None => (inner, None),
        };
        if target.is_empty() {
            return Err(self.error("Processing instruction has no target".to_owned(), pos));
        }
        let (line, col) = self.line_col(pos);
        adapter.handle_processing_instruction(pos..end + 2, target, content, line, col)?;
        Ok(end + 2)
    }

    fn close_char(&self) -> u8 {
        if self.template_mode.is_text() {
            b']'
        } else {
            b'>'
        }
    }

    fn scan_tag(&self, pos: usize) -> Result<ScannedTag> {
        let close = self.close_char();
        let name_start = pos + 2 - usize::from(self.template_mode.is_markup());
        let name_end = self.scan_name(name_start, close);
        let mut tokens = Vec::new();
        let mut i = name_end;

        loop {
            match self.byte(i) {
                None => {
                    return Err(self.error(
                        format!("Unterminated element tag \"{}\"", &self.source[name_start..name_end]),
                        pos,
                    ))
                }
                Some(b) if b.is_ascii_whitespace() => {
                    let end = self.skip_white_space(i);
                    tokens.push(TagToken::WhiteSpace(i..end));
                    i = end;
                }
                Some(b) if b == close => {
                    return Ok(ScannedTag {
                        name: name_start..name_end,
                        tokens,
                        minimized: false,
                        end: i + 1,
                    })
                }
                Some(b'/') if self.byte(i + 1) == Some(close) => {
                    return Ok(ScannedTag {
                        name: name_start..name_end,
                        tokens,
                        minimized: true,
                        end: i + 2,
                    })
                }
                Some(_) => {
                    let attribute_end = self.scan_name(i, close);
                    if attribute_end == i {
                        return Err(self.error("Malformed attribute in element tag".to_owned(), i));
                    }
                    let (operator, value, value_outer, next) = self.scan_attribute_value(attribute_end, close)?;
                    tokens.push(TagToken::Attribute {
                        name: i..attribute_end,
                        operator,
                        value,
                        value_outer,
                        pos: i,
                    });
                    i = next;
                }
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn scan_attribute_value(
        &self,
        name_end: usize,
        close: u8,
    ) -> Result<(
        Option<std::ops::Range<usize>>,
        Option<std::ops::Range<usize>>,
        Option<std::ops::Range<usize>>,
        usize,
    )> {
        let equals = self.skip_white_space(name_end);
        if self.byte(equals) != Some(b'=') {
            return Ok((None, None, None, name_end));
        }
        let value_start = self.skip_white_space(equals + 1);
        let operator = Some(name_end..value_start);
        match self.byte(value_start) {
            Some(quote @ (b'"' | b'\'')) => {
                let quote = if quote == b'"' { "\"" } else { "'" };
                let value_end = self
                    .find(value_start + 1, quote)
                    .ok_or_else(|| self.error("Unterminated attribute value".to_owned(), value_start))?;
                Ok((
                    operator,
                    Some(value_start + 1..value_end),
                    Some(value_start..value_end + 1),
                    value_end + 1,
                ))
            }
            _ => {
                let mut end = value_start;
                while let Some(b) = self.byte(end) {
                    if b.is_ascii_whitespace() || b == close || (b == b'/' && self.byte(end + 1) == Some(close)) {
                        break;
                    }
                    end += 1;
                }
                Ok((operator, Some(value_start..end), Some(value_start..end), end))
            }
        }
    }

    fn element(&mut self, adapter: &mut TemplateHandlerAdapter<'_>, pos: usize) -> Result<usize> {
        let source = self.source;
        let tag = self.scan_tag(pos)?;
        let name = &source[tag.name.clone()];
        let (line, col) = self.line_col(pos);

        let standalone = tag.minimized
            || (self.template_mode == TemplateMode::Html
                && self
                    .configuration
                    .element_definitions()
                    .for_name(self.template_mode, name)?
                    .is_void());

        if standalone {
            adapter.handle_standalone_element_start(name, tag.minimized, line, col)?;
        } else {
            adapter.handle_open_element_start(name, line, col)?;
        }
        for token in &tag.tokens {
            match token {
                TagToken::WhiteSpace(range) => adapter.handle_inner_white_space(&source[range.clone()])?,
                TagToken::Attribute {
                    name,
                    operator,
                    value,
                    value_outer,
                    pos,
                } => {
                    let (line, col) = self.line_col(*pos);
                    let slice = |range: &Option<std::ops::Range<usize>>| range.clone().map(|r| &source[r]);
                    adapter.handle_attribute(
                        &source[name.clone()],
                        slice(operator),
                        slice(value),
                        slice(value_outer),
                        line,
                        col,
                    )?;
                }
            }
        }
        if standalone {
            adapter.handle_standalone_element_end()?;
        } else {
            adapter.handle_open_element_end()?;
            self.open_elements.push(name.to_owned());
        }
        Ok(tag.end)
    }

    /// Where to resume looking for structures after an element tag ending at
    /// `end`: the content of raw text elements (`<script>`, `<title>`...) is
    /// not markup, so skip to its close tag
    fn raw_text_end(&self, end: usize) -> usize {
        if self.template_mode != TemplateMode::Html {
            return end;
        }
        let Some(name) = self.open_elements.last() else {
            return end;
        };
        let raw = self
            .configuration
            .element_definitions()
            .for_name(self.template_mode, name)
            .ok()
            .and_then(|definition| definition.html_element_type())
            .map_or(false, |t| matches!(t, HtmlElementType::RawText | HtmlElementType::EscapableRawText));
        if !raw {
            return end;
        }
        let mut from = end;
        while let Some(close) = self.find(from, "</") {
            let candidate = self.source.get(close + 2..close + 2 + name.len());
            if candidate.map_or(false, |c| c.eq_ignore_ascii_case(name)) {
                return close;
            }
            from = close + 2;
        }
        self.source.len()
    }

    fn close_element(&mut self, adapter: &mut TemplateHandlerAdapter<'_>, pos: usize) -> Result<usize> {
        let close = self.close_char();
        let name_start = pos + 2;
        let name_end = self.scan_name(name_start, close);
        let end = self.skip_white_space(name_end);
        if self.byte(end) != Some(close) {
            return Err(self.error("Malformed close tag".to_owned(), pos));
        }
        let name = &self.source[name_start..name_end];
        let (line, col) = self.line_col(pos);

        let mode = self.template_mode;
        match self
            .open_elements
            .iter()
            .rposition(|open| same_name(mode, open, name))
        {
            Some(index) => {
                while self.open_elements.len() > index + 1 {
                    if let Some(inner) = self.open_elements.pop() {
                        adapter.handle_auto_close_element(&inner, line, col)?;
                    }
                }
                self.open_elements.pop();
                adapter.handle_close_element(name, line, col)?;
            }
            None => adapter.handle_unmatched_close_element(name, line, col)?,
        }
        Ok(end + 1)
    }
}

#[derive(Debug, Clone, Copy)]
enum Structure {
    Comment,
    CData,
    DocType,
    XmlDeclaration,
    ProcessingInstruction,
    CloseElement,
    Element,
}

fn same_name(template_mode: TemplateMode, a: &str, b: &str) -> bool {
    if template_mode.is_case_sensitive() {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

/// Whitespace-separated words, quoted words unquoted
fn split_quoted(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'');
        let (word, remaining) = match quote {
            Some(quote) => match rest[1..].find(quote) {
                Some(end) => (&rest[1..end + 1], &rest[end + 2..]),
                None => (&rest[1..], ""),
            },
            None => match rest.find(|c: char| c.is_ascii_whitespace()) {
                Some(end) => (&rest[..end], &rest[end..]),
                None => (rest, ""),
            },
        };
        words.push(word);
        rest = remaining.trim_start();
    }
    words
}

/// Value of `name="value"` inside an XML declaration
fn pseudo_attribute<'t>(content: &'t str, name: &str) -> Option<&'t str> {
    let start = content.find(name)? + name.len();
    let rest = content[start..].trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let end = rest[1..].find(quote)?;
    Some(&rest[1..end + 1])
}
