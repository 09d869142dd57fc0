//! Template handler chain
//!
//! Events flow through a chain of [`TemplateHandler`]s: the parser side feeds
//! a [`TemplateHandlerAdapter`], which turns tokenizer callbacks into engine
//! events; the processing handler applies the dialects; an output handler at
//! the end of the chain writes the events back as text.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use log::trace;

use crate::attributes::{Attribute, AttributeValueQuotes, Attributes};
use crate::config::EngineConfiguration;
use crate::definitions::ElementDefinition;
use crate::error::{Error, Location, Result};
use crate::event::{
    CDataSection, CloseElementTag, Comment, DocType, ElementTag, EventLocation, EventText, OpenElementTag,
    ProcessingInstruction, StandaloneElementTag, TemplateEnd, TemplateStart, Text,
    XmlDeclaration,
};
use crate::event_queue::EngineEventQueue;
use crate::template_mode::TemplateMode;

/// Receiver of template events
///
/// Events are passed by value: a handler owns what it receives and may
/// modify it before passing it on.
pub trait TemplateHandler {
    fn handle_template_start(&mut self, start: TemplateStart) -> Result<()>;

    fn handle_template_end(&mut self, end: TemplateEnd) -> Result<()>;

    fn handle_text(&mut self, text: Text) -> Result<()>;

    fn handle_comment(&mut self, comment: Comment) -> Result<()>;

    fn handle_cdata_section(&mut self, cdata_section: CDataSection) -> Result<()>;

    fn handle_doctype(&mut self, doctype: DocType) -> Result<()>;

    fn handle_processing_instruction(&mut self, processing_instruction: ProcessingInstruction) -> Result<()>;

    fn handle_xml_declaration(&mut self, xml_declaration: XmlDeclaration) -> Result<()>;

    fn handle_open_element(&mut self, tag: OpenElementTag) -> Result<()>;

    fn handle_standalone_element(&mut self, tag: StandaloneElementTag) -> Result<()>;

    fn handle_close_element(&mut self, tag: CloseElementTag) -> Result<()>;
}

/// Collecting handler: parsed templates are stored as event queues
impl TemplateHandler for EngineEventQueue {
    fn handle_template_start(&mut self, start: TemplateStart) -> Result<()> {
        self.build(start.into());
        Ok(())
    }

    fn handle_template_end(&mut self, end: TemplateEnd) -> Result<()> {
        self.build(end.into());
        Ok(())
    }

    fn handle_text(&mut self, text: Text) -> Result<()> {
        self.build(text.into());
        Ok(())
    }

    fn handle_comment(&mut self, comment: Comment) -> Result<()> {
        self.build(comment.into());
        Ok(())
    }

    fn handle_cdata_section(&mut self, cdata_section: CDataSection) -> Result<()> {
        self.build(cdata_section.into());
        Ok(())
    }

    fn handle_doctype(&mut self, doctype: DocType) -> Result<()> {
        self.build(doctype.into());
        Ok(())
    }

    fn handle_processing_instruction(&mut self, processing_instruction: ProcessingInstruction) -> Result<()> {
        self.build(processing_instruction.into());
        Ok(())
    }

    fn handle_xml_declaration(&mut self, xml_declaration: XmlDeclaration) -> Result<()> {
        self.build(xml_declaration.into());
        Ok(())
    }

    fn handle_open_element(&mut self, tag: OpenElementTag) -> Result<()> {
        self.build(tag.into());
        Ok(())
    }

    fn handle_standalone_element(&mut self, tag: StandaloneElementTag) -> Result<()> {
        self.build(tag.into());
        Ok(())
    }

    fn handle_close_element(&mut self, tag: CloseElementTag) -> Result<()> {
        self.build(tag.into());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Output
// ----------------------------------------------------------------------------

/// Last handler of a chain: writes every event to `W`
#[derive(Debug, Default)]
pub struct OutputTemplateHandler<W = String> {
    writer: W,
}

impl OutputTemplateHandler<String> {
    pub fn new() -> Self {
        Self::with_writer(String::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_writer(String::with_capacity(capacity))
    }

    pub fn output(&self) -> &str {
        &self.writer
    }

    pub fn into_output(self) -> String {
        self.writer
    }
}

impl<W: fmt::Write> OutputTemplateHandler<W> {
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: fmt::Write> TemplateHandler for OutputTemplateHandler<W> {
    fn handle_template_start(&mut self, _start: TemplateStart) -> Result<()> {
        Ok(())
    }

    fn handle_template_end(&mut self, _end: TemplateEnd) -> Result<()> {
        Ok(())
    }

    fn handle_text(&mut self, text: Text) -> Result<()> {
        Ok(text.write(&mut self.writer)?)
    }

    fn handle_comment(&mut self, comment: Comment) -> Result<()> {
        Ok(comment.write(&mut self.writer)?)
    }

    fn handle_cdata_section(&mut self, cdata_section: CDataSection) -> Result<()> {
        Ok(cdata_section.write(&mut self.writer)?)
    }

    fn handle_doctype(&mut self, doctype: DocType) -> Result<()> {
        Ok(doctype.write(&mut self.writer)?)
    }

    fn handle_processing_instruction(&mut self, processing_instruction: ProcessingInstruction) -> Result<()> {
        Ok(processing_instruction.write(&mut self.writer)?)
    }

    fn handle_xml_declaration(&mut self, xml_declaration: XmlDeclaration) -> Result<()> {
        Ok(xml_declaration.write(&mut self.writer)?)
    }

    fn handle_open_element(&mut self, tag: OpenElementTag) -> Result<()> {
        Ok(tag.write(&mut self.writer)?)
    }

    fn handle_standalone_element(&mut self, tag: StandaloneElementTag) -> Result<()> {
        Ok(tag.write(&mut self.writer)?)
    }

    fn handle_close_element(&mut self, tag: CloseElementTag) -> Result<()> {
        Ok(tag.write(&mut self.writer)?)
    }
}

// ----------------------------------------------------------------------------
// Parser adapter
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Open,
    AutoOpen,
    Standalone { minimized: bool },
}

struct PendingTag {
    kind: PendingKind,
    definition: ElementDefinition,
    complete_name: String,
    attributes: Attributes,
    location: EventLocation,
}

/// Turns tokenizer callbacks into engine events
///
/// Text-like content (text, comments, CDATA, doctypes...) is referenced by
/// range into the template buffer, so unmodified events write straight from
/// the source. Attributes arrive between an element's `*_start` and `*_end`
/// calls.
pub struct TemplateHandlerAdapter<'a> {
    configuration: &'a EngineConfiguration,
    template_mode: TemplateMode,
    template_name: Option<Arc<str>>,
    buffer: Arc<str>,
    handler: &'a mut dyn TemplateHandler,
    pending: Option<PendingTag>,
}

impl<'a> TemplateHandlerAdapter<'a> {
    pub fn new(
        configuration: &'a EngineConfiguration,
        template_mode: TemplateMode,
        template_name: Option<&str>,
        buffer: Arc<str>,
        handler: &'a mut dyn TemplateHandler,
    ) -> Self {
        Self {
            configuration,
            template_mode,
            template_name: template_name.map(Arc::from),
            buffer,
            handler,
            pending: None,
        }
    }

    pub fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }

    fn location(&self, line: usize, col: usize) -> EventLocation {
        EventLocation::new(self.template_name.clone(), line, col)
    }

    fn span(&self, range: Range<usize>) -> Result<EventText> {
        EventText::span(&self.buffer, range)
    }

    fn definition(&self, name: &str) -> Result<ElementDefinition> {
        self.configuration
            .element_definitions()
            .for_name(self.template_mode, name)
    }

    fn check_no_pending(&self, what: &str) -> Result<()> {
        match &self.pending {
            None => Ok(()),
            Some(tag) => Err(Error::parse_owned(
                format!("Found {what} inside unfinished tag \"{}\"", tag.complete_name),
                tag.location.to_location(),
            )),
        }
    }

    /// Only for top-level templates, never for fragment parses
    pub fn handle_document_start(&mut self) -> Result<()> {
        trace!(target: "thymeleaf.engine.parser", "document start ({})", self.template_mode);
        let start = TemplateStart::new(self.template_name.as_deref(), self.template_mode);
        self.handler.handle_template_start(start)
    }

    pub fn handle_document_end(&mut self) -> Result<()> {
        self.check_no_pending("end of document")?;
        let end = TemplateEnd::new(self.template_name.as_deref(), self.template_mode);
        self.handler.handle_template_end(end)
    }

    pub fn handle_text(&mut self, range: Range<usize>, line: usize, col: usize) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        self.check_no_pending("text")?;
        let text = Text::from_event_text(self.span(range)?, Some(self.location(line, col)));
        self.handler.handle_text(text)
    }

    /// `full` covers the whole comment, `content` what is between the delimiters
    pub fn handle_comment(&mut self, full: Range<usize>, content: Range<usize>, line: usize, col: usize) -> Result<()> {
        self.check_no_pending("comment")?;
        let prefix = &self.buffer[full.start..content.start];
        let suffix = &self.buffer[content.end..full.end];
        let comment = Comment::with_delimiters(prefix, self.span(content.clone())?, suffix, Some(self.location(line, col)));
        self.handler.handle_comment(comment)
    }

    pub fn handle_cdata_section(&mut self, content: Range<usize>, line: usize, col: usize) -> Result<()> {
        self.check_no_pending("CDATA section")?;
        let cdata = CDataSection::from_event_text(self.span(content)?, Some(self.location(line, col)));
        self.handler.handle_cdata_section(cdata)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn handle_doctype(
        &mut self,
        full: Range<usize>,
        element_name: Option<&str>,
        public_id: Option<&str>,
        system_id: Option<&str>,
        line: usize,
        col: usize,
    ) -> Result<()> {
        self.check_no_pending("DOCTYPE")?;
        let doctype = DocType::from_parts(
            self.span(full)?,
            element_name,
            public_id,
            system_id,
            Some(self.location(line, col)),
        );
        self.handler.handle_doctype(doctype)
    }

    pub fn handle_processing_instruction(
        &mut self,
        full: Range<usize>,
        target: &str,
        content: Option<&str>,
        line: usize,
        col: usize,
    ) -> Result<()> {
        self.check_no_pending("processing instruction")?;
        let pi = ProcessingInstruction::from_parts(self.span(full)?, target, content, Some(self.location(line, col)));
        self.handler.handle_processing_instruction(pi)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn handle_xml_declaration(
        &mut self,
        full: Range<usize>,
        version: Option<&str>,
        encoding: Option<&str>,
        standalone: Option<&str>,
        line: usize,
        col: usize,
    ) -> Result<()> {
        self.check_no_pending("XML declaration")?;
        let declaration = XmlDeclaration::from_parts(
            self.span(full)?,
            version,
            encoding,
            standalone,
            Some(self.location(line, col)),
        );
        self.handler.handle_xml_declaration(declaration)
    }

    fn start_tag(&mut self, kind: PendingKind, name: &str, line: usize, col: usize) -> Result<()> {
        self.check_no_pending("element start")?;
        self.pending = Some(PendingTag {
            kind,
            definition: self.definition(name)?,
            complete_name: name.to_owned(),
            attributes: Attributes::new(),
            location: self.location(line, col),
        });
        Ok(())
    }

    fn end_tag(&mut self, expected: &str) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Err(Error::parse_owned(
                format!("Found end of {expected} tag without its start"),
                Location::default(),
            ));
        };
        let tag = ElementTag::new(
            pending.definition,
            &pending.complete_name,
            pending.attributes,
            pending.kind == PendingKind::AutoOpen,
            Some(pending.location),
        );
        match pending.kind {
            PendingKind::Open | PendingKind::AutoOpen => self.handler.handle_open_element(OpenElementTag::new(tag)),
            PendingKind::Standalone { minimized } => self
                .handler
                .handle_standalone_element(StandaloneElementTag::new(tag, minimized)),
        }
    }

    pub fn handle_open_element_start(&mut self, name: &str, line: usize, col: usize) -> Result<()> {
        self.start_tag(PendingKind::Open, name, line, col)
    }

    pub fn handle_open_element_end(&mut self) -> Result<()> {
        self.end_tag("open element")
    }

    /// Open tag added by the tokenizer to balance the markup; not written
    pub fn handle_auto_open_element_start(&mut self, name: &str, line: usize, col: usize) -> Result<()> {
        self.start_tag(PendingKind::AutoOpen, name, line, col)
    }

    pub fn handle_auto_open_element_end(&mut self) -> Result<()> {
        self.end_tag("auto open element")
    }

    pub fn handle_standalone_element_start(
        &mut self,
        name: &str,
        minimized: bool,
        line: usize,
        col: usize,
    ) -> Result<()> {
        self.start_tag(PendingKind::Standalone { minimized }, name, line, col)
    }

    pub fn handle_standalone_element_end(&mut self) -> Result<()> {
        self.end_tag("standalone element")
    }

    pub fn handle_close_element(&mut self, name: &str, line: usize, col: usize) -> Result<()> {
        self.close(name, false, false, line, col)
    }

    /// Close tag added by the tokenizer to balance the markup; not written
    pub fn handle_auto_close_element(&mut self, name: &str, line: usize, col: usize) -> Result<()> {
        self.close(name, true, false, line, col)
    }

    pub fn handle_unmatched_close_element(&mut self, name: &str, line: usize, col: usize) -> Result<()> {
        self.close(name, false, true, line, col)
    }

    fn close(&mut self, name: &str, synthetic: bool, unmatched: bool, line: usize, col: usize) -> Result<()> {
        self.check_no_pending("close tag")?;
        let tag = CloseElementTag::new(
            self.definition(name)?,
            name,
            synthetic,
            unmatched,
            Some(self.location(line, col)),
        );
        self.handler.handle_close_element(tag)
    }

    /// Whitespace between attributes (or before the end of the tag)
    pub fn handle_inner_white_space(&mut self, white_space: &str) -> Result<()> {
        let pending = self.pending_tag("inner whitespace")?;
        pending.attributes.push_white_space(white_space);
        Ok(())
    }

    /// An attribute of the pending tag
    ///
    /// `value_outer` is the value as written, quotes included, from which the
    /// quoting style is inferred.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_attribute(
        &mut self,
        name: &str,
        operator: Option<&str>,
        value: Option<&str>,
        value_outer: Option<&str>,
        line: usize,
        col: usize,
    ) -> Result<()> {
        let template_mode = self.template_mode;
        let quotes = infer_quotes(value_outer);
        if value.is_some() && quotes == AttributeValueQuotes::None {
            if template_mode == TemplateMode::Xml {
                return Err(Error::invalid_owned(format!(
                    "Attribute \"{name}\" has no value quotes, which is not allowed in XML template mode"
                )));
            }
            if value == Some("") {
                return Err(Error::invalid_owned(format!(
                    "Attribute \"{name}\" has an empty value with no quotes"
                )));
            }
        }
        if value.is_none() && template_mode == TemplateMode::Xml {
            return Err(Error::invalid_owned(format!(
                "Attribute \"{name}\" has no value, which is not allowed in XML template mode"
            )));
        }
        let definition = self
            .configuration
            .attribute_definitions()
            .for_name(template_mode, name)?;
        let location = self.location(line, col);
        let attribute = Attribute::new(definition, name, operator, value, quotes, Some(location));
        self.pending_tag("attribute")?.attributes.push_attribute(attribute);
        Ok(())
    }

    fn pending_tag(&mut self, what: &str) -> Result<&mut PendingTag> {
        self.pending.as_mut().ok_or_else(|| {
            Error::parse_owned(
                format!("Found {what} outside of an element tag"),
                Location::default(),
            )
        })
    }
}

fn infer_quotes(value_outer: Option<&str>) -> AttributeValueQuotes {
    match value_outer.and_then(|outer| outer.chars().next()) {
        Some('"') => AttributeValueQuotes::Double,
        Some('\'') => AttributeValueQuotes::Single,
        _ => AttributeValueQuotes::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn adapt(source: &str, mode: TemplateMode, feed: impl FnOnce(&mut TemplateHandlerAdapter<'_>) -> Result<()>) -> Result<EngineEventQueue> {
        let configuration = EngineConfiguration::builder().build()?;
        let mut queue = EngineEventQueue::new(mode);
        {
            let mut adapter =
                TemplateHandlerAdapter::new(&configuration, mode, Some("t"), Arc::from(source), &mut queue);
            feed(&mut adapter)?;
        }
        Ok(queue)
    }

    fn write(queue: &EngineEventQueue) -> String {
        let mut output = OutputTemplateHandler::new();
        queue.process(&mut output).unwrap();
        output.into_output()
    }

    #[test]
    fn test_adapter_builds_tags_with_attributes() {
        let source = "<p class='a' hidden>x</p>";
        let queue = adapt(source, TemplateMode::Html, |a| {
            a.handle_document_start()?;
            a.handle_open_element_start("p", 1, 1)?;
            a.handle_inner_white_space(" ")?;
            a.handle_attribute("class", Some("="), Some("a"), Some("'a'"), 1, 4)?;
            a.handle_inner_white_space(" ")?;
            a.handle_attribute("hidden", None, None, None, 1, 14)?;
            a.handle_open_element_end()?;
            a.handle_text(20..21, 1, 21)?;
            a.handle_close_element("p", 1, 22)?;
            a.handle_document_end()
        })
        .unwrap();
        assert_eq!(queue.len(), 5);
        assert_eq!(write(&queue), source);
    }

    #[test]
    fn test_unquoted_values_rejected_in_xml() {
        let err = adapt("<a b=c/>", TemplateMode::Xml, |a| {
            a.handle_standalone_element_start("a", true, 1, 1)?;
            a.handle_inner_white_space(" ")?;
            a.handle_attribute("b", Some("="), Some("c"), Some("c"), 1, 4)
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_unquoted_empty_value_rejected() {
        let result = adapt("<a b=>", TemplateMode::Html, |a| {
            a.handle_open_element_start("a", 1, 1)?;
            a.handle_attribute("b", Some("="), Some(""), Some(""), 1, 4)
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_auto_tags_are_not_written() {
        let queue = adapt("<td>x", TemplateMode::Html, |a| {
            a.handle_auto_open_element_start("tr", 1, 1)?;
            a.handle_auto_open_element_end()?;
            a.handle_open_element_start("td", 1, 1)?;
            a.handle_open_element_end()?;
            a.handle_text(4..5, 1, 5)?;
            a.handle_auto_close_element("td", 1, 6)?;
            a.handle_auto_close_element("tr", 1, 6)
        })
        .unwrap();
        assert_eq!(write(&queue), "<td>x");
    }

    #[test]
    fn test_attribute_outside_tag_is_an_error() {
        let result = adapt("", TemplateMode::Html, |a| {
            a.handle_attribute("b", Some("="), Some("1"), Some("\"1\""), 1, 1)
        });
        assert!(matches!(result, Err(Error::Parse { .. })));
    }
}
