//! Template events
//!
//! A parsed template is a flat sequence of events: text, comments, CDATA
//! sections, doctypes, processing instructions, XML declarations, element tags
//! and the template start/end boundaries. [`TemplateEvent`] is the closed sum
//! of all of them.
//!
//! Textual content is kept as [`EventText`]: either a span of the shared
//! source buffer (no copy while the event is unmodified) or an owned string.
//! Both write exactly what they contain, so untouched events round-trip
//! byte-for-byte.

use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::attributes::Attributes;
use crate::definitions::{AttributeDefinitions, ElementDefinition};
use crate::error::{Error, Location, Result};
use crate::names::ElementName;
use crate::processor::ElementProcessor;
use crate::template_mode::TemplateMode;

/// Where an event was found in its template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLocation {
    pub template_name: Option<Arc<str>>,
    pub line: usize,
    pub col: usize,
}

impl EventLocation {
    pub fn new(template_name: Option<Arc<str>>, line: usize, col: usize) -> Self {
        Self {
            template_name,
            line,
            col,
        }
    }

    pub fn to_location(&self) -> Location {
        Location::new(self.template_name.as_deref(), self.line, self.col)
    }
}

/// Character content of an event
#[derive(Clone)]
pub enum EventText {
    /// Unmodified slice of the source buffer
    Span { buffer: Arc<str>, range: Range<usize> },
    Owned(Arc<str>),
}

impl EventText {
    pub fn owned(text: &str) -> Self {
        EventText::Owned(Arc::from(text))
    }

    /// Slice of a source buffer; the range must fall on char boundaries
    pub fn span(buffer: &Arc<str>, range: Range<usize>) -> Result<Self> {
        if buffer.get(range.clone()).is_none() {
            return Err(Error::invalid_owned(format!(
                "Range {range:?} is not a valid slice of a {}-byte buffer",
                buffer.len()
            )));
        }
        Ok(EventText::Span {
            buffer: Arc::clone(buffer),
            range,
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventText::Span { buffer, range } => buffer.get(range.clone()).unwrap_or_default(),
            EventText::Owned(text) => text,
        }
    }

    pub fn is_buffer_backed(&self) -> bool {
        matches!(self, EventText::Span { .. })
    }

    /// Copy the content out of the source buffer
    pub fn materialize(&self) -> EventText {
        match self {
            EventText::Span { .. } => EventText::owned(self.as_str()),
            EventText::Owned(text) => EventText::Owned(Arc::clone(text)),
        }
    }
}

impl fmt::Debug for EventText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl PartialEq for EventText {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

// ----------------------------------------------------------------------------
// Non-element events
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Text {
    text: EventText,
    whitespace: OnceCell<bool>,
    location: Option<EventLocation>,
}

impl Text {
    pub fn new(text: &str) -> Self {
        Self::from_event_text(EventText::owned(text), None)
    }

    pub fn from_event_text(text: EventText, location: Option<EventLocation>) -> Self {
        Self {
            text,
            whitespace: OnceCell::new(),
            location,
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    pub fn event_text(&self) -> &EventText {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text().len()
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }

    /// Whether the text only contains whitespace (memoized)
    pub fn is_whitespace(&self) -> bool {
        *self
            .whitespace
            .get_or_init(|| self.text().chars().all(char::is_whitespace))
    }

    /// Text event for a byte range of this one, keeping its location
    pub fn sub_text(&self, range: Range<usize>) -> Text {
        let content = self.text().get(range).unwrap_or_default();
        Text::from_event_text(EventText::owned(content), self.location.clone())
    }

    pub fn location(&self) -> Option<&EventLocation> {
        self.location.as_ref()
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        writer.write_str(self.text())
    }
}

/// `<!--...-->` comment
#[derive(Debug, Clone)]
pub struct Comment {
    prefix: Arc<str>,
    content: EventText,
    suffix: Arc<str>,
    location: Option<EventLocation>,
}

impl Comment {
    pub fn new(content: &str) -> Self {
        Self::with_delimiters("<!--", EventText::owned(content), "-->", None)
    }

    pub fn with_delimiters(prefix: &str, content: EventText, suffix: &str, location: Option<EventLocation>) -> Self {
        Self {
            prefix: Arc::from(prefix),
            content,
            suffix: Arc::from(suffix),
            location,
        }
    }

    pub fn content(&self) -> &str {
        self.content.as_str()
    }

    /// Same delimiters, new content
    pub fn with_content(&self, content: &str) -> Self {
        Self {
            prefix: Arc::clone(&self.prefix),
            content: EventText::owned(content),
            suffix: Arc::clone(&self.suffix),
            location: self.location.clone(),
        }
    }

    pub fn location(&self) -> Option<&EventLocation> {
        self.location.as_ref()
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        writer.write_str(&self.prefix)?;
        writer.write_str(self.content())?;
        writer.write_str(&self.suffix)
    }
}

/// `<![CDATA[...]]>` section
#[derive(Debug, Clone)]
pub struct CDataSection {
    content: EventText,
    location: Option<EventLocation>,
}

impl CDataSection {
    pub fn new(content: &str) -> Self {
        Self::from_event_text(EventText::owned(content), None)
    }

    pub fn from_event_text(content: EventText, location: Option<EventLocation>) -> Self {
        Self { content, location }
    }

    pub fn content(&self) -> &str {
        self.content.as_str()
    }

    pub fn location(&self) -> Option<&EventLocation> {
        self.location.as_ref()
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        writer.write_str("<![CDATA[")?;
        writer.write_str(self.content())?;
        writer.write_str("]]>")
    }
}

/// `<!DOCTYPE ...>` clause
#[derive(Debug, Clone)]
pub struct DocType {
    doctype: EventText,
    element_name: Option<Arc<str>>,
    public_id: Option<Arc<str>>,
    system_id: Option<Arc<str>>,
    location: Option<EventLocation>,
}

impl DocType {
    /// Build a doctype for the `html` root from its identifiers
    pub fn new(public_id: Option<&str>, system_id: Option<&str>) -> Self {
        let mut doctype = String::from("<!DOCTYPE html");
        match (public_id, system_id) {
            (Some(public_id), Some(system_id)) => {
                doctype.push_str(&format!(" PUBLIC \"{public_id}\" \"{system_id}\""))
            }
            (Some(public_id), None) => doctype.push_str(&format!(" PUBLIC \"{public_id}\"")),
            (None, Some(system_id)) => doctype.push_str(&format!(" SYSTEM \"{system_id}\"")),
            (None, None) => {}
        }
        doctype.push('>');
        Self {
            doctype: EventText::owned(&doctype),
            element_name: Some(Arc::from("html")),
            public_id: public_id.map(Arc::from),
            system_id: system_id.map(Arc::from),
            location: None,
        }
    }

    pub fn from_parts(
        doctype: EventText,
        element_name: Option<&str>,
        public_id: Option<&str>,
        system_id: Option<&str>,
        location: Option<EventLocation>,
    ) -> Self {
        Self {
            doctype,
            element_name: element_name.map(Arc::from),
            public_id: public_id.map(Arc::from),
            system_id: system_id.map(Arc::from),
            location,
        }
    }

    pub fn doctype(&self) -> &str {
        self.doctype.as_str()
    }

    pub fn element_name(&self) -> Option<&str> {
        self.element_name.as_deref()
    }

    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn location(&self) -> Option<&EventLocation> {
        self.location.as_ref()
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        writer.write_str(self.doctype())
    }
}

/// `<?target content?>`
#[derive(Debug, Clone)]
pub struct ProcessingInstruction {
    processing_instruction: EventText,
    target: Arc<str>,
    content: Option<Arc<str>>,
    location: Option<EventLocation>,
}

impl ProcessingInstruction {
    pub fn new(target: &str, content: Option<&str>) -> Self {
        let full = match content {
            Some(content) => format!("<?{target} {content}?>"),
            None => format!("<?{target}?>"),
        };
        Self::from_parts(EventText::owned(&full), target, content, None)
    }

    pub fn from_parts(full: EventText, target: &str, content: Option<&str>, location: Option<EventLocation>) -> Self {
        Self {
            processing_instruction: full,
            target: Arc::from(target),
            content: content.map(Arc::from),
            location,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn location(&self) -> Option<&EventLocation> {
        self.location.as_ref()
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        writer.write_str(self.processing_instruction.as_str())
    }
}

/// `<?xml version="1.0" ...?>`
#[derive(Debug, Clone)]
pub struct XmlDeclaration {
    xml_declaration: EventText,
    version: Option<Arc<str>>,
    encoding: Option<Arc<str>>,
    standalone: Option<Arc<str>>,
    location: Option<EventLocation>,
}

impl XmlDeclaration {
    pub fn new(version: &str, encoding: Option<&str>, standalone: Option<&str>) -> Self {
        let mut full = format!("<?xml version=\"{version}\"");
        if let Some(encoding) = encoding {
            full.push_str(&format!(" encoding=\"{encoding}\""));
        }
        if let Some(standalone) = standalone {
            full.push_str(&format!(" standalone=\"{standalone}\""));
        }
        full.push_str("?>");
        Self::from_parts(EventText::owned(&full), Some(version), encoding, standalone, None)
    }

    pub fn from_parts(
        full: EventText,
        version: Option<&str>,
        encoding: Option<&str>,
        standalone: Option<&str>,
        location: Option<EventLocation>,
    ) -> Self {
        Self {
            xml_declaration: full,
            version: version.map(Arc::from),
            encoding: encoding.map(Arc::from),
            standalone: standalone.map(Arc::from),
            location,
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn standalone(&self) -> Option<&str> {
        self.standalone.as_deref()
    }

    pub fn location(&self) -> Option<&EventLocation> {
        self.location.as_ref()
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        writer.write_str(self.xml_declaration.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TemplateStart {
    template_name: Option<Arc<str>>,
    template_mode: TemplateMode,
}

impl TemplateStart {
    pub fn new(template_name: Option<&str>, template_mode: TemplateMode) -> Self {
        Self {
            template_name: template_name.map(Arc::from),
            template_mode,
        }
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    pub fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }
}

#[derive(Debug, Clone)]
pub struct TemplateEnd {
    template_name: Option<Arc<str>>,
    template_mode: TemplateMode,
}

impl TemplateEnd {
    pub fn new(template_name: Option<&str>, template_mode: TemplateMode) -> Self {
        Self {
            template_name: template_name.map(Arc::from),
            template_mode,
        }
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    pub fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }
}

// ----------------------------------------------------------------------------
// Element tags
// ----------------------------------------------------------------------------

static NEXT_TAG_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct ProcessorCache {
    version: u64,
    processors: Arc<[ElementProcessor]>,
}

/// Common part of open and standalone tags: the only tags with attributes,
/// and so the only ones processors are executed on
#[derive(Clone)]
pub struct ElementTag {
    template_mode: TemplateMode,
    definition: ElementDefinition,
    complete_name: Arc<str>,
    attributes: Arc<Attributes>,
    synthetic: bool,
    location: Option<EventLocation>,
    source_id: u64,
    cache: Option<ProcessorCache>,
}

impl ElementTag {
    pub fn new(
        definition: ElementDefinition,
        complete_name: &str,
        attributes: Attributes,
        synthetic: bool,
        location: Option<EventLocation>,
    ) -> Self {
        Self {
            template_mode: definition.element_name().template_mode(),
            definition,
            complete_name: Arc::from(complete_name),
            attributes: Arc::new(attributes),
            synthetic,
            location,
            source_id: NEXT_TAG_ID.fetch_add(1, Ordering::Relaxed),
            cache: None,
        }
    }

    pub fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }

    pub fn definition(&self) -> &ElementDefinition {
        &self.definition
    }

    pub fn element_name(&self) -> &ElementName {
        self.definition.element_name()
    }

    /// Name as written in the template
    pub fn complete_name(&self) -> &str {
        &self.complete_name
    }

    /// Created by the parser to balance the markup, not present in the source
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn location(&self) -> Option<&EventLocation> {
        self.location.as_ref()
    }

    /// Identifies the source tag: shared by every clone of it, even after
    /// attribute changes, and never handed out again once the tag is dropped
    pub(crate) fn source_id(&self) -> u64 {
        self.source_id
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Mutable access, copying the attributes if another tag shares them
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        Arc::make_mut(&mut self.attributes)
    }

    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = Arc::new(attributes);
        self.cache = None;
    }

    pub fn has_attribute(&self, complete_name: &str) -> bool {
        self.attributes.has_attribute(self.template_mode, complete_name)
    }

    pub fn attribute_value(&self, complete_name: &str) -> Option<&str> {
        self.attributes.value(self.template_mode, complete_name)
    }

    pub fn set_attribute(
        &mut self,
        definitions: &AttributeDefinitions,
        complete_name: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let mode = self.template_mode;
        self.attributes_mut()
            .set_attribute(definitions, mode, None, complete_name, value, None)
    }

    pub fn remove_attribute(&mut self, complete_name: &str) -> bool {
        let mode = self.template_mode;
        if !self.attributes.has_attribute(mode, complete_name) {
            return false;
        }
        self.attributes_mut().remove_attribute(mode, complete_name)
    }

    /// Processors applicable to this tag, in execution order
    ///
    /// Element-bound processors plus those bound to any of the attributes
    /// (skipping attribute processors whose element matcher rejects this
    /// element). Recomputed only when the attributes version changed since the
    /// last call.
    pub fn associated_processors(&mut self) -> Arc<[ElementProcessor]> {
        let version = self.attributes.version();
        if let Some(cache) = &self.cache {
            if cache.version == version {
                return Arc::clone(&cache.processors);
            }
        }
        let processors = self.compute_processors();
        self.cache = Some(ProcessorCache {
            version,
            processors: Arc::clone(&processors),
        });
        processors
    }

    pub fn has_associated_processors(&mut self) -> bool {
        !self.associated_processors().is_empty()
    }

    fn compute_processors(&self) -> Arc<[ElementProcessor]> {
        let attribute_processor_count: usize = self
            .attributes
            .iter()
            .map(|a| a.definition().associated_processors().len())
            .sum();
        if attribute_processor_count == 0 {
            return Arc::clone(self.definition.associated_processors());
        }

        let element_name = self.definition.element_name();
        let mut processors: Vec<ElementProcessor> =
            Vec::with_capacity(self.definition.associated_processors().len() + attribute_processor_count);
        processors.extend(self.definition.associated_processors().iter().cloned());
        for attribute in self.attributes.iter() {
            for processor in attribute.definition().associated_processors().iter() {
                if let Some(matcher) = processor.matching_element_name() {
                    if !matcher.matches(element_name) {
                        continue;
                    }
                }
                processors.push(processor.clone());
            }
        }
        processors.sort();
        processors.dedup_by(|a, b| a.is_same(b));
        processors.into()
    }

    fn write_start(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        if self.template_mode.is_text() {
            writer.write_str("[#")?;
        } else {
            writer.write_str("<")?;
        }
        writer.write_str(&self.complete_name)?;
        self.attributes.write(writer)
    }
}

impl fmt::Debug for ElementTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementTag")
            .field("name", &self.complete_name)
            .field("attributes", &self.attributes.to_string())
            .field("synthetic", &self.synthetic)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct OpenElementTag {
    tag: ElementTag,
}

impl OpenElementTag {
    pub fn new(tag: ElementTag) -> Self {
        Self { tag }
    }

    pub fn into_tag(self) -> ElementTag {
        self.tag
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        if self.tag.synthetic {
            return Ok(());
        }
        self.tag.write_start(writer)?;
        writer.write_str(if self.tag.template_mode.is_text() { "]" } else { ">" })
    }
}

impl Deref for OpenElementTag {
    type Target = ElementTag;

    fn deref(&self) -> &ElementTag {
        &self.tag
    }
}

impl DerefMut for OpenElementTag {
    fn deref_mut(&mut self) -> &mut ElementTag {
        &mut self.tag
    }
}

#[derive(Debug, Clone)]
pub struct StandaloneElementTag {
    tag: ElementTag,
    minimized: bool,
}

impl StandaloneElementTag {
    /// `minimized` tags are written with `/>`, others (HTML void elements) with `>`
    pub fn new(tag: ElementTag, minimized: bool) -> Self {
        Self { tag, minimized }
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn into_tag(self) -> ElementTag {
        self.tag
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        if self.tag.synthetic {
            return Ok(());
        }
        self.tag.write_start(writer)?;
        let end = match (self.tag.template_mode.is_text(), self.minimized) {
            (true, _) => "/]",
            (false, true) => "/>",
            (false, false) => ">",
        };
        writer.write_str(end)
    }
}

impl Deref for StandaloneElementTag {
    type Target = ElementTag;

    fn deref(&self) -> &ElementTag {
        &self.tag
    }
}

impl DerefMut for StandaloneElementTag {
    fn deref_mut(&mut self) -> &mut ElementTag {
        &mut self.tag
    }
}

#[derive(Debug, Clone)]
pub struct CloseElementTag {
    template_mode: TemplateMode,
    definition: ElementDefinition,
    complete_name: Arc<str>,
    synthetic: bool,
    unmatched: bool,
    location: Option<EventLocation>,
}

impl CloseElementTag {
    pub fn new(
        definition: ElementDefinition,
        complete_name: &str,
        synthetic: bool,
        unmatched: bool,
        location: Option<EventLocation>,
    ) -> Self {
        Self {
            template_mode: definition.element_name().template_mode(),
            definition,
            complete_name: Arc::from(complete_name),
            synthetic,
            unmatched,
            location,
        }
    }

    /// Close tag matching an open tag built from `tag`
    pub fn closing(tag: &ElementTag) -> Self {
        Self {
            template_mode: tag.template_mode,
            definition: tag.definition.clone(),
            complete_name: Arc::clone(&tag.complete_name),
            synthetic: tag.synthetic,
            unmatched: false,
            location: tag.location.clone(),
        }
    }

    pub fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }

    pub fn definition(&self) -> &ElementDefinition {
        &self.definition
    }

    pub fn element_name(&self) -> &ElementName {
        self.definition.element_name()
    }

    pub fn complete_name(&self) -> &str {
        &self.complete_name
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Close tag without a corresponding open tag
    pub fn is_unmatched(&self) -> bool {
        self.unmatched
    }

    pub fn location(&self) -> Option<&EventLocation> {
        self.location.as_ref()
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        if self.synthetic {
            return Ok(());
        }
        if self.template_mode.is_text() {
            writer.write_str("[/")?;
            writer.write_str(&self.complete_name)?;
            writer.write_str("]")
        } else {
            writer.write_str("</")?;
            writer.write_str(&self.complete_name)?;
            writer.write_str(">")
        }
    }
}

// ----------------------------------------------------------------------------
// The event sum type
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum TemplateEvent {
    TemplateStart(TemplateStart),
    TemplateEnd(TemplateEnd),
    Text(Text),
    Comment(Comment),
    CDataSection(CDataSection),
    DocType(DocType),
    ProcessingInstruction(ProcessingInstruction),
    XmlDeclaration(XmlDeclaration),
    OpenElement(OpenElementTag),
    StandaloneElement(StandaloneElementTag),
    CloseElement(CloseElementTag),
}

impl TemplateEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TemplateEvent::TemplateStart(_) => "template start",
            TemplateEvent::TemplateEnd(_) => "template end",
            TemplateEvent::Text(_) => "text",
            TemplateEvent::Comment(_) => "comment",
            TemplateEvent::CDataSection(_) => "CDATA section",
            TemplateEvent::DocType(_) => "DOCTYPE",
            TemplateEvent::ProcessingInstruction(_) => "processing instruction",
            TemplateEvent::XmlDeclaration(_) => "XML declaration",
            TemplateEvent::OpenElement(_) => "open element",
            TemplateEvent::StandaloneElement(_) => "standalone element",
            TemplateEvent::CloseElement(_) => "close element",
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, TemplateEvent::TemplateStart(_) | TemplateEvent::TemplateEnd(_))
    }

    pub fn is_element(&self) -> bool {
        matches!(
            self,
            TemplateEvent::OpenElement(_) | TemplateEvent::StandaloneElement(_) | TemplateEvent::CloseElement(_)
        )
    }

    pub fn location(&self) -> Option<&EventLocation> {
        match self {
            TemplateEvent::TemplateStart(_) | TemplateEvent::TemplateEnd(_) => None,
            TemplateEvent::Text(e) => e.location(),
            TemplateEvent::Comment(e) => e.location(),
            TemplateEvent::CDataSection(e) => e.location(),
            TemplateEvent::DocType(e) => e.location(),
            TemplateEvent::ProcessingInstruction(e) => e.location(),
            TemplateEvent::XmlDeclaration(e) => e.location(),
            TemplateEvent::OpenElement(e) => e.location(),
            TemplateEvent::StandaloneElement(e) => e.location(),
            TemplateEvent::CloseElement(e) => e.location(),
        }
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        match self {
            TemplateEvent::TemplateStart(_) | TemplateEvent::TemplateEnd(_) => Ok(()),
            TemplateEvent::Text(e) => e.write(writer),
            TemplateEvent::Comment(e) => e.write(writer),
            TemplateEvent::CDataSection(e) => e.write(writer),
            TemplateEvent::DocType(e) => e.write(writer),
            TemplateEvent::ProcessingInstruction(e) => e.write(writer),
            TemplateEvent::XmlDeclaration(e) => e.write(writer),
            TemplateEvent::OpenElement(e) => e.write(writer),
            TemplateEvent::StandaloneElement(e) => e.write(writer),
            TemplateEvent::CloseElement(e) => e.write(writer),
        }
    }
}

impl fmt::Display for TemplateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f)
    }
}

macro_rules! impl_from_event {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for TemplateEvent {
                fn from(event: $ty) -> Self {
                    TemplateEvent::$variant(event)
                }
            }
        )*
    };
}

impl_from_event! {
    TemplateStart => TemplateStart,
    TemplateEnd => TemplateEnd,
    Text => Text,
    Comment => Comment,
    CDataSection => CDataSection,
    DocType => DocType,
    ProcessingInstruction => ProcessingInstruction,
    XmlDeclaration => XmlDeclaration,
    OpenElementTag => OpenElement,
    StandaloneElementTag => StandaloneElement,
    CloseElementTag => CloseElement,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfiguration;
    use crate::context::EngineContext;
    use crate::model::ModelFactory;
    use crate::processor::{Dialect, ElementTagProcessor, MatchingAttributeName, Processor};
    use crate::structure::ElementTagStructureHandler;

    struct NoOp(MatchingAttributeName);

    impl Processor for NoOp {
        fn template_mode(&self) -> TemplateMode {
            TemplateMode::Html
        }

        fn precedence(&self) -> i32 {
            100
        }
    }

    impl ElementTagProcessor for NoOp {
        fn matching_attribute_name(&self) -> Option<&MatchingAttributeName> {
            Some(&self.0)
        }

        fn process(
            &self,
            _context: &mut dyn EngineContext,
            _tag: &ElementTag,
            _handler: &mut ElementTagStructureHandler,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn configuration() -> Arc<EngineConfiguration> {
        let matching = MatchingAttributeName::for_prefixed_attribute_name(TemplateMode::Html, Some("th"), "text").unwrap();
        let dialect = Dialect::new("test", Some("th"), 100).with_element_tag_processor(NoOp(matching));
        Arc::new(EngineConfiguration::builder().dialect(dialect).build().unwrap())
    }

    #[test]
    fn test_buffer_backed_text() {
        let buffer: Arc<str> = Arc::from("<p>hello</p>");
        let text = Text::from_event_text(EventText::span(&buffer, 3..8).unwrap(), None);
        assert_eq!(text.text(), "hello");
        assert!(text.event_text().is_buffer_backed());
        assert!(!text.event_text().materialize().is_buffer_backed());
        assert!(EventText::span(&buffer, 3..80).is_err());
    }

    #[test]
    fn test_whitespace_detection() {
        assert!(Text::new(" \n\t").is_whitespace());
        assert!(!Text::new(" x ").is_whitespace());
        assert!(Text::new("").is_whitespace());
    }

    #[test]
    fn test_sub_text() {
        let text = Text::new("\n  - item\n");
        assert_eq!(text.sub_text(1..9).text(), "  - item");
    }

    #[test]
    fn test_non_element_writes() {
        let mut out = String::new();
        Comment::new(" note ").write(&mut out).unwrap();
        CDataSection::new("a<b").write(&mut out).unwrap();
        DocType::new(None, None).write(&mut out).unwrap();
        ProcessingInstruction::new("php", Some("echo 1;")).write(&mut out).unwrap();
        XmlDeclaration::new("1.0", Some("UTF-8"), None).write(&mut out).unwrap();
        assert_eq!(
            out,
            "<!-- note --><![CDATA[a<b]]><!DOCTYPE html><?php echo 1;?><?xml version=\"1.0\" encoding=\"UTF-8\"?>"
        );
    }

    #[test]
    fn test_comment_with_content_keeps_delimiters() {
        let comment = Comment::with_delimiters("<!--", EventText::owned("a"), "-->", None);
        assert_eq!(comment.with_content("b").content(), "b");
    }

    #[test]
    fn test_associated_processors_are_cached_per_version() {
        let configuration = configuration();
        let factory = ModelFactory::new(Arc::clone(&configuration), TemplateMode::Html);
        let mut tag = factory.create_open_element_tag("p", &[("class", "a")]).unwrap().into_tag();

        let first = tag.associated_processors();
        assert!(first.is_empty());
        assert!(Arc::ptr_eq(&first, &tag.associated_processors()));
        // Reads leave the cached list in place
        assert!(tag.has_attribute("class"));
        assert_eq!(tag.attribute_value("class"), Some("a"));
        assert!(Arc::ptr_eq(&first, &tag.associated_processors()));

        tag.set_attribute(configuration.attribute_definitions(), "th:text", Some("x")).unwrap();
        let second = tag.associated_processors();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 1);
        assert!(Arc::ptr_eq(&second, &tag.associated_processors()));

        assert!(tag.remove_attribute("th:text"));
        assert!(tag.associated_processors().is_empty());
    }

    #[test]
    fn test_clones_share_the_source_id() {
        let configuration = configuration();
        let factory = ModelFactory::new(Arc::clone(&configuration), TemplateMode::Html);
        let tag = factory.create_open_element_tag("p", &[]).unwrap().into_tag();
        let mut copy = tag.clone();
        copy.set_attribute(configuration.attribute_definitions(), "id", Some("x")).unwrap();
        assert_eq!(copy.source_id(), tag.source_id());

        let other = factory.create_open_element_tag("p", &[]).unwrap().into_tag();
        assert_ne!(other.source_id(), tag.source_id());
    }
}
