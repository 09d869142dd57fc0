//! Processor contracts and dialects
//!
//! Processors are the pluggable rules applied to the event stream. This
//! module defines:
//!
//! - the processor traits ([`ElementTagProcessor`], [`ElementModelProcessor`],
//!   [`EventProcessor`] for non-element events and
//!   [`TemplateBoundariesProcessor`])
//! - the matching rules ([`MatchingElementName`], [`MatchingAttributeName`])
//!   that associate element processors with tags
//! - [`Dialect`], the unit of processor registration
//! - the total order used to sort the processors applicable to a tag
//!
//! # Examples
//!
//! ```rust,ignore
//! struct TextProcessor { attribute: MatchingAttributeName }
//!
//! impl Processor for TextProcessor {
//!     fn template_mode(&self) -> TemplateMode { TemplateMode::Html }
//!     fn precedence(&self) -> i32 { 1300 }
//! }
//!
//! impl ElementTagProcessor for TextProcessor {
//!     fn matching_attribute_name(&self) -> Option<&MatchingAttributeName> {
//!         Some(&self.attribute)
//!     }
//!
//!     fn process(&self, _ctx: &mut dyn EngineContext, tag: &ElementTag,
//!                handler: &mut ElementTagStructureHandler) -> Result<()> {
//!         handler.remove_attribute("th:text");
//!         handler.set_body_text("hi", false);
//!         Ok(())
//!     }
//! }
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::context::EngineContext;
use crate::error::{Error, Result};
use crate::event::{
    CDataSection, Comment, DocType, ElementTag, ProcessingInstruction, TemplateEnd, TemplateStart,
    Text, XmlDeclaration,
};
use crate::model::Model;
use crate::names::{AttributeName, AttributeNames, ElementName, ElementNames};
use crate::structure::{
    ElementModelStructureHandler, ElementTagStructureHandler, EventStructureHandler,
    TemplateBoundariesStructureHandler,
};
use crate::template_mode::TemplateMode;

/// Default precedence for processors that do not care about ordering
pub const DEFAULT_PRECEDENCE: i32 = 1000;

/// Metadata shared by every processor
pub trait Processor: Send + Sync {
    fn template_mode(&self) -> TemplateMode;

    /// Lower values execute first
    fn precedence(&self) -> i32 {
        DEFAULT_PRECEDENCE
    }
}

/// Element processor working on a single open or standalone tag
pub trait ElementTagProcessor: Processor {
    fn matching_element_name(&self) -> Option<&MatchingElementName> {
        None
    }

    fn matching_attribute_name(&self) -> Option<&MatchingAttributeName> {
        None
    }

    fn process(
        &self,
        context: &mut dyn EngineContext,
        tag: &ElementTag,
        handler: &mut ElementTagStructureHandler,
    ) -> Result<()>;
}

/// Element processor working on the whole subtree rooted at a tag
///
/// The subtree is gathered into a [`Model`] before the processor executes.
/// Any change made to the model replaces the original subtree.
pub trait ElementModelProcessor: Processor {
    fn matching_element_name(&self) -> Option<&MatchingElementName> {
        None
    }

    fn matching_attribute_name(&self) -> Option<&MatchingAttributeName> {
        None
    }

    fn process(
        &self,
        context: &mut dyn EngineContext,
        model: &mut Model,
        handler: &mut ElementModelStructureHandler,
    ) -> Result<()>;
}

/// Processor for non-element events (text, comments, doctypes...)
pub trait EventProcessor<E>: Processor {
    fn process(
        &self,
        context: &mut dyn EngineContext,
        event: &E,
        handler: &mut EventStructureHandler<E>,
    ) -> Result<()>;
}

pub type TextProcessor = dyn EventProcessor<Text>;
pub type CommentProcessor = dyn EventProcessor<Comment>;
pub type CDataSectionProcessor = dyn EventProcessor<CDataSection>;
pub type DocTypeProcessor = dyn EventProcessor<DocType>;
pub type ProcessingInstructionProcessor = dyn EventProcessor<ProcessingInstruction>;
pub type XmlDeclarationProcessor = dyn EventProcessor<XmlDeclaration>;

/// Processor invoked at the start and end of every template
pub trait TemplateBoundariesProcessor: Processor {
    fn process_template_start(
        &self,
        _context: &mut dyn EngineContext,
        _start: &TemplateStart,
        _handler: &mut TemplateBoundariesStructureHandler,
    ) -> Result<()> {
        Ok(())
    }

    fn process_template_end(
        &self,
        _context: &mut dyn EngineContext,
        _end: &TemplateEnd,
        _handler: &mut TemplateBoundariesStructureHandler,
    ) -> Result<()> {
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Matching
// ----------------------------------------------------------------------------

/// Which element names an element processor applies to
#[derive(Debug, Clone)]
pub enum MatchingElementName {
    /// Exactly one (interned) element name
    Name(ElementName),
    /// All elements with the given prefix, or all unprefixed ones for `None`
    Prefix {
        template_mode: TemplateMode,
        prefix: Option<Box<str>>,
    },
    All(TemplateMode),
}

impl MatchingElementName {
    pub fn for_element_name(template_mode: TemplateMode, element_name: &str) -> Result<Self> {
        Ok(Self::Name(ElementNames::for_name(template_mode, element_name)?))
    }

    pub fn for_prefixed_element_name(
        template_mode: TemplateMode,
        prefix: Option<&str>,
        element_name: &str,
    ) -> Result<Self> {
        Ok(Self::Name(ElementNames::for_prefixed_name(
            template_mode,
            prefix,
            element_name,
        )?))
    }

    pub fn for_all_elements_with_prefix(template_mode: TemplateMode, prefix: Option<&str>) -> Self {
        Self::Prefix {
            template_mode,
            prefix: prefix.map(Into::into),
        }
    }

    pub fn for_all_elements(template_mode: TemplateMode) -> Self {
        Self::All(template_mode)
    }

    pub fn template_mode(&self) -> TemplateMode {
        match self {
            Self::Name(name) => name.template_mode(),
            Self::Prefix { template_mode, .. } | Self::All(template_mode) => *template_mode,
        }
    }

    pub fn is_matching_all_elements(&self) -> bool {
        matches!(self, Self::All(_))
    }

    pub fn matches(&self, element_name: &ElementName) -> bool {
        if element_name.template_mode() != self.template_mode() {
            return false;
        }
        match self {
            Self::Name(name) => name == element_name,
            Self::All(_) => true,
            Self::Prefix { template_mode, prefix } => {
                prefix_matches(*template_mode, prefix.as_deref(), element_name.prefix())
            }
        }
    }
}

impl fmt::Display for MatchingElementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Prefix { prefix: Some(p), .. } => write!(f, "{p}:*"),
            Self::Prefix { prefix: None, .. } => f.write_str("[^:]*"),
            Self::All(_) => f.write_str("*"),
        }
    }
}

/// Which attribute names an element processor applies to
///
/// A processor with a non-"all" attribute matcher is associated with a tag
/// whenever one of its attributes matches.
#[derive(Debug, Clone)]
pub enum MatchingAttributeName {
    Name(AttributeName),
    Prefix {
        template_mode: TemplateMode,
        prefix: Option<Box<str>>,
    },
    All(TemplateMode),
}

impl MatchingAttributeName {
    pub fn for_attribute_name(template_mode: TemplateMode, attribute_name: &str) -> Result<Self> {
        Ok(Self::Name(AttributeNames::for_name(template_mode, attribute_name)?))
    }

    pub fn for_prefixed_attribute_name(
        template_mode: TemplateMode,
        prefix: Option<&str>,
        attribute_name: &str,
    ) -> Result<Self> {
        Ok(Self::Name(AttributeNames::for_prefixed_name(
            template_mode,
            prefix,
            attribute_name,
        )?))
    }

    pub fn for_all_attributes_with_prefix(template_mode: TemplateMode, prefix: Option<&str>) -> Self {
        Self::Prefix {
            template_mode,
            prefix: prefix.map(Into::into),
        }
    }

    pub fn for_all_attributes(template_mode: TemplateMode) -> Self {
        Self::All(template_mode)
    }

    pub fn template_mode(&self) -> TemplateMode {
        match self {
            Self::Name(name) => name.template_mode(),
            Self::Prefix { template_mode, .. } | Self::All(template_mode) => *template_mode,
        }
    }

    pub fn is_matching_all_attributes(&self) -> bool {
        matches!(self, Self::All(_))
    }

    pub fn matches(&self, attribute_name: &AttributeName) -> bool {
        if attribute_name.template_mode() != self.template_mode() {
            return false;
        }
        match self {
            Self::Name(name) => name == attribute_name,
            Self::All(_) => true,
            Self::Prefix { template_mode, prefix } => {
                prefix_matches(*template_mode, prefix.as_deref(), attribute_name.prefix())
            }
        }
    }
}

impl fmt::Display for MatchingAttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Prefix { prefix: Some(p), .. } => write!(f, "{p}:*"),
            Self::Prefix { prefix: None, .. } => f.write_str("[^:]*"),
            Self::All(_) => f.write_str("*"),
        }
    }
}

fn prefix_matches(template_mode: TemplateMode, expected: Option<&str>, actual: Option<&str>) -> bool {
    match (expected, actual) {
        (None, None) => true,
        (Some(expected), Some(actual)) if template_mode.is_case_sensitive() => expected == actual,
        (Some(expected), Some(actual)) => expected.eq_ignore_ascii_case(actual),
        _ => false,
    }
}

// ----------------------------------------------------------------------------
// Registered processors and their total order
// ----------------------------------------------------------------------------

/// Position of a registered processor in the engine-wide total order
///
/// Dialect precedence first, then processor precedence, then registration
/// order, so no two registered processors ever compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorOrder {
    pub dialect_precedence: i32,
    pub precedence: i32,
    pub id: usize,
}

/// A processor registered in an engine configuration
pub struct Registered<P: ?Sized> {
    pub(crate) order: ProcessorOrder,
    pub(crate) processor: Arc<P>,
}

impl<P: ?Sized> Clone for Registered<P> {
    fn clone(&self) -> Self {
        Self {
            order: self.order,
            processor: Arc::clone(&self.processor),
        }
    }
}

impl<P: ?Sized> Registered<P> {
    pub fn order(&self) -> ProcessorOrder {
        self.order
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }
}

impl<P: ?Sized> fmt::Debug for Registered<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registered").field("order", &self.order).finish()
    }
}

#[derive(Clone)]
pub enum ElementProcessorKind {
    Tag(Arc<dyn ElementTagProcessor>),
    Model(Arc<dyn ElementModelProcessor>),
}

/// An element processor (tag or model) registered in an engine configuration
#[derive(Clone)]
pub struct ElementProcessor {
    order: ProcessorOrder,
    kind: ElementProcessorKind,
}

impl ElementProcessor {
    pub(crate) fn new(order: ProcessorOrder, kind: ElementProcessorKind) -> Self {
        Self { order, kind }
    }

    pub fn order(&self) -> ProcessorOrder {
        self.order
    }

    pub fn kind(&self) -> &ElementProcessorKind {
        &self.kind
    }

    pub fn template_mode(&self) -> TemplateMode {
        match &self.kind {
            ElementProcessorKind::Tag(p) => p.template_mode(),
            ElementProcessorKind::Model(p) => p.template_mode(),
        }
    }

    pub fn matching_element_name(&self) -> Option<&MatchingElementName> {
        match &self.kind {
            ElementProcessorKind::Tag(p) => p.matching_element_name(),
            ElementProcessorKind::Model(p) => p.matching_element_name(),
        }
    }

    pub fn matching_attribute_name(&self) -> Option<&MatchingAttributeName> {
        match &self.kind {
            ElementProcessorKind::Tag(p) => p.matching_attribute_name(),
            ElementProcessorKind::Model(p) => p.matching_attribute_name(),
        }
    }

    /// Whether this processor belongs to attributes rather than to elements
    pub fn is_attribute_bound(&self) -> bool {
        self.matching_attribute_name()
            .map_or(false, |m| !m.is_matching_all_attributes())
    }

    pub fn is_same(&self, other: &ElementProcessor) -> bool {
        self.order.id == other.order.id
    }
}

impl PartialEq for ElementProcessor {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for ElementProcessor {}

impl PartialOrd for ElementProcessor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ElementProcessor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.cmp(&other.order)
    }
}

impl fmt::Debug for ElementProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ElementProcessorKind::Tag(_) => "tag",
            ElementProcessorKind::Model(_) => "model",
        };
        f.debug_struct("ElementProcessor")
            .field("kind", &kind)
            .field("order", &self.order)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Dialects
// ----------------------------------------------------------------------------

/// Any processor that can be added to a dialect
#[derive(Clone)]
pub enum ProcessorRegistration {
    ElementTag(Arc<dyn ElementTagProcessor>),
    ElementModel(Arc<dyn ElementModelProcessor>),
    Text(Arc<TextProcessor>),
    Comment(Arc<CommentProcessor>),
    CDataSection(Arc<CDataSectionProcessor>),
    DocType(Arc<DocTypeProcessor>),
    ProcessingInstruction(Arc<ProcessingInstructionProcessor>),
    XmlDeclaration(Arc<XmlDeclarationProcessor>),
    TemplateBoundaries(Arc<dyn TemplateBoundariesProcessor>),
}

impl ProcessorRegistration {
    pub fn template_mode(&self) -> TemplateMode {
        match self {
            Self::ElementTag(p) => p.template_mode(),
            Self::ElementModel(p) => p.template_mode(),
            Self::Text(p) => p.template_mode(),
            Self::Comment(p) => p.template_mode(),
            Self::CDataSection(p) => p.template_mode(),
            Self::DocType(p) => p.template_mode(),
            Self::ProcessingInstruction(p) => p.template_mode(),
            Self::XmlDeclaration(p) => p.template_mode(),
            Self::TemplateBoundaries(p) => p.template_mode(),
        }
    }

    pub fn precedence(&self) -> i32 {
        match self {
            Self::ElementTag(p) => p.precedence(),
            Self::ElementModel(p) => p.precedence(),
            Self::Text(p) => p.precedence(),
            Self::Comment(p) => p.precedence(),
            Self::CDataSection(p) => p.precedence(),
            Self::DocType(p) => p.precedence(),
            Self::ProcessingInstruction(p) => p.precedence(),
            Self::XmlDeclaration(p) => p.precedence(),
            Self::TemplateBoundaries(p) => p.precedence(),
        }
    }

    /// Check that the matchers of an element processor agree with its mode
    pub(crate) fn validate(&self) -> Result<()> {
        let mode = self.template_mode();
        if mode == TemplateMode::Raw {
            return Err(Error::config_static(
                "Processors cannot be registered for RAW template mode",
            ));
        }
        let (element, attribute) = match self {
            Self::ElementTag(p) => (p.matching_element_name(), p.matching_attribute_name()),
            Self::ElementModel(p) => (p.matching_element_name(), p.matching_attribute_name()),
            _ => return Ok(()),
        };
        if element.map_or(false, |m| m.template_mode() != mode)
            || attribute.map_or(false, |m| m.template_mode() != mode)
        {
            return Err(Error::config_owned(format!(
                "Element processor for template mode {mode} declares matching names for another template mode"
            )));
        }
        Ok(())
    }
}

/// A named, prefixed set of processors sharing one precedence
#[derive(Clone)]
pub struct Dialect {
    name: String,
    prefix: Option<String>,
    precedence: i32,
    processors: Vec<ProcessorRegistration>,
}

impl Dialect {
    pub fn new<S: Into<String>>(name: S, prefix: Option<&str>, precedence: i32) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.map(str::to_owned),
            precedence,
            processors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    pub fn processors(&self) -> &[ProcessorRegistration] {
        &self.processors
    }

    pub fn with_processor(mut self, processor: ProcessorRegistration) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn with_element_tag_processor<P: ElementTagProcessor + 'static>(self, processor: P) -> Self {
        self.with_processor(ProcessorRegistration::ElementTag(Arc::new(processor)))
    }

    pub fn with_element_model_processor<P: ElementModelProcessor + 'static>(self, processor: P) -> Self {
        self.with_processor(ProcessorRegistration::ElementModel(Arc::new(processor)))
    }

    pub fn with_text_processor<P: EventProcessor<Text> + 'static>(self, processor: P) -> Self {
        self.with_processor(ProcessorRegistration::Text(Arc::new(processor)))
    }

    pub fn with_comment_processor<P: EventProcessor<Comment> + 'static>(self, processor: P) -> Self {
        self.with_processor(ProcessorRegistration::Comment(Arc::new(processor)))
    }

    pub fn with_cdata_section_processor<P: EventProcessor<CDataSection> + 'static>(
        self,
        processor: P,
    ) -> Self {
        self.with_processor(ProcessorRegistration::CDataSection(Arc::new(processor)))
    }

    pub fn with_doctype_processor<P: EventProcessor<DocType> + 'static>(self, processor: P) -> Self {
        self.with_processor(ProcessorRegistration::DocType(Arc::new(processor)))
    }

    pub fn with_processing_instruction_processor<P: EventProcessor<ProcessingInstruction> + 'static>(
        self,
        processor: P,
    ) -> Self {
        self.with_processor(ProcessorRegistration::ProcessingInstruction(Arc::new(processor)))
    }

    pub fn with_xml_declaration_processor<P: EventProcessor<XmlDeclaration> + 'static>(
        self,
        processor: P,
    ) -> Self {
        self.with_processor(ProcessorRegistration::XmlDeclaration(Arc::new(processor)))
    }

    pub fn with_template_boundaries_processor<P: TemplateBoundariesProcessor + 'static>(
        self,
        processor: P,
    ) -> Self {
        self.with_processor(ProcessorRegistration::TemplateBoundaries(Arc::new(processor)))
    }
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialect")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("precedence", &self.precedence)
            .field("processors", &self.processors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_element_name_by_prefix() {
        let matcher = MatchingElementName::for_all_elements_with_prefix(TemplateMode::Html, Some("TH"));
        let block = ElementNames::for_name(TemplateMode::Html, "th:block").unwrap();
        let div = ElementNames::for_name(TemplateMode::Html, "div").unwrap();
        assert!(matcher.matches(&block));
        assert!(!matcher.matches(&div));

        let unprefixed = MatchingElementName::for_all_elements_with_prefix(TemplateMode::Html, None);
        assert!(unprefixed.matches(&div));
        assert!(!unprefixed.matches(&block));
    }

    #[test]
    fn test_matching_requires_same_template_mode() {
        let matcher = MatchingElementName::for_all_elements(TemplateMode::Xml);
        let div = ElementNames::for_name(TemplateMode::Html, "div").unwrap();
        assert!(!matcher.matches(&div));
    }

    #[test]
    fn test_matching_attribute_name() {
        let matcher = MatchingAttributeName::for_prefixed_attribute_name(TemplateMode::Html, Some("th"), "text").unwrap();
        let data = AttributeNames::for_name(TemplateMode::Html, "data-th-text").unwrap();
        let other = AttributeNames::for_name(TemplateMode::Html, "th:utext").unwrap();
        assert!(matcher.matches(&data));
        assert!(!matcher.matches(&other));
        assert!(!matcher.is_matching_all_attributes());
        assert_eq!(matcher.to_string(), "{th:text,data-th-text}");
    }

    #[test]
    fn test_processor_order_is_total() {
        let a = ProcessorOrder { dialect_precedence: 1000, precedence: 100, id: 2 };
        let b = ProcessorOrder { dialect_precedence: 1000, precedence: 100, id: 3 };
        let c = ProcessorOrder { dialect_precedence: 10, precedence: 5000, id: 9 };
        let mut orders = vec![b, a, c];
        orders.sort();
        assert_eq!(orders, vec![c, a, b]);
    }
}
