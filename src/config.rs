//! Engine and template configuration
//!
//! [`EngineConfiguration`] is built once from a set of [`Dialect`]s and shared
//! (behind an `Arc`) by every context and handler processing templates with
//! it. Building it:
//!
//! - validates each dialect and its processors
//! - gives every processor its place in the engine-wide total order
//! - sorts the processors of each template mode by that order
//! - builds the element and attribute definition repositories, which
//!   associate element processors with names
//!
//! [`TemplateConfig`] holds the per-call knobs of the
//! [`TemplateManager`](crate::template_manager::TemplateManager), mainly how
//! parsed templates are cached.
//!
//! ```rust,ignore
//! use thymeleaf_events::{Dialect, EngineConfiguration};
//!
//! let configuration = EngineConfiguration::builder()
//!     .dialect(Dialect::new("standard", Some("th"), 1000).with_element_tag_processor(TextProcessor))
//!     .build()?;
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::definitions::{AttributeDefinitions, ElementDefinitions, ProcessorsByMode};
use crate::error::{Error, Result};
use crate::processor::{
    CDataSectionProcessor, CommentProcessor, Dialect, DocTypeProcessor, ElementProcessor,
    ElementProcessorKind, ProcessingInstructionProcessor, ProcessorOrder, ProcessorRegistration,
    Registered, TemplateBoundariesProcessor, TextProcessor, XmlDeclarationProcessor,
};
use crate::template_mode::TemplateMode;

/// Non-element processors of one template mode, sorted by execution order
#[derive(Debug, Default)]
pub struct ModeProcessors {
    pub(crate) text: Vec<Registered<TextProcessor>>,
    pub(crate) comment: Vec<Registered<CommentProcessor>>,
    pub(crate) cdata_section: Vec<Registered<CDataSectionProcessor>>,
    pub(crate) doctype: Vec<Registered<DocTypeProcessor>>,
    pub(crate) processing_instruction: Vec<Registered<ProcessingInstructionProcessor>>,
    pub(crate) xml_declaration: Vec<Registered<XmlDeclarationProcessor>>,
    pub(crate) template_boundaries: Vec<Registered<dyn TemplateBoundariesProcessor>>,
}

impl ModeProcessors {
    fn sort(&mut self) {
        self.text.sort_by_key(Registered::order);
        self.comment.sort_by_key(Registered::order);
        self.cdata_section.sort_by_key(Registered::order);
        self.doctype.sort_by_key(Registered::order);
        self.processing_instruction.sort_by_key(Registered::order);
        self.xml_declaration.sort_by_key(Registered::order);
        self.template_boundaries.sort_by_key(Registered::order);
    }

    /// Whether no non-element processor at all is registered
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
            && self.comment.is_empty()
            && self.cdata_section.is_empty()
            && self.doctype.is_empty()
            && self.processing_instruction.is_empty()
            && self.xml_declaration.is_empty()
            && self.template_boundaries.is_empty()
    }
}

/// Everything the engine needs to know about the registered dialects
pub struct EngineConfiguration {
    dialects: Vec<Dialect>,
    element_processors: ProcessorsByMode,
    processors: HashMap<TemplateMode, Arc<ModeProcessors>>,
    element_definitions: ElementDefinitions,
    attribute_definitions: AttributeDefinitions,
}

impl EngineConfiguration {
    pub fn builder() -> EngineConfigurationBuilder {
        EngineConfigurationBuilder::default()
    }

    pub fn dialects(&self) -> &[Dialect] {
        &self.dialects
    }

    pub fn element_definitions(&self) -> &ElementDefinitions {
        &self.element_definitions
    }

    pub fn attribute_definitions(&self) -> &AttributeDefinitions {
        &self.attribute_definitions
    }

    /// Element processors (tag and model) of a mode, in execution order
    pub fn element_processors(&self, template_mode: TemplateMode) -> &[ElementProcessor] {
        self.element_processors
            .get(&template_mode)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Non-element processors of a mode
    pub fn processors(&self, template_mode: TemplateMode) -> Arc<ModeProcessors> {
        self.processors
            .get(&template_mode)
            .cloned()
            .unwrap_or_default()
    }
}

impl fmt::Debug for EngineConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfiguration")
            .field("dialects", &self.dialects)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EngineConfiguration`]
#[derive(Default)]
pub struct EngineConfigurationBuilder {
    dialects: Vec<Dialect>,
}

impl EngineConfigurationBuilder {
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialects.push(dialect);
        self
    }

    pub fn dialects(mut self, dialects: impl IntoIterator<Item = Dialect>) -> Self {
        self.dialects.extend(dialects);
        self
    }

    pub fn build(self) -> Result<EngineConfiguration> {
        let mut prefixes = HashSet::new();
        let mut names = HashSet::new();
        for dialect in &self.dialects {
            if !names.insert(dialect.name().to_owned()) {
                return Err(Error::config_owned(format!(
                    "Dialect '{}' is registered more than once",
                    dialect.name()
                )));
            }
            if let Some(prefix) = dialect.prefix() {
                if !prefixes.insert(prefix.to_ascii_lowercase()) {
                    return Err(Error::config_owned(format!(
                        "Dialect '{}' uses prefix '{prefix}', already used by another dialect",
                        dialect.name()
                    )));
                }
            }
        }

        let mut element_processors: ProcessorsByMode = HashMap::new();
        let mut processors: HashMap<TemplateMode, ModeProcessors> = HashMap::new();
        let mut id = 0;

        for dialect in &self.dialects {
            for registration in dialect.processors() {
                registration.validate()?;
                let order = ProcessorOrder {
                    dialect_precedence: dialect.precedence(),
                    precedence: registration.precedence(),
                    id,
                };
                id += 1;

                let mode = registration.template_mode();
                let set = processors.entry(mode).or_default();
                match registration.clone() {
                    ProcessorRegistration::ElementTag(p) => element_processors
                        .entry(mode)
                        .or_default()
                        .push(ElementProcessor::new(order, ElementProcessorKind::Tag(p))),
                    ProcessorRegistration::ElementModel(p) => element_processors
                        .entry(mode)
                        .or_default()
                        .push(ElementProcessor::new(order, ElementProcessorKind::Model(p))),
                    ProcessorRegistration::Text(processor) => set.text.push(Registered { order, processor }),
                    ProcessorRegistration::Comment(processor) => set.comment.push(Registered { order, processor }),
                    ProcessorRegistration::CDataSection(processor) => {
                        set.cdata_section.push(Registered { order, processor })
                    }
                    ProcessorRegistration::DocType(processor) => set.doctype.push(Registered { order, processor }),
                    ProcessorRegistration::ProcessingInstruction(processor) => {
                        set.processing_instruction.push(Registered { order, processor })
                    }
                    ProcessorRegistration::XmlDeclaration(processor) => {
                        set.xml_declaration.push(Registered { order, processor })
                    }
                    ProcessorRegistration::TemplateBoundaries(processor) => {
                        set.template_boundaries.push(Registered { order, processor })
                    }
                }
            }
        }

        for list in element_processors.values_mut() {
            list.sort();
        }
        let processors = processors
            .into_iter()
            .map(|(mode, mut set)| {
                set.sort();
                (mode, Arc::new(set))
            })
            .collect();

        debug!(
            target: "thymeleaf.engine",
            "engine configured with {} dialects and {id} processors",
            self.dialects.len()
        );

        Ok(EngineConfiguration {
            element_definitions: ElementDefinitions::new(element_processors.clone())?,
            attribute_definitions: AttributeDefinitions::new(element_processors.clone())?,
            dialects: self.dialects,
            element_processors,
            processors,
        })
    }
}

// ----------------------------------------------------------------------------
// Template configuration
// ----------------------------------------------------------------------------

/// How parsed templates are cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Parse on every call
    None,
    /// Cache in the manager's own cache
    Normal,
    /// Cache in the process-wide cache, shared by every manager
    Aggressive,
}

#[derive(Debug, Clone)]
pub struct TemplateConfig {
    pub(crate) cache_mode: CacheMode,
    pub(crate) cache_capacity: usize,
}

impl TemplateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Maximum number of parsed templates kept by the manager's cache
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn aggressive_caching() -> Self {
        Self {
            cache_mode: CacheMode::Aggressive,
            ..Self::default()
        }
    }

    pub fn no_caching() -> Self {
        Self {
            cache_mode: CacheMode::None,
            ..Self::default()
        }
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::Normal,
            cache_capacity: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineContext;
    use crate::event::Comment;
    use crate::processor::{EventProcessor, Processor};
    use crate::structure::EventStructureHandler;
    use pretty_assertions::assert_eq;

    struct Uppercase {
        mode: TemplateMode,
        precedence: i32,
    }

    impl Processor for Uppercase {
        fn template_mode(&self) -> TemplateMode {
            self.mode
        }

        fn precedence(&self) -> i32 {
            self.precedence
        }
    }

    impl EventProcessor<Comment> for Uppercase {
        fn process(
            &self,
            _context: &mut dyn EngineContext,
            comment: &Comment,
            handler: &mut EventStructureHandler<Comment>,
        ) -> Result<()> {
            handler.set(comment.with_content(&comment.content().to_uppercase()));
            Ok(())
        }
    }

    fn uppercase(mode: TemplateMode, precedence: i32) -> Uppercase {
        Uppercase { mode, precedence }
    }

    #[test]
    fn test_processors_sorted_per_mode() {
        let configuration = EngineConfiguration::builder()
            .dialect(
                Dialect::new("low", Some("lo"), 10)
                    .with_comment_processor(uppercase(TemplateMode::Html, 500))
                    .with_comment_processor(uppercase(TemplateMode::Xml, 1)),
            )
            .dialect(Dialect::new("high", Some("hi"), 1).with_comment_processor(uppercase(TemplateMode::Html, 900)))
            .build()
            .unwrap();

        let html = configuration.processors(TemplateMode::Html);
        let order: Vec<(i32, i32)> = html
            .comment
            .iter()
            .map(|p| (p.order().dialect_precedence, p.order().precedence))
            .collect();
        assert_eq!(order, vec![(1, 900), (10, 500)]);
        assert_eq!(configuration.processors(TemplateMode::Xml).comment.len(), 1);
        assert!(configuration.processors(TemplateMode::Text).is_empty());
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let err = EngineConfiguration::builder()
            .dialect(Dialect::new("one", Some("th"), 1))
            .dialect(Dialect::new("two", Some("TH"), 2))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("prefix 'TH'"));
    }

    #[test]
    fn test_raw_mode_processors_rejected() {
        let result = EngineConfiguration::builder()
            .dialect(Dialect::new("raw", None, 1).with_comment_processor(uppercase(TemplateMode::Raw, 1)))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_template_config_presets() {
        assert_eq!(TemplateConfig::default().cache_mode(), CacheMode::Normal);
        assert_eq!(TemplateConfig::no_caching().cache_mode(), CacheMode::None);
        let config = TemplateConfig::aggressive_caching().with_cache_capacity(5);
        assert_eq!(config.cache_mode(), CacheMode::Aggressive);
        assert_eq!(config.cache_capacity(), 5);
    }
}
