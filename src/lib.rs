//! Event model and processing pipeline for a natural-templating engine
//!
//! Templates are parsed into a stream of events (text, comments, element
//! tags...) which flows through a chain of [`TemplateHandler`]s. The
//! [`ProcessorTemplateHandler`] applies the processors of the registered
//! [`Dialect`]s to that stream: processors bound to element or attribute names
//! can set an element's body, replace or remove it, insert models around it,
//! iterate it, or work on its whole subtree as a [`Model`]. An output handler
//! at the end of the chain writes the resulting events back as text.
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use thymeleaf_events::*;
//!
//! struct SetText(MatchingAttributeName);
//!
//! impl Processor for SetText {
//!     fn template_mode(&self) -> TemplateMode {
//!         TemplateMode::Html
//!     }
//! }
//!
//! impl ElementTagProcessor for SetText {
//!     fn matching_attribute_name(&self) -> Option<&MatchingAttributeName> {
//!         Some(&self.0)
//!     }
//!
//!     fn process(&self, _: &mut dyn EngineContext, tag: &ElementTag, handler: &mut ElementTagStructureHandler) -> Result<()> {
//!         let value = tag.attribute_value("th:text").unwrap_or_default().trim_matches('\'').to_owned();
//!         handler.remove_attribute("th:text");
//!         handler.set_body_text(&value, false);
//!         Ok(())
//!     }
//! }
//!
//! let dialect = Dialect::new("standard", Some("th"), 1000)
//!     .with_element_tag_processor(SetText(MatchingAttributeName::for_attribute_name(TemplateMode::Html, "th:text")?));
//! let manager = TemplateManager::new(Arc::new(EngineConfiguration::builder().dialect(dialect).build()?));
//!
//! let html = manager.process(None, "<div th:text=\"'hi'\">old</div>", TemplateMode::Html, &json!({}))?;
//! assert_eq!(html, "<div>hi</div>");
//! ```

pub mod attributes;
pub mod cache;
pub mod config;
pub mod context;
pub mod definitions;
pub mod error;
pub mod event;
pub mod event_queue;
mod gathering;
pub mod model;
pub mod model_controller;
pub mod names;
pub mod parser;
pub mod processor;
mod processor_iterator;
pub mod processor_template_handler;
pub mod structure;
pub mod template_handler;
pub mod template_manager;
pub mod template_mode;

pub use attributes::{Attribute, AttributeValueQuotes, Attributes};
pub use config::{CacheMode, EngineConfiguration, EngineConfigurationBuilder, TemplateConfig};
pub use context::{EngineContext, Inliner, NoOpInliner, StandardEngineContext, TemplateData};
pub use definitions::{AttributeDefinition, ElementDefinition, HtmlElementType};
pub use error::{Error, Location, Result};
pub use event::{
    CDataSection, CloseElementTag, Comment, DocType, ElementTag, EventLocation, OpenElementTag,
    ProcessingInstruction, StandaloneElementTag, TemplateEnd, TemplateEvent, TemplateStart, Text,
    XmlDeclaration,
};
pub use event_queue::EngineEventQueue;
pub use gathering::IterationStatus;
pub use model::{ImmutableModel, Model, ModelFactory};
pub use model_controller::SkipBody;
pub use names::{AttributeName, AttributeNames, ElementName, ElementNames};
pub use processor::{
    Dialect, ElementModelProcessor, ElementTagProcessor, EventProcessor, MatchingAttributeName,
    MatchingElementName, Processor, TemplateBoundariesProcessor,
};
pub use processor_template_handler::ProcessorTemplateHandler;
pub use structure::{
    ElementModelStructureHandler, ElementTagStructureHandler, EventStructureHandler,
    TemplateBoundariesStructureHandler,
};
pub use template_handler::{OutputTemplateHandler, TemplateHandler, TemplateHandlerAdapter};
pub use template_manager::TemplateManager;
pub use template_mode::TemplateMode;
