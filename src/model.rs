//! Models: sequences of events built or handled by processors
//!
//! A [`Model`] owns an [`EngineEventQueue`]. Processors receive models when
//! they execute on whole subtrees, and build models (usually through a
//! [`ModelFactory`]) to set bodies or replace elements. [`ImmutableModel`] is
//! a cheaply clonable, read-only view of a model, used where a model is
//! shared between several consumers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::attributes::{Attribute, AttributeValueQuotes, Attributes};
use crate::config::EngineConfiguration;
use crate::error::Result;
use crate::event::{
    CDataSection, CloseElementTag, Comment, ElementTag, OpenElementTag, StandaloneElementTag,
    TemplateEvent, Text,
};
use crate::event_queue::EngineEventQueue;
use crate::template_handler::TemplateHandler;
use crate::template_mode::TemplateMode;

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

fn next_stamp() -> u64 {
    NEXT_STAMP.fetch_add(1, Ordering::Relaxed)
}

/// Mutable sequence of template events
#[derive(Debug, Clone)]
pub struct Model {
    queue: EngineEventQueue,
    // Changes on every mutation; copies keep it until they diverge
    stamp: u64,
}

impl Model {
    pub fn new(template_mode: TemplateMode) -> Self {
        Self::from_queue(EngineEventQueue::new(template_mode))
    }

    /// Take over a queue as is, boundary events included
    pub fn from_queue(queue: EngineEventQueue) -> Self {
        Self {
            queue,
            stamp: next_stamp(),
        }
    }

    pub fn template_mode(&self) -> TemplateMode {
        self.queue.template_mode()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&TemplateEvent> {
        self.queue.get(pos)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TemplateEvent> {
        self.queue.iter()
    }

    /// Append an event. Template start and end events are rejected.
    pub fn add(&mut self, event: impl Into<TemplateEvent>) -> Result<()> {
        self.queue.add(event.into())?;
        self.touch();
        Ok(())
    }

    /// Insert at `pos`, which may be `len()` but not beyond
    pub fn insert(&mut self, pos: usize, event: impl Into<TemplateEvent>) -> Result<()> {
        self.queue.insert(pos, event.into())?;
        self.touch();
        Ok(())
    }

    pub fn replace(&mut self, pos: usize, event: impl Into<TemplateEvent>) -> Result<()> {
        self.queue.replace(pos, event.into())?;
        self.touch();
        Ok(())
    }

    /// Append a copy of the events of `model`, without its boundaries
    pub fn add_model(&mut self, model: &Model) -> Result<()> {
        self.queue.add_queue(&model.queue)?;
        self.touch();
        Ok(())
    }

    pub fn insert_model(&mut self, pos: usize, model: &Model) -> Result<()> {
        self.queue.insert_queue(pos, &model.queue)?;
        self.touch();
        Ok(())
    }

    pub fn remove(&mut self, pos: usize) -> Result<TemplateEvent> {
        let event = self.queue.remove(pos)?;
        self.touch();
        Ok(event)
    }

    pub fn reset(&mut self) {
        self.queue.reset();
        self.touch();
    }

    /// Whether `other` is this model or an untouched copy of it
    pub fn same_as(&self, other: &Model) -> bool {
        self.stamp == other.stamp
    }

    /// Replay the model's events into `handler`
    pub fn process(&self, handler: &mut dyn TemplateHandler) -> Result<()> {
        self.queue.process(handler)
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        self.queue.iter().try_for_each(|event| event.write(writer))
    }

    /// Freeze into a cheaply clonable snapshot
    pub fn into_immutable(self) -> ImmutableModel {
        ImmutableModel(Arc::new(self))
    }

    pub(crate) fn queue(&self) -> &EngineEventQueue {
        &self.queue
    }

    pub(crate) fn build(&mut self, event: TemplateEvent) {
        self.queue.build(event);
        self.touch();
    }

    fn touch(&mut self) {
        self.stamp = next_stamp();
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f)
    }
}

impl From<EngineEventQueue> for Model {
    fn from(queue: EngineEventQueue) -> Self {
        Self::from_queue(queue)
    }
}

/// Read-only, shareable model
#[derive(Debug, Clone)]
pub struct ImmutableModel(Arc<Model>);

impl ImmutableModel {
    /// Mode of the frozen model
    pub fn template_mode(&self) -> TemplateMode {
        self.0.template_mode()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Event at `pos`. Parsed templates keep their boundaries at 0 and
    /// `len() - 1`.
    pub fn get(&self, pos: usize) -> Option<&TemplateEvent> {
        self.0.get(pos)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TemplateEvent> {
        self.0.iter()
    }

    pub fn process(&self, handler: &mut dyn TemplateHandler) -> Result<()> {
        self.0.process(handler)
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        self.0.write(writer)
    }

    /// Mutable copy
    pub fn to_model(&self) -> Model {
        Model::clone(&self.0)
    }

    /// Borrow the frozen model, to splice it without copying it first
    pub fn as_model(&self) -> &Model {
        &self.0
    }
}

impl fmt::Display for ImmutableModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.write(f)
    }
}

impl From<Model> for ImmutableModel {
    fn from(model: Model) -> Self {
        model.into_immutable()
    }
}

/// Builds events and models for one template mode, resolving names against
/// the engine configuration's definitions
#[derive(Clone)]
pub struct ModelFactory {
    configuration: Arc<EngineConfiguration>,
    template_mode: TemplateMode,
}

impl ModelFactory {
    pub fn new(configuration: Arc<EngineConfiguration>, template_mode: TemplateMode) -> Self {
        Self {
            configuration,
            template_mode,
        }
    }

    pub fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }

    pub fn create_model(&self) -> Model {
        Model::new(self.template_mode)
    }

    /// Model holding a single event
    pub fn create_model_with(&self, event: impl Into<TemplateEvent>) -> Result<Model> {
        let mut model = self.create_model();
        model.add(event)?;
        Ok(model)
    }

    /// Parse a fragment of markup in this factory's template mode
    pub fn parse(&self, fragment: &str) -> Result<Model> {
        crate::parser::parse_fragment(&self.configuration, self.template_mode, fragment)
    }

    pub fn create_text(&self, text: &str) -> Text {
        Text::new(text)
    }

    pub fn create_comment(&self, content: &str) -> Comment {
        Comment::new(content)
    }

    pub fn create_cdata_section(&self, content: &str) -> CDataSection {
        CDataSection::new(content)
    }

    /// Open tag with double-quoted attributes, each preceded by a single space
    pub fn create_open_element_tag(&self, name: &str, attributes: &[(&str, &str)]) -> Result<OpenElementTag> {
        Ok(OpenElementTag::new(self.create_tag(name, attributes, false)?))
    }

    /// Open tag that is not written to the output (while its body is)
    pub fn create_synthetic_open_element_tag(&self, name: &str) -> Result<OpenElementTag> {
        Ok(OpenElementTag::new(self.create_tag(name, &[], true)?))
    }

    /// `minimized` picks `<br/>` over `<br>`
    pub fn create_standalone_element_tag(
        &self,
        name: &str,
        attributes: &[(&str, &str)],
        minimized: bool,
    ) -> Result<StandaloneElementTag> {
        Ok(StandaloneElementTag::new(self.create_tag(name, attributes, false)?, minimized))
    }

    pub fn create_close_element_tag(&self, name: &str) -> Result<CloseElementTag> {
        let definition = self
            .configuration
            .element_definitions()
            .for_name(self.template_mode, name)?;
        Ok(CloseElementTag::new(definition, name, false, false, None))
    }

    /// Close tag for an open tag built by this factory
    pub fn create_close_element_tag_for(&self, open: &ElementTag) -> CloseElementTag {
        CloseElementTag::closing(open)
    }

    fn create_tag(&self, name: &str, attributes: &[(&str, &str)], synthetic: bool) -> Result<ElementTag> {
        let definition = self
            .configuration
            .element_definitions()
            .for_name(self.template_mode, name)?;
        let mut built = Attributes::new();
        for (attribute_name, value) in attributes {
            let attribute_definition = self
                .configuration
                .attribute_definitions()
                .for_name(self.template_mode, attribute_name)?;
            built.push_white_space(" ");
            built.push_attribute(Attribute::new(
                attribute_definition,
                attribute_name,
                None,
                Some(value),
                AttributeValueQuotes::Double,
                None,
            ));
        }
        Ok(ElementTag::new(definition, name, built, synthetic, None))
    }
}

impl fmt::Debug for ModelFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFactory")
            .field("template_mode", &self.template_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn factory(mode: TemplateMode) -> ModelFactory {
        ModelFactory::new(Arc::new(EngineConfiguration::builder().build().unwrap()), mode)
    }

    #[test]
    fn test_build_and_write() {
        let factory = factory(TemplateMode::Html);
        let mut model = factory.create_model();
        let open = factory.create_open_element_tag("p", &[("class", "x")]).unwrap();
        let close = factory.create_close_element_tag_for(&open);
        model.add(open).unwrap();
        model.add(factory.create_text("hi")).unwrap();
        model.add(close).unwrap();
        model.add(factory.create_standalone_element_tag("br", &[], false).unwrap()).unwrap();
        assert_eq!(model.to_string(), "<p class=\"x\">hi</p><br>");
    }

    #[test]
    fn test_text_mode_tags() {
        let factory = factory(TemplateMode::Text);
        let mut model = factory.create_model();
        let open = factory.create_open_element_tag("item", &[("a", "1")]).unwrap();
        model.add(factory.create_close_element_tag_for(&open)).unwrap();
        model.insert(0, open).unwrap();
        assert_eq!(model.to_string(), "[#item a=\"1\"][/item]");
    }

    #[test]
    fn test_synthetic_tags_write_nothing() {
        let factory = factory(TemplateMode::Html);
        let mut model = factory.create_model();
        let open = factory.create_synthetic_open_element_tag("th:block").unwrap();
        model.add(factory.create_close_element_tag_for(&open)).unwrap();
        model.insert(0, open).unwrap();
        model.insert(1, factory.create_text("body")).unwrap();
        assert_eq!(model.to_string(), "body");
    }

    #[test]
    fn test_same_as_tracks_modifications() {
        let factory = factory(TemplateMode::Html);
        let mut model = factory.create_model();
        model.add(factory.create_text("a")).unwrap();
        let mut copy = model.clone();
        assert!(copy.same_as(&model));
        copy.replace(0, factory.create_text("b")).unwrap();
        assert!(!copy.same_as(&model));
        assert!(!factory.create_model().same_as(&factory.create_model()));
    }

    #[test]
    fn test_immutable_model_copies_on_demand() {
        let factory = factory(TemplateMode::Html);
        let mut model = factory.create_model();
        model.add(factory.create_text("a")).unwrap();
        let immutable = model.into_immutable();
        let shared = immutable.clone();
        let mut copy = shared.to_model();
        copy.add(factory.create_text("b")).unwrap();
        assert_eq!(immutable.to_string(), "a");
        assert_eq!(copy.to_string(), "ab");
    }
}
