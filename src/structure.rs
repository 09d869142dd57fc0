//! Structure handlers
//!
//! A processor never mutates the event stream directly. It records what it
//! wants done on the structure handler it is given, and the dispatcher applies
//! those instructions once the processor returns.
//!
//! Instructions fall in two groups:
//!
//! - structural actions (set body, replace, remove, iterate...), of which only
//!   the last one recorded is kept
//! - context modifications (local variables, selection target, inliner,
//!   template data), which all compose

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::attributes::AttributeValueQuotes;
use crate::context::{EngineContext, Inliner, TemplateData};
use crate::definitions::AttributeDefinitions;
use crate::error::Result;
use crate::event::{ElementTag, Text};
use crate::model::Model;
use crate::names::AttributeNames;
use crate::template_mode::TemplateMode;

/// Body or replacement content: plain text or a whole model
#[derive(Debug, Clone)]
pub enum Content {
    Text(String),
    Model(Model),
}

impl Content {
    pub(crate) fn into_model(self, template_mode: TemplateMode) -> Result<Model> {
        match self {
            Content::Model(model) => Ok(model),
            Content::Text(text) => {
                let mut model = Model::new(template_mode);
                model.add(Text::new(&text))?;
                Ok(model)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Context modifications
// ----------------------------------------------------------------------------

/// Context changes requested by a processor, applied at the current level
#[derive(Default)]
pub(crate) struct ContextModifications {
    // `None` removes the variable
    variables: IndexMap<String, Option<Value>>,
    selection_target: Option<Option<Value>>,
    inliner: Option<Option<Arc<dyn Inliner>>>,
    template_data: Option<TemplateData>,
}

impl ContextModifications {
    pub(crate) fn is_empty(&self) -> bool {
        self.variables.is_empty()
            && self.selection_target.is_none()
            && self.inliner.is_none()
            && self.template_data.is_none()
    }

    pub(crate) fn apply(&mut self, context: &mut dyn EngineContext) {
        if self.is_empty() {
            return;
        }
        for (name, value) in self.variables.drain(..) {
            match value {
                Some(value) => context.set_variable(&name, value),
                None => context.remove_variable(&name),
            }
        }
        if let Some(target) = self.selection_target.take() {
            context.set_selection_target(target);
        }
        if let Some(inliner) = self.inliner.take() {
            context.set_inliner(inliner);
        }
        if let Some(template_data) = self.template_data.take() {
            context.set_template_data(template_data);
        }
    }
}

impl fmt::Debug for ContextModifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextModifications")
            .field("variables", &self.variables)
            .field("selection_target", &self.selection_target)
            .field("inliner", &self.inliner.as_ref().map(|i| i.as_ref().map(|i| i.name().to_owned())))
            .field("template_data", &self.template_data)
            .finish()
    }
}

/// Context-modifying instructions shared by every structure handler
macro_rules! context_modification_methods {
    () => {
        /// Set a variable local to the element being processed
        pub fn set_local_variable(&mut self, name: &str, value: Value) {
            self.context_modifications
                .variables
                .insert(name.to_owned(), Some(value));
        }

        pub fn remove_local_variable(&mut self, name: &str) {
            self.context_modifications.variables.insert(name.to_owned(), None);
        }

        pub fn set_selection_target(&mut self, target: Option<Value>) {
            self.context_modifications.selection_target = Some(target);
        }

        /// Replace the inliner for the element body (`None` disables inlining)
        pub fn set_inliner(&mut self, inliner: Option<Arc<dyn Inliner>>) {
            self.context_modifications.inliner = Some(inliner);
        }

        pub fn set_template_data(&mut self, template_data: TemplateData) {
            self.context_modifications.template_data = Some(template_data);
        }

        pub(crate) fn apply_context_modifications(&mut self, context: &mut dyn EngineContext) {
            self.context_modifications.apply(context);
        }
    };
}

// ----------------------------------------------------------------------------
// Element tags
// ----------------------------------------------------------------------------

/// Structural effect requested by an element tag processor
#[derive(Debug, Default)]
pub(crate) enum ElementTagAction {
    #[default]
    None,
    SetBody {
        content: Content,
        processable: bool,
    },
    InsertBefore(Model),
    InsertImmediatelyAfter {
        model: Model,
        processable: bool,
    },
    ReplaceWith {
        content: Content,
        processable: bool,
    },
    RemoveElement,
    RemoveTags,
    RemoveBody,
    RemoveAllButFirstChild,
    Iterate {
        iter_variable: String,
        status_variable: Option<String>,
        iterable: Value,
    },
}

#[derive(Debug)]
enum AttributeInstruction {
    Set {
        name: String,
        value: Option<String>,
        quotes: Option<AttributeValueQuotes>,
    },
    Replace {
        old_name: String,
        name: String,
        value: Option<String>,
    },
    Remove {
        name: String,
    },
}

/// Instructions from an [`ElementTagProcessor`](crate::processor::ElementTagProcessor)
#[derive(Debug, Default)]
pub struct ElementTagStructureHandler {
    action: ElementTagAction,
    attributes: Vec<AttributeInstruction>,
    context_modifications: ContextModifications,
}

impl ElementTagStructureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_body_text(&mut self, text: &str, processable: bool) {
        self.action = ElementTagAction::SetBody {
            content: Content::Text(text.to_owned()),
            processable,
        };
    }

    pub fn set_body_model(&mut self, model: Model, processable: bool) {
        self.action = ElementTagAction::SetBody {
            content: Content::Model(model),
            processable,
        };
    }

    /// Output `model` right before the element; never processed
    pub fn insert_before(&mut self, model: Model) {
        self.action = ElementTagAction::InsertBefore(model);
    }

    /// Output `model` right after the open tag, before the original body
    pub fn insert_immediately_after(&mut self, model: Model, processable: bool) {
        self.action = ElementTagAction::InsertImmediatelyAfter { model, processable };
    }

    pub fn replace_with_text(&mut self, text: &str, processable: bool) {
        self.action = ElementTagAction::ReplaceWith {
            content: Content::Text(text.to_owned()),
            processable,
        };
    }

    pub fn replace_with_model(&mut self, model: Model, processable: bool) {
        self.action = ElementTagAction::ReplaceWith {
            content: Content::Model(model),
            processable,
        };
    }

    pub fn remove_element(&mut self) {
        self.action = ElementTagAction::RemoveElement;
    }

    /// Remove the open and close tags, keeping (and processing) the body
    pub fn remove_tags(&mut self) {
        self.action = ElementTagAction::RemoveTags;
    }

    pub fn remove_body(&mut self) {
        self.action = ElementTagAction::RemoveBody;
    }

    /// Keep only the first child element (non-element children are kept)
    pub fn remove_all_but_first_child(&mut self) {
        self.action = ElementTagAction::RemoveAllButFirstChild;
    }

    /// Repeat the element once per item of `iterable`
    ///
    /// `status_variable` defaults to `iter_variable` + `"Stat"`.
    pub fn iterate_element(&mut self, iter_variable: &str, status_variable: Option<&str>, iterable: Value) {
        self.action = ElementTagAction::Iterate {
            iter_variable: iter_variable.to_owned(),
            status_variable: status_variable.map(str::to_owned),
            iterable,
        };
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        self.attributes.push(AttributeInstruction::Set {
            name: name.to_owned(),
            value: Some(value.to_owned()),
            quotes: None,
        });
    }

    pub fn set_attribute_with_quotes(&mut self, name: &str, value: Option<&str>, quotes: AttributeValueQuotes) {
        self.attributes.push(AttributeInstruction::Set {
            name: name.to_owned(),
            value: value.map(str::to_owned),
            quotes: Some(quotes),
        });
    }

    /// Replace `old_name` with `name`, keeping the old attribute's position
    pub fn replace_attribute(&mut self, old_name: &str, name: &str, value: &str) {
        self.attributes.push(AttributeInstruction::Replace {
            old_name: old_name.to_owned(),
            name: name.to_owned(),
            value: Some(value.to_owned()),
        });
    }

    pub fn remove_attribute(&mut self, name: &str) {
        self.attributes.push(AttributeInstruction::Remove {
            name: name.to_owned(),
        });
    }

    context_modification_methods!();

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn take_action(&mut self) -> ElementTagAction {
        std::mem::take(&mut self.action)
    }

    /// Apply the attribute instructions to `tag`: removals first, then
    /// replacements, then sets
    pub(crate) fn apply_attributes(&mut self, tag: &mut ElementTag, definitions: &AttributeDefinitions) -> Result<()> {
        if self.attributes.is_empty() {
            return Ok(());
        }
        let instructions = std::mem::take(&mut self.attributes);
        let mode = tag.template_mode();

        for instruction in &instructions {
            if let AttributeInstruction::Remove { name } = instruction {
                tag.remove_attribute(name);
            }
        }
        for instruction in &instructions {
            if let AttributeInstruction::Replace { old_name, name, value } = instruction {
                let old = AttributeNames::for_name(mode, old_name)?;
                tag.attributes_mut().replace_attribute(
                    definitions,
                    mode,
                    &old,
                    None,
                    name,
                    value.as_deref(),
                    None,
                )?;
            }
        }
        for instruction in &instructions {
            if let AttributeInstruction::Set { name, value, quotes } = instruction {
                tag.attributes_mut()
                    .set_attribute(definitions, mode, None, name, value.as_deref(), *quotes)?;
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Element models
// ----------------------------------------------------------------------------

/// Instructions from an [`ElementModelProcessor`](crate::processor::ElementModelProcessor)
///
/// Structural changes are made on the model itself, so only context
/// modifications are recorded here.
#[derive(Debug, Default)]
pub struct ElementModelStructureHandler {
    context_modifications: ContextModifications,
}

impl ElementModelStructureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    context_modification_methods!();

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ----------------------------------------------------------------------------
// Non-element events
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum EventAction<E> {
    None,
    Set(E),
    ReplaceWith { model: Model, processable: bool },
    Remove,
}

/// Instructions from a processor of text, comments, doctypes...
#[derive(Debug)]
pub struct EventStructureHandler<E> {
    action: EventAction<E>,
}

impl<E> EventStructureHandler<E> {
    pub fn new() -> Self {
        Self {
            action: EventAction::None,
        }
    }

    /// Replace the event with a modified version of it
    pub fn set(&mut self, event: E) {
        self.action = EventAction::Set(event);
    }

    pub fn replace_with(&mut self, model: Model, processable: bool) {
        self.action = EventAction::ReplaceWith { model, processable };
    }

    pub fn remove(&mut self) {
        self.action = EventAction::Remove;
    }

    pub fn reset(&mut self) {
        self.action = EventAction::None;
    }

    pub(crate) fn take_action(&mut self) -> EventAction<E> {
        std::mem::replace(&mut self.action, EventAction::None)
    }
}

impl EventStructureHandler<Text> {
    pub fn set_text(&mut self, text: &str) {
        self.set(Text::new(text));
    }
}

impl<E> Default for EventStructureHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Template boundaries
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) enum BoundariesAction {
    #[default]
    None,
    Insert {
        content: Content,
        processable: bool,
    },
}

/// Instructions from a [`TemplateBoundariesProcessor`](crate::processor::TemplateBoundariesProcessor)
///
/// Inserted content goes right after the template start event (or right
/// before the template end event).
#[derive(Debug, Default)]
pub struct TemplateBoundariesStructureHandler {
    action: BoundariesAction,
    context_modifications: ContextModifications,
}

impl TemplateBoundariesStructureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert text, never processed
    pub fn insert_text(&mut self, text: &str) {
        self.action = BoundariesAction::Insert {
            content: Content::Text(text.to_owned()),
            processable: false,
        };
    }

    pub fn insert_model(&mut self, model: Model, processable: bool) {
        self.action = BoundariesAction::Insert {
            content: Content::Model(model),
            processable,
        };
    }

    context_modification_methods!();

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn take_action(&mut self) -> BoundariesAction {
        std::mem::take(&mut self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfiguration;
    use crate::context::{StandardEngineContext, TemplateData};
    use crate::model::ModelFactory;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn configuration() -> Arc<EngineConfiguration> {
        Arc::new(EngineConfiguration::builder().build().unwrap())
    }

    #[test]
    fn test_last_structural_action_wins() {
        let mut handler = ElementTagStructureHandler::new();
        handler.remove_body();
        handler.set_body_text("hi", false);
        match handler.take_action() {
            ElementTagAction::SetBody { content: Content::Text(text), processable } => {
                assert_eq!(text, "hi");
                assert!(!processable);
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(matches!(handler.take_action(), ElementTagAction::None));
    }

    #[test]
    fn test_context_modifications_compose() {
        let configuration = configuration();
        let mut ctx = StandardEngineContext::new(configuration, TemplateData::new(None, TemplateMode::Html));
        let mut handler = ElementTagStructureHandler::new();
        handler.set_local_variable("a", json!(1));
        handler.set_local_variable("b", json!(2));
        handler.remove_local_variable("a");
        handler.set_selection_target(Some(json!("sel")));
        handler.remove_element();
        handler.apply_context_modifications(&mut ctx);
        assert_eq!(ctx.variable("a"), None);
        assert_eq!(ctx.variable("b"), Some(&json!(2)));
        assert_eq!(ctx.selection_target(), Some(&json!("sel")));
        assert!(matches!(handler.take_action(), ElementTagAction::RemoveElement));
    }

    #[test]
    fn test_attribute_instructions_order() {
        let configuration = configuration();
        let factory = ModelFactory::new(Arc::clone(&configuration), TemplateMode::Html);
        let open = factory
            .create_open_element_tag("a", &[("th:href", "x"), ("id", "i")])
            .unwrap();
        let mut tag = open.into_tag();

        let mut handler = ElementTagStructureHandler::new();
        // Set is applied after the removal even though it was recorded first
        handler.set_attribute("id", "j");
        handler.remove_attribute("id");
        handler.replace_attribute("th:href", "href", "/home");
        handler
            .apply_attributes(&mut tag, configuration.attribute_definitions())
            .unwrap();

        assert_eq!(tag.attributes().to_string(), " href=\"/home\" id=\"j\"");
    }

    #[test]
    fn test_text_content_into_model() {
        let model = Content::Text("abc".to_string()).into_model(TemplateMode::Text).unwrap();
        assert_eq!(model.len(), 1);
        assert_eq!(model.to_string(), "abc");
    }

    #[test]
    fn test_event_structure_handler() {
        let mut handler: EventStructureHandler<Text> = EventStructureHandler::new();
        handler.set_text("new");
        match handler.take_action() {
            EventAction::Set(text) => assert_eq!(text.text(), "new"),
            other => panic!("unexpected action {other:?}"),
        }
        handler.remove();
        assert!(matches!(handler.take_action(), EventAction::Remove));
    }
}
