//! Test dialect shared by the integration tests
//!
//! A small `th` dialect over a regex-based expression language: `${a.b}`
//! looks up a (dotted) context variable, `'x'` is a literal, and anything else
//! is text with its `${...}` placeholders substituted. Registered for both HTML
//! and TEXT template modes.

#![allow(dead_code)]

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use thymeleaf_events::{
    Dialect, ElementModelProcessor, ElementModelStructureHandler, ElementTag, ElementTagProcessor,
    ElementTagStructureHandler, EngineConfiguration, EngineContext, Error, EventProcessor,
    EventStructureHandler, MatchingAttributeName, MatchingElementName, Model, Processor, Result,
    TemplateEvent, TemplateManager, TemplateMode, Text,
};

pub const PREFIX: &str = "th";

static VARIABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{\s*([\w.]+)\s*\}").unwrap());
static LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^'([^']*)'$").unwrap());
static EACH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\w+)\s*(?:,\s*(\w+)\s*)?:\s*(.+?)\s*$").unwrap());
static WITH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\w+)\s*=\s*(.+?)\s*$").unwrap());
static INLINED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[(.+?)\]\]").unwrap());

// ----------------------------------------------------------------------------
// Expressions
// ----------------------------------------------------------------------------

pub fn lookup(context: &dyn EngineContext, path: &str) -> Value {
    let mut parts = path.split('.');
    let mut value = match parts.next().and_then(|first| context.variable(first)) {
        Some(value) => value.clone(),
        None => return Value::Null,
    };
    for part in parts {
        let next = match part.parse::<usize>() {
            Ok(index) => value.get(index),
            Err(_) => value.get(part),
        };
        value = next.cloned().unwrap_or(Value::Null);
    }
    value
}

pub fn evaluate(context: &dyn EngineContext, expression: &str) -> Value {
    let expression = expression.trim();
    if let Some(caps) = LITERAL.captures(expression) {
        return Value::String(caps[1].to_owned());
    }
    if let Some(caps) = VARIABLE.captures(expression) {
        if caps[0].len() == expression.len() {
            return lookup(context, &caps[1]);
        }
    }
    let substituted = VARIABLE.replace_all(expression, |caps: &Captures| display(&lookup(context, &caps[1])));
    Value::String(substituted.into_owned())
}

pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Processors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum AttributeKind {
    /// Replace the body with the escaped value
    Text,
    /// `item[, status] : ${iterable}`
    Each,
    /// `name = expression`, local to the element
    With,
    /// Set the `class` attribute
    Class,
    /// `all`, `tag`, `body` or `all-but-first`
    Remove,
    /// Raise the context level without ever lowering it again
    Unbalance,
}

pub struct AttributeProcessor {
    template_mode: TemplateMode,
    attribute: MatchingAttributeName,
    precedence: i32,
    kind: AttributeKind,
}

impl AttributeProcessor {
    pub fn new(template_mode: TemplateMode, name: &str, precedence: i32, kind: AttributeKind) -> Self {
        Self {
            template_mode,
            attribute: MatchingAttributeName::for_prefixed_attribute_name(template_mode, Some(PREFIX), name)
                .unwrap(),
            precedence,
            kind,
        }
    }
}

impl Processor for AttributeProcessor {
    fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }

    fn precedence(&self) -> i32 {
        self.precedence
    }
}

impl ElementTagProcessor for AttributeProcessor {
    fn matching_attribute_name(&self) -> Option<&MatchingAttributeName> {
        Some(&self.attribute)
    }

    fn process(
        &self,
        context: &mut dyn EngineContext,
        tag: &ElementTag,
        handler: &mut ElementTagStructureHandler,
    ) -> Result<()> {
        let Some(attribute) = tag
            .attributes()
            .iter()
            .find(|a| self.attribute.matches(a.attribute_name()))
        else {
            return Ok(());
        };
        let value = attribute.value().unwrap_or_default().to_owned();
        handler.remove_attribute(attribute.complete_name());

        match self.kind {
            AttributeKind::Text => handler.set_body_text(&display(&evaluate(&*context, &value)), false),
            AttributeKind::Each => {
                let caps = EACH
                    .captures(&value)
                    .ok_or_else(|| Error::processing_owned(format!("Bad iteration '{value}'")))?;
                let iterable = evaluate(&*context, &caps[3]);
                handler.iterate_element(&caps[1], caps.get(2).map(|m| m.as_str()), iterable);
            }
            AttributeKind::With => {
                let caps = WITH
                    .captures(&value)
                    .ok_or_else(|| Error::processing_owned(format!("Bad assignment '{value}'")))?;
                let assigned = evaluate(&*context, &caps[2]);
                handler.set_local_variable(&caps[1], assigned);
            }
            AttributeKind::Class => handler.set_attribute("class", &display(&evaluate(&*context, &value))),
            AttributeKind::Remove => match value.trim() {
                "all" => handler.remove_element(),
                "tag" => handler.remove_tags(),
                "body" => handler.remove_body(),
                "all-but-first" => handler.remove_all_but_first_child(),
                other => return Err(Error::processing_owned(format!("Bad removal '{other}'"))),
            },
            AttributeKind::Unbalance => context.increase_level(),
        }
        Ok(())
    }
}

/// `th:block` elements only show their body
pub struct BlockElementProcessor {
    template_mode: TemplateMode,
    element: MatchingElementName,
}

impl BlockElementProcessor {
    pub fn new(template_mode: TemplateMode) -> Self {
        Self {
            template_mode,
            element: MatchingElementName::for_prefixed_element_name(template_mode, Some(PREFIX), "block").unwrap(),
        }
    }
}

impl Processor for BlockElementProcessor {
    fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }

    fn precedence(&self) -> i32 {
        100_000
    }
}

impl ElementTagProcessor for BlockElementProcessor {
    fn matching_element_name(&self) -> Option<&MatchingElementName> {
        Some(&self.element)
    }

    fn process(
        &self,
        _context: &mut dyn EngineContext,
        _tag: &ElementTag,
        handler: &mut ElementTagStructureHandler,
    ) -> Result<()> {
        handler.remove_tags();
        Ok(())
    }
}

/// `th:upper` uppercases every text in the element's subtree
pub struct UpperModelProcessor {
    template_mode: TemplateMode,
    attribute: MatchingAttributeName,
}

impl UpperModelProcessor {
    pub fn new(template_mode: TemplateMode) -> Self {
        Self {
            template_mode,
            attribute: MatchingAttributeName::for_prefixed_attribute_name(template_mode, Some(PREFIX), "upper")
                .unwrap(),
        }
    }
}

impl Processor for UpperModelProcessor {
    fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }
}

impl ElementModelProcessor for UpperModelProcessor {
    fn matching_attribute_name(&self) -> Option<&MatchingAttributeName> {
        Some(&self.attribute)
    }

    fn process(
        &self,
        _context: &mut dyn EngineContext,
        model: &mut Model,
        _handler: &mut ElementModelStructureHandler,
    ) -> Result<()> {
        for pos in 0..model.len() {
            match model.get(pos).cloned() {
                Some(TemplateEvent::OpenElement(mut open)) if pos == 0 => {
                    open.remove_attribute("th:upper");
                    model.replace(0, open)?;
                }
                Some(TemplateEvent::StandaloneElement(mut standalone)) if pos == 0 => {
                    standalone.remove_attribute("th:upper");
                    model.replace(0, standalone)?;
                }
                Some(TemplateEvent::Text(text)) => {
                    model.replace(pos, Text::new(&text.text().to_uppercase()))?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Replaces `[[expression]]` in texts with the expression's value
pub struct InlineTextProcessor {
    template_mode: TemplateMode,
}

impl Processor for InlineTextProcessor {
    fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }
}

impl EventProcessor<Text> for InlineTextProcessor {
    fn process(
        &self,
        context: &mut dyn EngineContext,
        text: &Text,
        handler: &mut EventStructureHandler<Text>,
    ) -> Result<()> {
        if !INLINED.is_match(text.text()) {
            return Ok(());
        }
        let context: &dyn EngineContext = context;
        let inlined = INLINED.replace_all(text.text(), |caps: &Captures| display(&evaluate(context, &caps[1])));
        handler.set_text(&inlined);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Setup
// ----------------------------------------------------------------------------

pub fn dialect() -> Dialect {
    let mut dialect = Dialect::new("test", Some(PREFIX), 1000);
    for mode in [TemplateMode::Html, TemplateMode::Text] {
        dialect = dialect
            .with_element_tag_processor(AttributeProcessor::new(mode, "each", 200, AttributeKind::Each))
            .with_element_tag_processor(AttributeProcessor::new(mode, "with", 600, AttributeKind::With))
            .with_element_tag_processor(AttributeProcessor::new(mode, "class", 1000, AttributeKind::Class))
            .with_element_tag_processor(AttributeProcessor::new(mode, "text", 1300, AttributeKind::Text))
            .with_element_tag_processor(AttributeProcessor::new(mode, "remove", 1600, AttributeKind::Remove))
            .with_element_tag_processor(AttributeProcessor::new(mode, "unbalance", 1700, AttributeKind::Unbalance))
            .with_element_tag_processor(BlockElementProcessor::new(mode))
            .with_element_model_processor(UpperModelProcessor::new(mode))
            .with_text_processor(InlineTextProcessor { template_mode: mode });
    }
    dialect
}

pub fn configuration() -> Arc<EngineConfiguration> {
    Arc::new(EngineConfiguration::builder().dialect(dialect()).build().unwrap())
}

pub fn manager() -> TemplateManager {
    TemplateManager::new(configuration())
}

pub fn process(template: &str, template_mode: TemplateMode, variables: &Value) -> Result<String> {
    manager().process(Some("test"), template, template_mode, variables)
}

pub fn process_html(template: &str, variables: &Value) -> String {
    process(template, TemplateMode::Html, variables).unwrap()
}
