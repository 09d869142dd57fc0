//! Gathered models
//!
//! While a subtree is being gathered, every event the controller sees is
//! appended to a [`GatheredModel`] instead of being processed. Once the
//! subtree is complete, the gathered events are replayed through the
//! dispatcher:
//!
//! - once, for a delayed model (an element model processor needed the whole
//!   subtree before executing)
//! - once per item, for an iterated model (`iterate_element`), with the
//!   iteration variable and its status set in a fresh context level

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::{CloseElementTag, OpenElementTag, StandaloneElementTag, TemplateEvent, Text};
use crate::model::Model;
use crate::model_controller::SkipBody;
use crate::processor_template_handler::{ProcessorExecutionVars, ProcessorTemplateHandler};
use crate::template_handler::TemplateHandler;
use crate::template_mode::TemplateMode;

/// What to iterate, and the variables to iterate with
#[derive(Debug, Clone)]
pub(crate) struct IterationSpec {
    pub(crate) iter_variable: String,
    pub(crate) status_variable: Option<String>,
    pub(crate) iterable: Value,
}

/// Value of the status variable exposed during an iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationStatus {
    /// Zero-based
    pub index: usize,
    /// One-based
    pub count: usize,
    pub size: usize,
    pub current: Value,
    pub even: bool,
    pub odd: bool,
    pub first: bool,
    pub last: bool,
}

impl IterationStatus {
    pub fn new(index: usize, size: usize, current: Value) -> Self {
        let count = index + 1;
        Self {
            index,
            count,
            size,
            current,
            even: count % 2 == 0,
            odd: count % 2 != 0,
            first: index == 0,
            last: count == size,
        }
    }
}

/// Items iterated for a value: array elements, object entries as
/// `{"key": .., "value": ..}`, nothing for `null` and the value itself for
/// anything else
pub(crate) fn iteration_items(iterable: &Value) -> Vec<Value> {
    match iterable {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| serde_json::json!({ "key": key, "value": value }))
            .collect(),
        other => vec![other.clone()],
    }
}

#[derive(Debug)]
enum GatheringKind {
    Delayed,
    Iterated {
        spec: IterationSpec,
        preceding_white_space: Option<Text>,
    },
}

/// State restored in the dispatcher when a gathered model is replayed: the
/// execution variables of the gathered tag, plus (for delayed models) the
/// model to hand to the suspended model processor
#[derive(Debug, Clone)]
pub(crate) struct GatheringResume {
    pub(crate) vars: ProcessorExecutionVars,
    pub(crate) inner_model: Option<Model>,
    pub(crate) build_time_skip_body: SkipBody,
    pub(crate) build_time_skip_close_tag: bool,
}

#[derive(Debug)]
pub(crate) struct GatheredModel {
    kind: GatheringKind,
    vars: ProcessorExecutionVars,
    model: Model,
    gathering_level: usize,
    finished: bool,
    build_time_skip_body: SkipBody,
    build_time_skip_close_tag: bool,
}

impl GatheredModel {
    pub(crate) fn delayed(
        template_mode: TemplateMode,
        vars: ProcessorExecutionVars,
        build_time_skip_body: SkipBody,
        build_time_skip_close_tag: bool,
    ) -> Self {
        Self::with_kind(
            GatheringKind::Delayed,
            template_mode,
            vars,
            build_time_skip_body,
            build_time_skip_close_tag,
        )
    }

    pub(crate) fn iterated(
        template_mode: TemplateMode,
        vars: ProcessorExecutionVars,
        build_time_skip_body: SkipBody,
        build_time_skip_close_tag: bool,
        spec: IterationSpec,
        preceding_white_space: Option<Text>,
    ) -> Self {
        Self::with_kind(
            GatheringKind::Iterated {
                spec,
                preceding_white_space,
            },
            template_mode,
            vars,
            build_time_skip_body,
            build_time_skip_close_tag,
        )
    }

    fn with_kind(
        kind: GatheringKind,
        template_mode: TemplateMode,
        vars: ProcessorExecutionVars,
        build_time_skip_body: SkipBody,
        build_time_skip_close_tag: bool,
    ) -> Self {
        Self {
            kind,
            vars,
            model: Model::new(template_mode),
            gathering_level: 0,
            finished: false,
            build_time_skip_body,
            build_time_skip_close_tag,
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn model(&self) -> &Model {
        &self.model
    }

    fn check_not_finished(&self) -> Result<()> {
        if self.finished {
            return Err(Error::processing_static(
                "Gathering is finished already! We cannot gather more events",
            ));
        }
        Ok(())
    }

    /// Gather any event, routing element tags to their specific methods
    pub(crate) fn gather(&mut self, event: TemplateEvent) -> Result<()> {
        match event {
            TemplateEvent::OpenElement(tag) => self.gather_open_element(tag),
            TemplateEvent::StandaloneElement(tag) => self.gather_standalone_element(tag),
            TemplateEvent::CloseElement(tag) => self.gather_close_element(tag),
            other => {
                self.check_not_finished()?;
                self.model.build(other);
                Ok(())
            }
        }
    }

    pub(crate) fn gather_open_element(&mut self, tag: OpenElementTag) -> Result<()> {
        self.check_not_finished()?;
        self.model.build(tag.into());
        self.gathering_level += 1;
        Ok(())
    }

    pub(crate) fn gather_standalone_element(&mut self, tag: StandaloneElementTag) -> Result<()> {
        self.check_not_finished()?;
        self.model.build(tag.into());
        if self.gathering_level == 0 {
            self.finished = true;
        }
        Ok(())
    }

    pub(crate) fn gather_close_element(&mut self, tag: CloseElementTag) -> Result<()> {
        self.check_not_finished()?;
        if tag.is_unmatched() {
            self.model.build(tag.into());
            return Ok(());
        }
        self.gathering_level = self.gathering_level.saturating_sub(1);
        self.model.build(tag.into());
        if self.gathering_level == 0 {
            self.finished = true;
        }
        Ok(())
    }

    fn resume(&self, with_model: bool) -> GatheringResume {
        GatheringResume {
            vars: self.vars.clone(),
            inner_model: with_model.then(|| self.model.clone()),
            build_time_skip_body: self.build_time_skip_body,
            build_time_skip_close_tag: self.build_time_skip_close_tag,
        }
    }

    fn prepare_processing<N: TemplateHandler>(
        &self,
        handler: &mut ProcessorTemplateHandler<'_, N>,
        with_model: bool,
    ) -> Result<()> {
        handler.set_current_gathering(self.resume(with_model));
        handler
            .controller_mut()
            .skip(self.build_time_skip_body, self.build_time_skip_close_tag)
    }

    /// Replay the gathered events through `handler`
    pub(crate) fn process<N: TemplateHandler>(self, handler: &mut ProcessorTemplateHandler<'_, N>) -> Result<()> {
        match &self.kind {
            GatheringKind::Delayed => {
                debug!(target: "thymeleaf.engine.gathering", "processing delayed model of {} events", self.model.len());
                self.prepare_processing(handler, true)?;
                self.model.process(handler)?;
                handler.context_mut().decrease_level();
                Ok(())
            }
            GatheringKind::Iterated {
                spec,
                preceding_white_space,
            } => self.process_iterated(handler, spec, preceding_white_space.as_ref()),
        }
    }

    fn process_iterated<N: TemplateHandler>(
        &self,
        handler: &mut ProcessorTemplateHandler<'_, N>,
        spec: &IterationSpec,
        preceding_white_space: Option<&Text>,
    ) -> Result<()> {
        let items = iteration_items(&spec.iterable);
        let size = items.len();
        let status_variable = spec
            .status_variable
            .clone()
            .unwrap_or_else(|| format!("{}Stat", spec.iter_variable));
        debug!(
            target: "thymeleaf.engine.gathering",
            "iterating {} events over {size} items as '{}'",
            self.model.len(),
            spec.iter_variable
        );

        if size == 0 {
            // The element let through by `ProcessOneElement` was iterated zero
            // times: the next one must not take its place
            let skip_body = match self.build_time_skip_body {
                SkipBody::ProcessOneElement => SkipBody::SkipElements,
                other => other,
            };
            handler
                .controller_mut()
                .skip(skip_body, self.build_time_skip_close_tag)?;
        } else {
            let models = IterationModels::compute(&self.model, size, preceding_white_space)?;
            for (index, current) in items.into_iter().enumerate() {
                let model = if index == 0 {
                    &models.first
                } else if index + 1 < size {
                    &models.middle
                } else {
                    &models.last
                };
                let status = serde_json::to_value(IterationStatus::new(index, size, current.clone()))?;

                let context = handler.context_mut();
                context.increase_level();
                context.set_variable(&spec.iter_variable, current);
                context.set_variable(&status_variable, status);
                self.prepare_processing(handler, false)?;
                model.process(handler)?;
                handler.context_mut().decrease_level();
            }
        }

        handler.context_mut().decrease_level();
        Ok(())
    }
}

/// Variants of the gathered model for the first, middle and last iteration
#[derive(Debug)]
struct IterationModels {
    first: Model,
    middle: Model,
    last: Model,
}

impl IterationModels {
    fn same(model: &Model) -> Self {
        Self {
            first: model.clone(),
            middle: model.clone(),
            last: model.clone(),
        }
    }

    fn compute(inner: &Model, size: usize, preceding_white_space: Option<&Text>) -> Result<Self> {
        if size == 1 {
            return Ok(Self::same(inner));
        }
        let mode = inner.template_mode();
        if !mode.is_text() {
            return Ok(match preceding_white_space {
                Some(white_space) => {
                    let mut with_white_space = inner.clone();
                    with_white_space.insert(0, white_space.clone())?;
                    Self {
                        first: inner.clone(),
                        middle: with_white_space.clone(),
                        last: with_white_space,
                    }
                }
                None => Self::same(inner),
            });
        }
        Self::reshape_text_body(inner)
    }

    /// Drop the line breaks around the body of an iterated textual element
    /// from the iterations that do not need them, so repeating the body does
    /// not add blank lines
    fn reshape_text_body(inner: &Model) -> Result<Self> {
        let len = inner.len();
        if len <= 2 {
            return Ok(Self::same(inner));
        }

        let first_text = match (inner.get(0), inner.get(1)) {
            (Some(TemplateEvent::OpenElement(_)), Some(TemplateEvent::Text(text))) => text,
            _ => return Ok(Self::same(inner)),
        };
        let first_cut = match leading_line_break(first_text.text()) {
            Some(cut) => cut,
            None => return Ok(Self::same(inner)),
        };
        let last_text = match (inner.get(len - 1), inner.get(len - 2)) {
            (Some(TemplateEvent::CloseElement(_)), Some(TemplateEvent::Text(text))) => text,
            _ => return Ok(Self::same(inner)),
        };
        let last_cut = match trailing_line_break(last_text.text()) {
            Some(cut) => cut,
            None => return Ok(Self::same(inner)),
        };

        let mut models = Self::same(inner);
        if len == 3 {
            // Body is a single text: both cuts apply to it
            let text_len = first_text.len();
            let middle_range = first_cut.min(last_cut)..last_cut;
            models.first.replace(1, first_text.sub_text(0..last_cut))?;
            models.middle.replace(1, first_text.sub_text(middle_range))?;
            models.last.replace(1, first_text.sub_text(first_cut..text_len))?;
            return Ok(models);
        }

        if first_cut > 0 {
            let head = first_text.sub_text(first_cut..first_text.len());
            models.middle.replace(1, head.clone())?;
            models.last.replace(1, head)?;
        }
        if last_cut < last_text.len() {
            let tail = last_text.sub_text(0..last_cut);
            models.first.replace(len - 2, tail.clone())?;
            models.middle.replace(len - 2, tail)?;
        }
        Ok(models)
    }
}

/// Position right after the first line break, if only whitespace precedes it
fn leading_line_break(text: &str) -> Option<usize> {
    for (i, c) in text.char_indices() {
        if c == '\n' {
            return Some(i + 1);
        }
        if !c.is_whitespace() {
            return None;
        }
    }
    None
}

/// Position right after the last line break, if only whitespace follows it
fn trailing_line_break(text: &str) -> Option<usize> {
    for (i, c) in text.char_indices().rev() {
        if c == '\n' {
            return Some(i + 1);
        }
        if !c.is_whitespace() {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfiguration;
    use crate::model::ModelFactory;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn text_body(body: &[&str]) -> Model {
        let configuration = Arc::new(EngineConfiguration::builder().build().unwrap());
        let factory = ModelFactory::new(configuration, TemplateMode::Text);
        let open = factory.create_open_element_tag("block", &[]).unwrap();
        let close = factory.create_close_element_tag_for(&open);
        let mut model = factory.create_model();
        model.add(open).unwrap();
        for text in body {
            model.add(Text::new(text)).unwrap();
        }
        model.add(close).unwrap();
        model
    }

    fn strings(models: &IterationModels) -> (String, String, String) {
        (models.first.to_string(), models.middle.to_string(), models.last.to_string())
    }

    #[test]
    fn test_iteration_status() {
        let status = IterationStatus::new(1, 3, json!("b"));
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "index": 1, "count": 2, "size": 3, "current": "b",
                "even": true, "odd": false, "first": false, "last": false
            })
        );
        assert!(IterationStatus::new(2, 3, json!(null)).last);
    }

    #[test]
    fn test_iteration_items() {
        assert!(iteration_items(&json!(null)).is_empty());
        assert_eq!(iteration_items(&json!([1, 2])), vec![json!(1), json!(2)]);
        assert_eq!(iteration_items(&json!("x")), vec![json!("x")]);
        assert_eq!(
            iteration_items(&json!({"a": 1})),
            vec![json!({"key": "a", "value": 1})]
        );
    }

    #[test]
    fn test_single_text_body_is_cut() {
        let inner = text_body(&["\n  - [[X]]\n"]);
        let models = IterationModels::compute(&inner, 3, None).unwrap();
        assert_eq!(
            strings(&models),
            (
                "[#block]\n  - [[X]]\n[/block]".to_string(),
                "[#block]  - [[X]]\n[/block]".to_string(),
                "[#block]  - [[X]]\n[/block]".to_string(),
            )
        );
    }

    #[test]
    fn test_separate_head_and_tail_texts() {
        let inner = text_body(&["\n  a", "b\n  "]);
        let models = IterationModels::compute(&inner, 2, None).unwrap();
        assert_eq!(
            strings(&models),
            (
                "[#block]\n  ab\n[/block]".to_string(),
                "[#block]  ab\n[/block]".to_string(),
                "[#block]  ab\n  [/block]".to_string(),
            )
        );
    }

    #[test]
    fn test_non_whitespace_before_line_break_prevents_cut() {
        let inner = text_body(&["x\n", "y\n"]);
        let models = IterationModels::compute(&inner, 3, None).unwrap();
        let (first, middle, last) = strings(&models);
        assert_eq!(first, middle);
        assert_eq!(middle, last);
    }

    #[test]
    fn test_gathering_after_finish_fails() {
        let inner = text_body(&[]);
        let mut gathered = GatheredModel::delayed(TemplateMode::Text, ProcessorExecutionVars::default(), SkipBody::Process, false);
        for event in inner.iter() {
            gathered.gather(event.clone()).unwrap();
        }
        assert!(gathered.is_finished());
        assert!(gathered.gather(Text::new("late").into()).is_err());
    }
}
