//! Skip and gathering state machine
//!
//! Before handling an event the dispatcher asks the controller whether the
//! event should be processed. The answer depends on the skip state of the
//! current nesting level (set by processors removing bodies, replacing
//! elements...) and on whether a subtree is being gathered, in which case the
//! controller swallows the event into the gathered model.
//!
//! The controller also keeps the element nesting level in sync with the
//! context level: entering an element increases both, leaving it decreases
//! both.

use log::{debug, trace};

use crate::context::EngineContext;
use crate::error::{Error, Result};
use crate::event::{
    CDataSection, CloseElementTag, Comment, DocType, ElementTag, OpenElementTag, ProcessingInstruction,
    StandaloneElementTag, TemplateEvent, Text, XmlDeclaration,
};
use crate::gathering::{GatheredModel, IterationSpec};
use crate::processor_template_handler::ProcessorExecutionVars;
use crate::template_mode::TemplateMode;

const INITIAL_MODEL_LEVELS: usize = 25;

/// HTML elements after which the whitespace preceding an iteration is
/// repeated between iterations
const ITERATION_WHITESPACE_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "audio", "blockquote", "canvas", "dd", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hgroup", "hr", "li", "main", "nav", "noscript", "ol", "option", "output", "p",
    "pre", "section", "table", "tbody", "td", "tfoot", "th", "tr", "ul", "video",
];

/// What is done with the body of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipBody {
    /// Process everything
    #[default]
    Process,
    /// Skip everything
    SkipAll,
    /// Skip elements, process text, comments...
    SkipElements,
    /// Process the next element, then skip the following ones
    ProcessOneElement,
}

impl SkipBody {
    pub fn process_elements(self) -> bool {
        matches!(self, SkipBody::Process | SkipBody::ProcessOneElement)
    }

    pub fn process_non_elements(self) -> bool {
        !matches!(self, SkipBody::SkipAll)
    }

    pub fn process_children(self) -> bool {
        matches!(self, SkipBody::Process | SkipBody::ProcessOneElement)
    }
}

#[derive(Debug, Clone, Default)]
struct LevelState {
    skip_body: SkipBody,
    skip_close_tag: bool,
    // Source of the element let through by `ProcessOneElement`
    unskipped_first: Option<u64>,
}

/// Most recent events seen, kept to find the whitespace preceding an
/// iterated element
#[derive(Debug, Clone)]
enum RecentEvent {
    Text(Text),
    Other,
}

pub(crate) struct EventModelController {
    template_mode: TemplateMode,
    model_level: usize,
    levels: Vec<LevelState>,
    gathered: Option<GatheredModel>,
    last_event: Option<RecentEvent>,
    second_to_last_event: Option<RecentEvent>,
}

impl EventModelController {
    pub(crate) fn new(template_mode: TemplateMode) -> Self {
        let mut levels = Vec::with_capacity(INITIAL_MODEL_LEVELS);
        levels.push(LevelState::default());
        Self {
            template_mode,
            model_level: 0,
            levels,
            gathered: None,
            last_event: None,
            second_to_last_event: None,
        }
    }

    pub(crate) fn model_level(&self) -> usize {
        self.model_level
    }

    pub(crate) fn skip_body(&self) -> SkipBody {
        self.levels[self.model_level].skip_body
    }

    // ------------------------------------------------------------------
    // Gathering
    // ------------------------------------------------------------------

    pub(crate) fn is_gathering(&self) -> bool {
        self.gathered.is_some()
    }

    pub(crate) fn is_gathering_finished(&self) -> bool {
        self.gathered.as_ref().map_or(false, GatheredModel::is_finished)
    }

    /// Remove the gathered model, ending the gathering episode
    pub(crate) fn take_gathered(&mut self) -> Option<GatheredModel> {
        self.gathered.take()
    }

    /// Start gathering the subtree of an open tag whose model processor
    /// needs it whole
    pub(crate) fn start_gathering_delayed_open(
        &mut self,
        tag: OpenElementTag,
        vars: ProcessorExecutionVars,
    ) -> Result<()> {
        self.model_level -= 1;
        let state = &self.levels[self.model_level];
        let mut gathered = GatheredModel::delayed(self.template_mode, vars, state.skip_body, state.skip_close_tag);
        gathered.gather_open_element(tag)?;
        debug!(target: "thymeleaf.engine.gathering", "gathering delayed model at level {}", self.model_level);
        self.gathered = Some(gathered);
        Ok(())
    }

    pub(crate) fn start_gathering_delayed_standalone(
        &mut self,
        tag: StandaloneElementTag,
        vars: ProcessorExecutionVars,
    ) -> Result<()> {
        let (skip_body, skip_close_tag) = self.standalone_build_skip();
        let mut gathered = GatheredModel::delayed(self.template_mode, vars, skip_body, skip_close_tag);
        gathered.gather_standalone_element(tag)?;
        self.gathered = Some(gathered);
        Ok(())
    }

    pub(crate) fn start_gathering_iterated_open(
        &mut self,
        tag: OpenElementTag,
        vars: ProcessorExecutionVars,
        spec: IterationSpec,
    ) -> Result<()> {
        self.model_level -= 1;
        let state = &self.levels[self.model_level];
        let (skip_body, skip_close_tag) = (state.skip_body, state.skip_close_tag);
        let whitespace = self.white_space_preceding_iteration(&tag);
        let mut gathered =
            GatheredModel::iterated(self.template_mode, vars, skip_body, skip_close_tag, spec, whitespace);
        gathered.gather_open_element(tag)?;
        debug!(target: "thymeleaf.engine.gathering", "gathering iterated model at level {}", self.model_level);
        self.gathered = Some(gathered);
        Ok(())
    }

    pub(crate) fn start_gathering_iterated_standalone(
        &mut self,
        tag: StandaloneElementTag,
        vars: ProcessorExecutionVars,
        spec: IterationSpec,
    ) -> Result<()> {
        let (skip_body, skip_close_tag) = self.standalone_build_skip();
        let whitespace = self.white_space_preceding_iteration(&tag);
        let mut gathered =
            GatheredModel::iterated(self.template_mode, vars, skip_body, skip_close_tag, spec, whitespace);
        gathered.gather_standalone_element(tag)?;
        self.gathered = Some(gathered);
        Ok(())
    }

    /// Open/close pair standing for a standalone tag that was given a body
    pub(crate) fn create_standalone_equivalent_model(
        &self,
        tag: StandaloneElementTag,
        vars: ProcessorExecutionVars,
    ) -> Result<GatheredModel> {
        let (skip_body, skip_close_tag) = self.standalone_build_skip();
        let tag = tag.into_tag();
        let close = CloseElementTag::closing(&tag);
        let mut gathered = GatheredModel::delayed(self.template_mode, vars, skip_body, skip_close_tag);
        gathered.gather_open_element(OpenElementTag::new(tag))?;
        gathered.gather_close_element(close)?;
        Ok(gathered)
    }

    fn standalone_build_skip(&self) -> (SkipBody, bool) {
        let state = &self.levels[self.model_level];
        let skip_body = match state.skip_body {
            SkipBody::SkipElements => SkipBody::ProcessOneElement,
            other => other,
        };
        (skip_body, state.skip_close_tag)
    }

    fn white_space_preceding_iteration(&self, tag: &ElementTag) -> Option<Text> {
        let text = match &self.second_to_last_event {
            Some(RecentEvent::Text(text)) => text,
            _ => return None,
        };
        let applicable = match self.template_mode {
            TemplateMode::Xml => true,
            TemplateMode::Html => {
                let name = tag.element_name();
                !name.has_prefix()
                    && ITERATION_WHITESPACE_ELEMENTS
                        .iter()
                        .any(|candidate| candidate.eq_ignore_ascii_case(name.name()))
            }
            _ => false,
        };
        if applicable && text.is_whitespace() {
            Some(text.clone())
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Skipping
    // ------------------------------------------------------------------

    /// Set the skip state of the current level and, with `skip_close_tag`,
    /// mark the close tag of the current element to be skipped
    pub(crate) fn skip(&mut self, skip_body: SkipBody, skip_close_tag: bool) -> Result<()> {
        self.levels[self.model_level].skip_body = skip_body;
        if skip_close_tag {
            if self.model_level == 0 {
                return Err(Error::processing_static(
                    "Cannot set containing close tag to skip when model level is zero",
                ));
            }
            self.levels[self.model_level - 1].skip_close_tag = true;
        }
        Ok(())
    }

    fn set_skip_body(&mut self, skip_body: SkipBody) {
        self.levels[self.model_level].skip_body = skip_body;
    }

    fn increase_model_level(&mut self, context: &mut dyn EngineContext) {
        let inherited = if self.skip_body().process_children() {
            SkipBody::Process
        } else {
            SkipBody::SkipAll
        };
        self.model_level += 1;
        if self.levels.len() == self.model_level {
            if self.levels.len() == self.levels.capacity() {
                self.levels.reserve(INITIAL_MODEL_LEVELS / 2);
            }
            self.levels.push(LevelState::default());
        }
        self.levels[self.model_level] = LevelState {
            skip_body: inherited,
            skip_close_tag: false,
            unskipped_first: None,
        };
        context.increase_level();
    }

    fn decrease_model_level(&mut self, context: &mut dyn EngineContext) -> Result<()> {
        if self.model_level == 0 {
            return Err(Error::processing_static(
                "Bad markup or template processing sequence. Close element found at model level zero.",
            ));
        }
        self.model_level -= 1;
        context.decrease_level();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------

    /// Decision for text, comments, CDATA, doctypes, processing instructions,
    /// XML declarations and unmatched close tags
    pub(crate) fn should_process_non_element<E: NonElementEvent>(&mut self, event: &E) -> Result<bool> {
        self.last_event = Some(match event.as_text() {
            Some(text) => RecentEvent::Text(text.clone()),
            None => RecentEvent::Other,
        });
        if let Some(gathered) = self.gathered.as_mut() {
            gathered.gather(event.clone().into())?;
            return Ok(false);
        }
        Ok(self.skip_body().process_non_elements())
    }

    pub(crate) fn should_process_standalone_element(
        &mut self,
        tag: &StandaloneElementTag,
        context: &mut dyn EngineContext,
    ) -> Result<bool> {
        self.second_to_last_event = self.last_event.take();
        self.last_event = Some(RecentEvent::Other);
        if let Some(gathered) = self.gathered.as_mut() {
            gathered.gather_standalone_element(tag.clone())?;
            return Ok(false);
        }
        let mut process = self.skip_body().process_elements();
        if self.skip_body() == SkipBody::ProcessOneElement {
            self.levels[self.model_level].unskipped_first = Some(tag.source_id());
            self.set_skip_body(SkipBody::SkipElements);
            process = true;
        }
        if process {
            // Local variables set by processors live until the element ends
            context.increase_level();
        }
        trace!(target: "thymeleaf.engine", "standalone <{}>: process={process}", tag.complete_name());
        Ok(process)
    }

    pub(crate) fn should_process_open_element(
        &mut self,
        tag: &OpenElementTag,
        context: &mut dyn EngineContext,
    ) -> Result<bool> {
        self.second_to_last_event = self.last_event.take();
        self.last_event = Some(RecentEvent::Other);
        if let Some(gathered) = self.gathered.as_mut() {
            gathered.gather_open_element(tag.clone())?;
            return Ok(false);
        }
        let mut process = self.skip_body().process_elements();
        let state = &mut self.levels[self.model_level];
        if state.skip_body == SkipBody::ProcessOneElement {
            state.unskipped_first = Some(tag.source_id());
        } else if state.skip_body == SkipBody::SkipElements && state.unskipped_first == Some(tag.source_id()) {
            // The element let through is being replayed (iterated or gathered)
            state.skip_body = SkipBody::ProcessOneElement;
            process = true;
        }
        self.increase_model_level(context);
        trace!(target: "thymeleaf.engine", "open <{}>: process={process}", tag.complete_name());
        Ok(process)
    }

    pub(crate) fn should_process_close_element(
        &mut self,
        tag: &CloseElementTag,
        context: &mut dyn EngineContext,
    ) -> Result<bool> {
        if tag.is_unmatched() {
            return self.should_process_non_element(tag);
        }
        if let Some(gathered) = self.gathered.as_mut() {
            gathered.gather_close_element(tag.clone())?;
            return Ok(false);
        }
        self.last_event = Some(RecentEvent::Other);
        self.decrease_model_level(context)?;
        let state = &mut self.levels[self.model_level];
        if state.skip_body == SkipBody::ProcessOneElement {
            state.skip_body = SkipBody::SkipElements;
            return Ok(!std::mem::take(&mut state.skip_close_tag));
        }
        if state.skip_close_tag {
            state.skip_close_tag = false;
            return Ok(false);
        }
        Ok(state.skip_body.process_elements())
    }
}

/// Events the controller decides on without tracking element nesting
pub(crate) trait NonElementEvent: Clone + Into<TemplateEvent> {
    fn as_text(&self) -> Option<&Text> {
        None
    }
}

impl NonElementEvent for Text {
    fn as_text(&self) -> Option<&Text> {
        Some(self)
    }
}

impl NonElementEvent for Comment {}
impl NonElementEvent for CDataSection {}
impl NonElementEvent for DocType {}
impl NonElementEvent for ProcessingInstruction {}
impl NonElementEvent for XmlDeclaration {}
impl NonElementEvent for CloseElementTag {}
