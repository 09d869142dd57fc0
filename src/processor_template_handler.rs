//! Processor dispatch
//!
//! [`ProcessorTemplateHandler`] sits between the event producer (the parser
//! adapter, or a model being replayed) and the next handler of the chain
//! (usually the output serializer). For every event it:
//!
//! 1. asks the [`EventModelController`] whether the event is to be processed,
//!    skipped or gathered
//! 2. executes the applicable processors in order, collecting their
//!    instructions from the structure handlers
//! 3. applies the instructions: forwarding the (possibly modified) event,
//!    outputting inserted models, setting skip flags for the body and close
//!    tag, or starting a gathering for iteration and model processors
//!
//! Models produced by processors are either forwarded straight to the next
//! handler or, when flagged as processable, replayed through this same
//! handler.

use std::sync::Arc;

use log::trace;

use crate::config::{EngineConfiguration, ModeProcessors};
use crate::context::EngineContext;
use crate::error::{Error, Location, Result};
use crate::event::{
    CDataSection, CloseElementTag, Comment, DocType, EventLocation, OpenElementTag,
    ProcessingInstruction, StandaloneElementTag, TemplateEnd, TemplateStart, Text, XmlDeclaration,
};
use crate::gathering::{GatheringResume, IterationSpec};
use crate::model::Model;
use crate::model_controller::{EventModelController, SkipBody};
use crate::processor::{ElementProcessor, ElementProcessorKind, EventProcessor, Registered};
use crate::processor_iterator::{ElementProcessorIterator, ProcessorStep};
use crate::structure::{
    BoundariesAction, ElementModelStructureHandler, ElementTagAction, ElementTagStructureHandler,
    EventAction, EventStructureHandler, TemplateBoundariesStructureHandler,
};
use crate::template_handler::TemplateHandler;
use crate::template_mode::TemplateMode;

/// Execution state of the processors of one element tag
///
/// Saved in gathered models, so that processing can resume where it stopped
/// when the gathered subtree is replayed.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProcessorExecutionVars {
    pub(crate) processor_iterator: ElementProcessorIterator,
    pub(crate) model_before: Option<Model>,
    pub(crate) model_after: Option<Model>,
    pub(crate) model_after_processable: bool,
    pub(crate) discard_event: bool,
    pub(crate) skip_body: SkipBody,
    pub(crate) skip_close_tag: bool,
}

/// Which element tag processors are executed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Standalone,
}

/// What the dispatch loop does after applying a tag processor's action
enum Flow {
    Continue,
    Iterate(IterationSpec),
    StandaloneBody,
}

/// Template handler executing the processors of an engine configuration
pub struct ProcessorTemplateHandler<'c, N: TemplateHandler> {
    configuration: Arc<EngineConfiguration>,
    context: &'c mut dyn EngineContext,
    next: N,
    template_mode: TemplateMode,
    processors: Arc<ModeProcessors>,
    controller: EventModelController,
    current_gathering: Option<GatheringResume>,
    initial_context_level: usize,
    tag_structure_handler: ElementTagStructureHandler,
    model_structure_handler: ElementModelStructureHandler,
    boundaries_structure_handler: TemplateBoundariesStructureHandler,
}

impl<'c, N: TemplateHandler> ProcessorTemplateHandler<'c, N> {
    /// Handler processing in the template mode of `context`
    pub fn new(context: &'c mut dyn EngineContext, next: N) -> Self {
        let configuration = Arc::clone(context.configuration());
        let template_mode = context.template_mode();
        let processors = configuration.processors(template_mode);
        let initial_context_level = context.level();
        Self {
            configuration,
            context,
            next,
            template_mode,
            processors,
            controller: EventModelController::new(template_mode),
            current_gathering: None,
            initial_context_level,
            tag_structure_handler: ElementTagStructureHandler::new(),
            model_structure_handler: ElementModelStructureHandler::new(),
            boundaries_structure_handler: TemplateBoundariesStructureHandler::new(),
        }
    }

    pub fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }

    pub fn next(&self) -> &N {
        &self.next
    }

    pub fn next_mut(&mut self) -> &mut N {
        &mut self.next
    }

    pub fn into_next(self) -> N {
        self.next
    }

    pub(crate) fn context_mut(&mut self) -> &mut dyn EngineContext {
        &mut *self.context
    }

    pub(crate) fn controller_mut(&mut self) -> &mut EventModelController {
        &mut self.controller
    }

    /// Make the next element handled resume from a gathered model's state
    pub(crate) fn set_current_gathering(&mut self, resume: GatheringResume) {
        self.current_gathering = Some(resume);
    }

    /// Output a side model, reprocessing it or not
    fn process_model(&mut self, model: Option<Model>, processable: bool) -> Result<()> {
        match model {
            Some(model) if processable => model.process(self),
            Some(model) => model.process(&mut self.next),
            None => Ok(()),
        }
    }

    fn process_gathered(&mut self) -> Result<()> {
        match self.controller.take_gathered() {
            Some(gathered) => gathered.process(self),
            None => Err(Error::processing_static("Gathering finished but no gathered model found")),
        }
    }

    // ------------------------------------------------------------------
    // Template boundaries
    // ------------------------------------------------------------------

    /// Run the boundaries processors, returning the model to insert
    fn process_boundaries(
        &mut self,
        mut run: impl FnMut(
            &dyn crate::processor::TemplateBoundariesProcessor,
            &mut dyn EngineContext,
            &mut TemplateBoundariesStructureHandler,
        ) -> Result<()>,
    ) -> Result<(Option<Model>, bool)> {
        let processors = Arc::clone(&self.processors);
        let mut model: Option<Model> = None;
        let mut processable = false;
        for registered in &processors.template_boundaries {
            self.boundaries_structure_handler.reset();
            run(registered.processor(), &mut *self.context, &mut self.boundaries_structure_handler)?;
            self.boundaries_structure_handler
                .apply_context_modifications(&mut *self.context);
            if let BoundariesAction::Insert {
                content,
                processable: insert_processable,
            } = self.boundaries_structure_handler.take_action()
            {
                let inserted = content.into_model(self.template_mode)?;
                match model.as_mut() {
                    Some(model) => model.add_model(&inserted)?,
                    None => model = Some(inserted),
                }
                processable = insert_processable;
            }
        }
        Ok((model, processable))
    }

    /// Post-conditions checked once the whole template has been processed
    fn perform_tear_down_checks(&self, end: &TemplateEnd) -> Result<()> {
        let location = Location {
            template_name: end.template_name().map(str::to_owned),
            ..Location::default()
        };
        let model_level = self.controller.model_level();
        if model_level != 0 {
            return Err(Error::processing_owned(format!(
                "Bad markup or template processing sequence. Model level is != 0 ({model_level}) at template end."
            ))
            .at(&location));
        }
        let context_level = self.context.level();
        if context_level != self.initial_context_level {
            return Err(Error::processing_owned(format!(
                "Bad markup or template processing sequence. Context level after processing ({context_level}) \
                 does not correspond to context level before processing ({}).",
                self.initial_context_level
            ))
            .at(&location));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Non-element events
    // ------------------------------------------------------------------

    /// Run the processors for a non-element event
    ///
    /// Returns the event to forward (`None` if it was removed or replaced) and
    /// the replacement model, if any.
    fn process_event<E>(
        &mut self,
        mut event: E,
        processors: &[Registered<dyn EventProcessor<E>>],
    ) -> Result<(Option<E>, Option<(Model, bool)>)> {
        let mut handler = EventStructureHandler::new();
        for registered in processors {
            handler.reset();
            registered
                .processor()
                .process(&mut *self.context, &event, &mut handler)?;
            match handler.take_action() {
                EventAction::None => {}
                EventAction::Set(modified) => event = modified,
                EventAction::ReplaceWith { model, processable } => {
                    return Ok((None, Some((model, processable))));
                }
                EventAction::Remove => return Ok((None, None)),
            }
        }
        Ok((Some(event), None))
    }

    // ------------------------------------------------------------------
    // Element tags
    // ------------------------------------------------------------------

    /// Apply the action recorded by a tag processor to the execution vars
    fn apply_tag_action(
        &mut self,
        kind: TagKind,
        action: ElementTagAction,
        vars: &mut ProcessorExecutionVars,
    ) -> Result<Flow> {
        let mode = self.template_mode;
        match action {
            ElementTagAction::None => {}
            ElementTagAction::Iterate {
                iter_variable,
                status_variable,
                iterable,
            } => {
                return Ok(Flow::Iterate(IterationSpec {
                    iter_variable,
                    status_variable,
                    iterable,
                }));
            }
            ElementTagAction::SetBody { content, processable } => {
                vars.model_after = Some(content.into_model(mode)?);
                vars.model_after_processable = processable;
                if kind == TagKind::Standalone {
                    return Ok(Flow::StandaloneBody);
                }
                vars.skip_body = SkipBody::SkipAll;
            }
            ElementTagAction::InsertBefore(model) => {
                let mut before = Model::new(mode);
                before.add_model(&model)?;
                vars.model_before = Some(before);
            }
            ElementTagAction::InsertImmediatelyAfter { model, processable } => {
                vars.model_after
                    .get_or_insert_with(|| Model::new(mode))
                    .insert_model(0, &model)?;
                vars.model_after_processable = processable;
            }
            ElementTagAction::ReplaceWith { content, processable } => {
                vars.model_after = Some(content.into_model(mode)?);
                vars.model_after_processable = processable;
                vars.discard_event = true;
                if kind == TagKind::Open {
                    vars.skip_body = SkipBody::SkipAll;
                    vars.skip_close_tag = true;
                }
            }
            ElementTagAction::RemoveElement => {
                vars.model_after = None;
                vars.discard_event = true;
                if kind == TagKind::Open {
                    vars.skip_body = SkipBody::SkipAll;
                    vars.skip_close_tag = true;
                }
            }
            ElementTagAction::RemoveTags => {
                vars.discard_event = true;
                if kind == TagKind::Open {
                    vars.skip_close_tag = true;
                }
            }
            ElementTagAction::RemoveBody if kind == TagKind::Open => {
                vars.model_after = None;
                vars.skip_body = SkipBody::SkipAll;
            }
            ElementTagAction::RemoveAllButFirstChild if kind == TagKind::Open => {
                vars.model_after = None;
                vars.skip_body = SkipBody::ProcessOneElement;
            }
            // Standalone elements have no body
            ElementTagAction::RemoveBody | ElementTagAction::RemoveAllButFirstChild => {}
        }
        Ok(Flow::Continue)
    }

    /// Execute a model processor on the gathered subtree of the tag
    ///
    /// Returns whether the processor modified the model, in which case the
    /// modified model replaces the original subtree.
    fn execute_model_processor(
        &mut self,
        processor: &ElementProcessor,
        resume: &mut Option<GatheringResume>,
        vars: &mut ProcessorExecutionVars,
        location: &Location,
    ) -> Result<bool> {
        let processor_impl = match processor.kind() {
            ElementProcessorKind::Model(p) => Arc::clone(p),
            ElementProcessorKind::Tag(_) => {
                return Err(Error::processing_static("Only model processors can be resumed").at(location));
            }
        };
        let resume = resume.as_mut().ok_or_else(|| {
            Error::processing_static("Cannot resume model processor: no gathered model available").at(location)
        })?;
        let gathered = resume.inner_model.take().ok_or_else(|| {
            Error::processing_static("Cannot resume model processor: no gathered model available").at(location)
        })?;

        let mut processed = gathered.clone();
        self.model_structure_handler.reset();
        processor_impl
            .process(&mut *self.context, &mut processed, &mut self.model_structure_handler)
            .map_err(|e| e.at(location))?;
        self.model_structure_handler
            .apply_context_modifications(&mut *self.context);
        self.controller
            .skip(resume.build_time_skip_body, resume.build_time_skip_close_tag)?;

        if processed.same_as(&gathered) {
            return Ok(false);
        }
        vars.model_after = Some(processed);
        vars.model_after_processable = true;
        vars.discard_event = true;
        Ok(true)
    }

    fn check_model_processor_can_execute(
        processor: &ElementProcessor,
        vars: &ProcessorExecutionVars,
        location: &Location,
    ) -> Result<()> {
        let modified = |model: &Option<Model>| model.as_ref().map_or(false, |m| !m.is_empty());
        if modified(&vars.model_before) || modified(&vars.model_after) {
            return Err(Error::processing_owned(format!(
                "Cannot execute model processor {processor:?} as the body of the target element has already been \
                 modified by a previously executed processor on the same tag. Model processors cannot execute on \
                 already-modified bodies as these might contain unprocessable events (e.g. as a result of a \
                 'th:text' or similar)"
            ))
            .at(location));
        }
        Ok(())
    }
}

fn location_of(location: Option<&EventLocation>) -> Location {
    location.map(EventLocation::to_location).unwrap_or_default()
}

macro_rules! non_element_handler {
    ($method:ident, $ty:ty, $processors:ident) => {
        fn $method(&mut self, event: $ty) -> Result<()> {
            if !self.controller.should_process_non_element(&event)? {
                return Ok(());
            }
            let processors = Arc::clone(&self.processors);
            if processors.$processors.is_empty() {
                return self.next.$method(event);
            }
            let (event, model) = self.process_event(event, &processors.$processors)?;
            if let Some(event) = event {
                self.next.$method(event)?;
            }
            match model {
                Some((model, processable)) => self.process_model(Some(model), processable),
                None => Ok(()),
            }
        }
    };
}

impl<'c, N: TemplateHandler> TemplateHandler for ProcessorTemplateHandler<'c, N> {
    fn handle_template_start(&mut self, start: TemplateStart) -> Result<()> {
        self.initial_context_level = self.context.level();
        if self.processors.template_boundaries.is_empty() {
            return self.next.handle_template_start(start);
        }
        let (model, processable) = self.process_boundaries(|processor, context, handler| {
            processor.process_template_start(context, &start, handler)
        })?;
        self.next.handle_template_start(start)?;
        self.process_model(model, processable)
    }

    fn handle_template_end(&mut self, end: TemplateEnd) -> Result<()> {
        if !self.processors.template_boundaries.is_empty() {
            let (model, processable) = self.process_boundaries(|processor, context, handler| {
                processor.process_template_end(context, &end, handler)
            })?;
            self.process_model(model, processable)?;
        }
        self.perform_tear_down_checks(&end)?;
        self.next.handle_template_end(end)
    }

    non_element_handler!(handle_text, Text, text);
    non_element_handler!(handle_comment, Comment, comment);
    non_element_handler!(handle_cdata_section, CDataSection, cdata_section);
    non_element_handler!(handle_doctype, DocType, doctype);
    non_element_handler!(handle_processing_instruction, ProcessingInstruction, processing_instruction);
    non_element_handler!(handle_xml_declaration, XmlDeclaration, xml_declaration);

    fn handle_open_element(&mut self, mut tag: OpenElementTag) -> Result<()> {
        if !self
            .controller
            .should_process_open_element(&tag, &mut *self.context)?
        {
            return Ok(());
        }

        let mut resume = self.current_gathering.take();
        if resume.is_none() && !tag.has_associated_processors() {
            return self.next.handle_open_element(tag);
        }

        let mut vars = resume
            .as_mut()
            .map(|resume| std::mem::take(&mut resume.vars))
            .unwrap_or_default();
        let location = location_of(tag.location());

        while !vars.discard_event {
            let step = match vars.processor_iterator.next(&mut tag).map_err(|e| e.at(&location))? {
                Some(step) => step,
                None => break,
            };
            match step {
                ProcessorStep::Pending(processor) => match processor.kind() {
                    ElementProcessorKind::Tag(p) => {
                        trace!(target: "thymeleaf.engine", "executing {processor:?} on <{}>", tag.complete_name());
                        self.tag_structure_handler.reset();
                        p.process(&mut *self.context, &tag, &mut self.tag_structure_handler)
                            .map_err(|e| e.at(&location))?;
                        self.tag_structure_handler
                            .apply_context_modifications(&mut *self.context);
                        self.tag_structure_handler
                            .apply_attributes(&mut tag, self.configuration.attribute_definitions())?;
                        let action = self.tag_structure_handler.take_action();
                        match self.apply_tag_action(TagKind::Open, action, &mut vars)? {
                            Flow::Continue | Flow::StandaloneBody => {}
                            Flow::Iterate(spec) => {
                                return self.controller.start_gathering_iterated_open(tag, vars, spec);
                            }
                        }
                    }
                    ElementProcessorKind::Model(_) => {
                        Self::check_model_processor_can_execute(&processor, &vars, &location)?;
                        vars.processor_iterator.suspend_last(&tag)?;
                        return self.controller.start_gathering_delayed_open(tag, vars);
                    }
                },
                ProcessorStep::Ready(processor) => {
                    if self.execute_model_processor(&processor, &mut resume, &mut vars, &location)? {
                        vars.skip_body = SkipBody::SkipAll;
                        vars.skip_close_tag = true;
                    }
                }
            }
        }

        if let Some(before) = vars.model_before.take() {
            before.process(&mut self.next)?;
        }
        if !vars.discard_event {
            self.next.handle_open_element(tag)?;
        }
        let after = vars.model_after.take();
        self.process_model(after, vars.model_after_processable)?;
        self.controller.skip(vars.skip_body, vars.skip_close_tag)
    }

    fn handle_standalone_element(&mut self, mut tag: StandaloneElementTag) -> Result<()> {
        if !self
            .controller
            .should_process_standalone_element(&tag, &mut *self.context)?
        {
            return Ok(());
        }

        let mut resume = self.current_gathering.take();
        if resume.is_none() && !tag.has_associated_processors() {
            self.next.handle_standalone_element(tag)?;
            self.context.decrease_level();
            return Ok(());
        }

        let mut vars = resume
            .as_mut()
            .map(|resume| std::mem::take(&mut resume.vars))
            .unwrap_or_default();
        let location = location_of(tag.location());

        while !vars.discard_event {
            let step = match vars.processor_iterator.next(&mut tag).map_err(|e| e.at(&location))? {
                Some(step) => step,
                None => break,
            };
            match step {
                ProcessorStep::Pending(processor) => match processor.kind() {
                    ElementProcessorKind::Tag(p) => {
                        trace!(target: "thymeleaf.engine", "executing {processor:?} on <{}/>", tag.complete_name());
                        self.tag_structure_handler.reset();
                        p.process(&mut *self.context, &tag, &mut self.tag_structure_handler)
                            .map_err(|e| e.at(&location))?;
                        self.tag_structure_handler
                            .apply_context_modifications(&mut *self.context);
                        self.tag_structure_handler
                            .apply_attributes(&mut tag, self.configuration.attribute_definitions())?;
                        let action = self.tag_structure_handler.take_action();
                        match self.apply_tag_action(TagKind::Standalone, action, &mut vars)? {
                            Flow::Continue => {}
                            Flow::Iterate(spec) => {
                                self.controller.start_gathering_iterated_standalone(tag, vars, spec)?;
                                return self.process_gathered();
                            }
                            Flow::StandaloneBody => {
                                // Continue as an open/close pair able to hold the body
                                let equivalent = self.controller.create_standalone_equivalent_model(tag, vars)?;
                                return equivalent.process(self);
                            }
                        }
                    }
                    ElementProcessorKind::Model(_) => {
                        Self::check_model_processor_can_execute(&processor, &vars, &location)?;
                        vars.processor_iterator.suspend_last(&tag)?;
                        self.controller.start_gathering_delayed_standalone(tag, vars)?;
                        return self.process_gathered();
                    }
                },
                ProcessorStep::Ready(processor) => {
                    self.execute_model_processor(&processor, &mut resume, &mut vars, &location)?;
                }
            }
        }

        if let Some(before) = vars.model_before.take() {
            before.process(&mut self.next)?;
        }
        if !vars.discard_event {
            self.next.handle_standalone_element(tag)?;
        }
        let after = vars.model_after.take();
        self.process_model(after, vars.model_after_processable)?;
        self.context.decrease_level();
        Ok(())
    }

    fn handle_close_element(&mut self, tag: CloseElementTag) -> Result<()> {
        if !self
            .controller
            .should_process_close_element(&tag, &mut *self.context)?
        {
            if self.controller.is_gathering_finished() {
                return self.process_gathered();
            }
            return Ok(());
        }
        self.next.handle_close_element(tag)
    }
}
