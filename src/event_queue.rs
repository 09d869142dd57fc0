//! Growable buffer of engine events
//!
//! Used by the parser adapter to build a template's event stream, by models to
//! hold processor-built fragments and by the gathering machinery to capture a
//! subtree. A queue holds either both template boundary events (first and
//! last) or neither.

use log::trace;

use crate::error::{Error, Result};
use crate::event::TemplateEvent;
use crate::template_handler::TemplateHandler;
use crate::template_mode::TemplateMode;

const DEFAULT_INITIAL_CAPACITY: usize = 20;

/// Ordered events of a single template mode
///
/// ```
/// use thymeleaf_events::{EngineEventQueue, TemplateEnd, TemplateMode, Text};
///
/// let mut queue = EngineEventQueue::new(TemplateMode::Html);
/// queue.add(Text::new("a").into())?;
/// assert_eq!(queue.template_mode(), TemplateMode::Html);
/// assert_eq!(queue.get(0).map(|e| e.to_string()), Some("a".to_string()));
/// assert!(queue.get(1).is_none());
/// assert!(queue.add(TemplateEnd::new(None, TemplateMode::Html).into()).is_err());
/// assert_eq!(queue.events().len(), 1);
/// # Ok::<(), thymeleaf_events::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct EngineEventQueue {
    template_mode: TemplateMode,
    events: Vec<TemplateEvent>,
}

impl EngineEventQueue {
    pub fn new(template_mode: TemplateMode) -> Self {
        Self::with_capacity(template_mode, DEFAULT_INITIAL_CAPACITY)
    }

    pub fn with_capacity(template_mode: TemplateMode, capacity: usize) -> Self {
        Self {
            template_mode,
            events: Vec::with_capacity(capacity),
        }
    }

    pub fn template_mode(&self) -> TemplateMode {
        self.template_mode
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Event at `pos`, `None` past the end
    pub fn get(&self, pos: usize) -> Option<&TemplateEvent> {
        self.events.get(pos)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TemplateEvent> {
        self.events.iter()
    }

    /// All events, boundaries included when present
    pub fn events(&self) -> &[TemplateEvent] {
        &self.events
    }

    /// Append without validation, for producers that already guarantee a
    /// well-formed sequence (the parser adapter)
    pub fn build(&mut self, event: TemplateEvent) {
        self.events.push(event);
    }

    /// Validated append
    pub fn add(&mut self, event: TemplateEvent) -> Result<()> {
        self.insert(self.events.len(), event)
    }

    /// Validated insert
    ///
    /// Boundary events cannot be inserted, nor can anything be placed before
    /// an existing template start or after an existing template end.
    pub fn insert(&mut self, pos: usize, event: TemplateEvent) -> Result<()> {
        self.check_position(pos)?;
        if event.is_boundary() {
            return Err(Error::processing_owned(format!(
                "Cannot insert a {} event into an event queue",
                event.kind()
            )));
        }
        self.events.insert(pos, event);
        Ok(())
    }

    /// Replace the event at `pos`, which cannot be a boundary on either side
    pub fn replace(&mut self, pos: usize, event: TemplateEvent) -> Result<()> {
        let current = self.events.get(pos).ok_or_else(|| self.out_of_bounds(pos))?;
        if current.is_boundary() || event.is_boundary() {
            return Err(Error::processing_static(
                "Template start and end events cannot be replaced in an event queue",
            ));
        }
        self.events[pos] = event;
        Ok(())
    }

    /// [`insert_queue`](Self::insert_queue) at the end
    pub fn add_queue(&mut self, queue: &EngineEventQueue) -> Result<()> {
        self.insert_queue(self.events.len(), queue)
    }

    /// Splice a copy of another queue's events at `pos`
    ///
    /// If `queue` carries boundary events they must both be present, and are
    /// stripped so that only the inner events are spliced.
    pub fn insert_queue(&mut self, pos: usize, queue: &EngineEventQueue) -> Result<()> {
        self.check_position(pos)?;
        let inner = queue.inner_events()?;
        if inner.is_empty() {
            return Ok(());
        }
        self.events.splice(pos..pos, inner.iter().cloned());
        Ok(())
    }

    /// Remove and return the event at `pos`
    ///
    /// Unlike insertion this is not checked against boundary events, so a
    /// caller emptying a whole queue can remove them too.
    pub fn remove(&mut self, pos: usize) -> Result<TemplateEvent> {
        if pos >= self.events.len() {
            return Err(self.out_of_bounds(pos));
        }
        Ok(self.events.remove(pos))
    }

    /// Drop every event, keeping the allocation
    pub fn reset(&mut self) {
        self.events.clear();
    }

    pub fn clone_event_queue(&self) -> EngineEventQueue {
        self.clone()
    }

    /// Become a copy of `original`, reusing this queue's allocation
    pub fn reset_as_clone_of(&mut self, original: &EngineEventQueue) {
        self.template_mode = original.template_mode;
        self.events.clone_from(&original.events);
    }

    /// Replay every event into `handler`
    ///
    /// The handler receives copies, so it can mutate them freely without
    /// touching the stored events.
    pub fn process(&self, handler: &mut dyn TemplateHandler) -> Result<()> {
        trace!(target: "thymeleaf.engine.queue", "replaying {} events", self.events.len());
        for event in &self.events {
            dispatch(handler, event.clone())?;
        }
        Ok(())
    }

    /// Replay every event into `handler`, emptying the queue afterwards
    pub fn process_and_reset(&mut self, handler: &mut dyn TemplateHandler) -> Result<()> {
        let events = std::mem::take(&mut self.events);
        events.into_iter().try_for_each(|event| dispatch(handler, event))
    }

    pub(crate) fn into_events(self) -> Vec<TemplateEvent> {
        self.events
    }

    fn inner_events(&self) -> Result<&[TemplateEvent]> {
        let starts = matches!(self.events.first(), Some(TemplateEvent::TemplateStart(_)));
        let ends = matches!(self.events.last(), Some(TemplateEvent::TemplateEnd(_)));
        match (starts, ends) {
            (true, true) if self.events.len() >= 2 => Ok(&self.events[1..self.events.len() - 1]),
            (false, false) => Ok(&self.events),
            _ => Err(Error::processing_static(
                "Cannot insert a model that has a template start event but no template end, or vice versa",
            )),
        }
    }

    fn check_position(&self, pos: usize) -> Result<()> {
        if pos > self.events.len() {
            return Err(self.out_of_bounds(pos));
        }
        if pos == 0 && matches!(self.events.first(), Some(TemplateEvent::TemplateStart(_))) {
            return Err(Error::processing_static(
                "Cannot insert an event before the template start event",
            ));
        }
        if pos == self.events.len() && matches!(self.events.last(), Some(TemplateEvent::TemplateEnd(_))) {
            return Err(Error::processing_static(
                "Cannot insert an event after the template end event",
            ));
        }
        Ok(())
    }

    fn out_of_bounds(&self, pos: usize) -> Error {
        Error::invalid_owned(format!(
            "Requested position {pos} of event queue with size {}",
            self.events.len()
        ))
    }
}

/// Type-switch an event into the matching handler method
pub(crate) fn dispatch(handler: &mut dyn TemplateHandler, event: TemplateEvent) -> Result<()> {
    match event {
        TemplateEvent::TemplateStart(e) => handler.handle_template_start(e),
        TemplateEvent::TemplateEnd(e) => handler.handle_template_end(e),
        TemplateEvent::Text(e) => handler.handle_text(e),
        TemplateEvent::Comment(e) => handler.handle_comment(e),
        TemplateEvent::CDataSection(e) => handler.handle_cdata_section(e),
        TemplateEvent::DocType(e) => handler.handle_doctype(e),
        TemplateEvent::ProcessingInstruction(e) => handler.handle_processing_instruction(e),
        TemplateEvent::XmlDeclaration(e) => handler.handle_xml_declaration(e),
        TemplateEvent::OpenElement(e) => handler.handle_open_element(e),
        TemplateEvent::StandaloneElement(e) => handler.handle_standalone_element(e),
        TemplateEvent::CloseElement(e) => handler.handle_close_element(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{TemplateEnd, TemplateStart, Text};
    use crate::template_handler::OutputTemplateHandler;

    fn text(s: &str) -> TemplateEvent {
        Text::new(s).into()
    }

    fn bounded(inner: &[&str]) -> EngineEventQueue {
        let mut queue = EngineEventQueue::new(TemplateMode::Html);
        queue.build(TemplateStart::new(None, TemplateMode::Html).into());
        for s in inner {
            queue.build(text(s));
        }
        queue.build(TemplateEnd::new(None, TemplateMode::Html).into());
        queue
    }

    fn output(queue: &EngineEventQueue) -> String {
        let mut handler = OutputTemplateHandler::new();
        queue.process(&mut handler).unwrap();
        handler.into_output()
    }

    #[test]
    fn test_add_rejects_boundaries() {
        let mut queue = EngineEventQueue::new(TemplateMode::Html);
        assert!(queue.add(TemplateStart::new(None, TemplateMode::Html).into()).is_err());
        assert!(queue.add(text("a")).is_ok());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_insert_respects_existing_boundaries() {
        let mut queue = bounded(&["a"]);
        assert!(queue.insert(0, text("x")).is_err());
        assert!(queue.add(text("x")).is_err());
        queue.insert(1, text("b")).unwrap();
        assert_eq!(output(&queue), "ba");
    }

    #[test]
    fn test_insert_queue_strips_boundaries() {
        let mut target = EngineEventQueue::new(TemplateMode::Html);
        target.add(text("<")).unwrap();
        target.add(text(">")).unwrap();
        target.insert_queue(1, &bounded(&["a", "b"])).unwrap();
        assert_eq!(target.len(), 4);
        assert_eq!(output(&target), "<ab>");
    }

    #[test]
    fn test_insert_queue_rejects_half_bounded_model() {
        let mut half = EngineEventQueue::new(TemplateMode::Html);
        half.build(TemplateStart::new(None, TemplateMode::Html).into());
        half.build(text("a"));
        let mut target = EngineEventQueue::new(TemplateMode::Html);
        let err = target.add_queue(&half).unwrap_err();
        assert!(err.is_processing());
        assert!(target.is_empty());
    }

    #[test]
    fn test_process_and_reset() {
        let mut queue = EngineEventQueue::new(TemplateMode::Text);
        queue.add(text("x")).unwrap();
        let mut handler = OutputTemplateHandler::new();
        queue.process_and_reset(&mut handler).unwrap();
        assert_eq!(handler.into_output(), "x");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_reset_as_clone_of() {
        let original = bounded(&["a", "b"]);
        let mut copy = EngineEventQueue::new(TemplateMode::Xml);
        copy.reset_as_clone_of(&original);
        assert_eq!(copy.len(), 4);
        assert_eq!(copy.template_mode(), TemplateMode::Html);
        copy.remove(1).unwrap();
        assert_eq!(original.len(), 4);
    }
}
