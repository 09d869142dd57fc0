//! Resumable cursor over the processors of one element tag
//!
//! The dispatcher asks the cursor for the next processor to execute on a tag.
//! Processors can change the tag's attributes, which can change the set of
//! processors applicable to it: when that happens the list is recomputed and
//! merged with the old one, so processors already executed are not executed
//! again and newly applicable ones are.
//!
//! Model processors need the whole subtree of their tag before they can
//! execute. The first time one comes up it is returned as
//! [`ProcessorStep::Pending`]; the dispatcher then starts gathering the
//! subtree and [suspends](ElementProcessorIterator::suspend_last) the cursor.
//! When the gathered subtree is replayed, the suspended processor comes back
//! as [`ProcessorStep::Ready`].

use crate::error::{Error, Result};
use crate::event::ElementTag;
use crate::processor::ElementProcessor;

/// What the dispatcher should do with the next processor
#[derive(Debug, Clone)]
pub(crate) enum ProcessorStep {
    /// First visit
    Pending(ElementProcessor),
    /// Resumed after the tag's subtree was gathered
    Ready(ElementProcessor),
}

#[derive(Debug, Clone)]
struct Entry {
    processor: ElementProcessor,
    visited: bool,
}

/// Which tag (and which version of its attributes) the entries belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TagIdentity {
    source: u64,
    attributes_version: u64,
}

impl TagIdentity {
    fn of(tag: &ElementTag) -> Self {
        Self {
            source: tag.source_id(),
            attributes_version: tag.attributes().version(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ElementProcessorIterator {
    entries: Vec<Entry>,
    identity: Option<TagIdentity>,
    last: Option<usize>,
    suspended: bool,
}

impl ElementProcessorIterator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next(&mut self, tag: &mut ElementTag) -> Result<Option<ProcessorStep>> {
        let identity = TagIdentity::of(tag);

        if self.suspended {
            self.suspended = false;
            if self.identity != Some(identity) {
                return Err(Error::processing_static(
                    "Cannot resume suspended processor: the tag was modified and its processors need recomputing",
                ));
            }
            let entry = self.last.and_then(|last| self.entries.get(last)).ok_or_else(|| {
                Error::processing_static("Cannot resume suspended processor: no processors in tag")
            })?;
            return Ok(Some(ProcessorStep::Ready(entry.processor.clone())));
        }

        if self.identity != Some(identity) {
            self.recompute(tag);
            self.identity = Some(identity);
            self.last = None;
        }

        let start = self.last.map_or(0, |last| last + 1);
        for i in start..self.entries.len() {
            if !self.entries[i].visited {
                self.entries[i].visited = true;
                self.last = Some(i);
                return Ok(Some(ProcessorStep::Pending(self.entries[i].processor.clone())));
            }
        }
        self.last = Some(self.entries.len());
        Ok(None)
    }

    /// Return the processor just handed out again on the next call, as
    /// [`ProcessorStep::Ready`]
    pub(crate) fn suspend_last(&mut self, tag: &ElementTag) -> Result<()> {
        if self.identity != Some(TagIdentity::of(tag)) {
            return Err(Error::processing_static(
                "Cannot set last processor to be repeated: processor recompute is needed",
            ));
        }
        if self.last.map_or(true, |last| last >= self.entries.len()) {
            return Err(Error::processing_static(
                "Cannot set last processor to be repeated: no processors in tag",
            ));
        }
        self.suspended = true;
        Ok(())
    }

    /// Merge the tag's current processor list with the entries, keeping the
    /// visited mark of processors present in both
    fn recompute(&mut self, tag: &mut ElementTag) {
        let processors = tag.associated_processors();
        let old = std::mem::take(&mut self.entries);
        let mut old = old.into_iter().peekable();

        self.entries.reserve(processors.len());
        for processor in processors.iter() {
            let mut visited = false;
            // Both lists are sorted with the same total order
            while let Some(entry) = old.peek() {
                if entry.processor.is_same(processor) {
                    visited = entry.visited;
                    old.next();
                    break;
                }
                if entry.processor < *processor {
                    old.next();
                } else {
                    break;
                }
            }
            self.entries.push(Entry {
                processor: processor.clone(),
                visited,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfiguration;
    use crate::context::EngineContext;
    use crate::model::ModelFactory;
    use crate::processor::{Dialect, ElementTagProcessor, MatchingAttributeName, Processor};
    use crate::structure::ElementTagStructureHandler;
    use crate::template_mode::TemplateMode;
    use std::sync::Arc;

    struct AttrProcessor {
        attribute: MatchingAttributeName,
        precedence: i32,
    }

    impl Processor for AttrProcessor {
        fn template_mode(&self) -> TemplateMode {
            TemplateMode::Html
        }

        fn precedence(&self) -> i32 {
            self.precedence
        }
    }

    impl ElementTagProcessor for AttrProcessor {
        fn matching_attribute_name(&self) -> Option<&MatchingAttributeName> {
            Some(&self.attribute)
        }

        fn process(
            &self,
            _context: &mut dyn EngineContext,
            _tag: &ElementTag,
            _handler: &mut ElementTagStructureHandler,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn attr(name: &str, precedence: i32) -> AttrProcessor {
        AttrProcessor {
            attribute: MatchingAttributeName::for_prefixed_attribute_name(TemplateMode::Html, Some("th"), name)
                .unwrap(),
            precedence,
        }
    }

    fn factory() -> (Arc<EngineConfiguration>, ModelFactory) {
        let dialect = Dialect::new("test", Some("th"), 100)
            .with_element_tag_processor(attr("a", 10))
            .with_element_tag_processor(attr("b", 20))
            .with_element_tag_processor(attr("c", 30));
        let configuration = Arc::new(EngineConfiguration::builder().dialect(dialect).build().unwrap());
        let factory = ModelFactory::new(Arc::clone(&configuration), TemplateMode::Html);
        (configuration, factory)
    }

    fn pending_precedence(step: Option<ProcessorStep>) -> i32 {
        match step {
            Some(ProcessorStep::Pending(p)) => p.order().precedence,
            other => panic!("expected pending processor, got {other:?}"),
        }
    }

    #[test]
    fn test_processors_in_order() {
        let (_, factory) = factory();
        let mut tag = factory
            .create_open_element_tag("div", &[("th:c", ""), ("th:a", "")])
            .unwrap()
            .into_tag();
        let mut iterator = ElementProcessorIterator::new();
        assert_eq!(pending_precedence(iterator.next(&mut tag).unwrap()), 10);
        assert_eq!(pending_precedence(iterator.next(&mut tag).unwrap()), 30);
        assert!(iterator.next(&mut tag).unwrap().is_none());
    }

    #[test]
    fn test_attribute_changes_merge_visited() {
        let (configuration, factory) = factory();
        let mut tag = factory
            .create_open_element_tag("div", &[("th:a", ""), ("th:c", "")])
            .unwrap()
            .into_tag();
        let mut iterator = ElementProcessorIterator::new();
        assert_eq!(pending_precedence(iterator.next(&mut tag).unwrap()), 10);

        // A processor adding th:b: it runs next, th:a is not run again
        tag.set_attribute(configuration.attribute_definitions(), "th:b", Some(""))
            .unwrap();
        assert_eq!(pending_precedence(iterator.next(&mut tag).unwrap()), 20);
        assert_eq!(pending_precedence(iterator.next(&mut tag).unwrap()), 30);
        assert!(iterator.next(&mut tag).unwrap().is_none());
    }

    #[test]
    fn test_suspended_processor_comes_back_ready() {
        let (_, factory) = factory();
        let mut tag = factory
            .create_open_element_tag("div", &[("th:a", ""), ("th:b", "")])
            .unwrap()
            .into_tag();
        let mut iterator = ElementProcessorIterator::new();
        assert_eq!(pending_precedence(iterator.next(&mut tag).unwrap()), 10);
        iterator.suspend_last(&tag).unwrap();

        let mut resumed = iterator.clone();
        let mut replayed = tag.clone();
        match resumed.next(&mut replayed).unwrap() {
            Some(ProcessorStep::Ready(p)) => assert_eq!(p.order().precedence, 10),
            other => panic!("expected ready processor, got {other:?}"),
        }
        assert_eq!(pending_precedence(resumed.next(&mut replayed).unwrap()), 20);
    }

    #[test]
    fn test_suspend_without_processor_fails() {
        let (_, factory) = factory();
        let tag = factory.create_open_element_tag("div", &[]).unwrap().into_tag();
        let mut iterator = ElementProcessorIterator::new();
        assert!(iterator.suspend_last(&tag).is_err());
    }
}
