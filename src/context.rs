//! Engine context: variables and scoping levels
//!
//! The processing core only needs a small contract from its context: a level
//! counter that is increased when entering an element and decreased when
//! leaving it, and local variables (plus selection target, inliner and
//! template data) that are dropped when the level they were set at is left.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use log::warn;
use serde_json::Value;

use crate::config::EngineConfiguration;
use crate::error::Result;
use crate::event::Text;
use crate::model::ModelFactory;
use crate::template_mode::TemplateMode;

/// Name and mode of the template being processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateData {
    pub template_name: Option<String>,
    pub template_mode: TemplateMode,
}

impl TemplateData {
    pub fn new(template_name: Option<&str>, template_mode: TemplateMode) -> Self {
        Self {
            template_name: template_name.map(str::to_owned),
            template_mode,
        }
    }
}

/// Transforms text events containing inlined expressions
pub trait Inliner: Send + Sync {
    fn name(&self) -> &str;

    /// New text for `text`, or `None` to leave it untouched
    fn inline(&self, context: &dyn EngineContext, text: &Text) -> Result<Option<String>>;
}

/// Inliner that never changes anything, used to disable inlining in a subtree
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpInliner;

impl Inliner for NoOpInliner {
    fn name(&self) -> &str {
        "NONE"
    }

    fn inline(&self, _context: &dyn EngineContext, _text: &Text) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Context contract consumed by the processing core
pub trait EngineContext {
    fn configuration(&self) -> &Arc<EngineConfiguration>;

    fn template_data(&self) -> &TemplateData;

    fn set_template_data(&mut self, template_data: TemplateData);

    fn template_mode(&self) -> TemplateMode {
        self.template_data().template_mode
    }

    fn model_factory(&self) -> ModelFactory {
        ModelFactory::new(Arc::clone(self.configuration()), self.template_mode())
    }

    fn level(&self) -> usize;

    fn increase_level(&mut self);

    fn decrease_level(&mut self);

    fn variable(&self, name: &str) -> Option<&Value>;

    fn contains_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    fn variable_names(&self) -> Vec<String>;

    fn set_variable(&mut self, name: &str, value: Value);

    fn remove_variable(&mut self, name: &str);

    fn selection_target(&self) -> Option<&Value>;

    fn set_selection_target(&mut self, target: Option<Value>);

    fn inliner(&self) -> Option<&Arc<dyn Inliner>>;

    fn set_inliner(&mut self, inliner: Option<Arc<dyn Inliner>>);
}

/// Changes recorded at one level
#[derive(Default)]
struct Scope {
    level: usize,
    // `None` marks a variable removed at this level
    variables: IndexMap<String, Option<Value>>,
    selection_target: Option<Option<Value>>,
    inliner: Option<Option<Arc<dyn Inliner>>>,
    template_data: Option<TemplateData>,
}

impl Scope {
    fn at(level: usize) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }
}

/// Default [`EngineContext`]: a stack of scopes created lazily, only for the
/// levels where something was actually set
pub struct StandardEngineContext {
    configuration: Arc<EngineConfiguration>,
    template_data: TemplateData,
    level: usize,
    scopes: Vec<Scope>,
}

impl StandardEngineContext {
    pub fn new(configuration: Arc<EngineConfiguration>, template_data: TemplateData) -> Self {
        Self {
            configuration,
            template_data,
            level: 0,
            scopes: vec![Scope::at(0)],
        }
    }

    /// Context whose base level holds the entries of a JSON object
    pub fn with_variables(
        configuration: Arc<EngineConfiguration>,
        template_data: TemplateData,
        variables: &Value,
    ) -> Self {
        let mut context = Self::new(configuration, template_data);
        if let Value::Object(map) = variables {
            for (name, value) in map {
                context.set_variable(name, value.clone());
            }
        }
        context
    }

    fn current_scope(&mut self) -> &mut Scope {
        let level = self.level;
        let needs_scope = self.scopes.last().map_or(true, |scope| scope.level != level);
        if needs_scope {
            self.scopes.push(Scope::at(level));
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn lookup<'a, T>(&'a self, slot: impl Fn(&'a Scope) -> Option<T>) -> Option<T> {
        self.scopes.iter().rev().find_map(slot)
    }
}

impl EngineContext for StandardEngineContext {
    fn configuration(&self) -> &Arc<EngineConfiguration> {
        &self.configuration
    }

    fn template_data(&self) -> &TemplateData {
        self.lookup(|scope| scope.template_data.as_ref())
            .unwrap_or(&self.template_data)
    }

    fn set_template_data(&mut self, template_data: TemplateData) {
        self.current_scope().template_data = Some(template_data);
    }

    fn level(&self) -> usize {
        self.level
    }

    fn increase_level(&mut self) {
        self.level += 1;
    }

    fn decrease_level(&mut self) {
        if self.level == 0 {
            warn!(target: "thymeleaf.context", "context level decreased below zero, ignoring");
            return;
        }
        if self.scopes.len() > 1 && self.scopes.last().map_or(false, |scope| scope.level == self.level) {
            self.scopes.pop();
        }
        self.level -= 1;
    }

    fn variable(&self, name: &str) -> Option<&Value> {
        self.lookup(|scope| scope.variables.get(name)).and_then(Option::as_ref)
    }

    fn variable_names(&self) -> Vec<String> {
        let mut resolved: IndexMap<&str, bool> = IndexMap::new();
        for scope in self.scopes.iter().rev() {
            for (name, value) in &scope.variables {
                resolved.entry(name.as_str()).or_insert(value.is_some());
            }
        }
        let mut names: Vec<String> = resolved
            .into_iter()
            .filter(|(_, present)| *present)
            .map(|(name, _)| name.to_owned())
            .collect();
        names.sort();
        names
    }

    fn set_variable(&mut self, name: &str, value: Value) {
        self.current_scope().variables.insert(name.to_owned(), Some(value));
    }

    fn remove_variable(&mut self, name: &str) {
        if self.contains_variable(name) {
            self.current_scope().variables.insert(name.to_owned(), None);
        }
    }

    fn selection_target(&self) -> Option<&Value> {
        self.lookup(|scope| scope.selection_target.as_ref()).and_then(Option::as_ref)
    }

    fn set_selection_target(&mut self, target: Option<Value>) {
        self.current_scope().selection_target = Some(target);
    }

    fn inliner(&self) -> Option<&Arc<dyn Inliner>> {
        self.lookup(|scope| scope.inliner.as_ref()).and_then(Option::as_ref)
    }

    fn set_inliner(&mut self, inliner: Option<Arc<dyn Inliner>>) {
        self.current_scope().inliner = Some(inliner);
    }
}

impl fmt::Debug for StandardEngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardEngineContext")
            .field("level", &self.level)
            .field("variables", &self.variable_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context() -> StandardEngineContext {
        let configuration = Arc::new(EngineConfiguration::builder().build().unwrap());
        StandardEngineContext::with_variables(
            configuration,
            TemplateData::new(Some("test"), TemplateMode::Html),
            &json!({"a": 1, "b": "two"}),
        )
    }

    #[test]
    fn test_local_variables_are_scoped_to_levels() {
        let mut ctx = context();
        ctx.increase_level();
        ctx.set_variable("a", json!(10));
        ctx.set_variable("c", json!(true));
        ctx.increase_level();
        assert_eq!(ctx.variable("a"), Some(&json!(10)));
        ctx.decrease_level();
        ctx.decrease_level();
        assert_eq!(ctx.variable("a"), Some(&json!(1)));
        assert_eq!(ctx.variable("c"), None);
        assert_eq!(ctx.level(), 0);
    }

    #[test]
    fn test_removal_is_scoped_too() {
        let mut ctx = context();
        ctx.increase_level();
        ctx.remove_variable("b");
        assert!(!ctx.contains_variable("b"));
        assert_eq!(ctx.variable_names(), vec!["a".to_string()]);
        ctx.decrease_level();
        assert_eq!(ctx.variable("b"), Some(&json!("two")));
    }

    #[test]
    fn test_selection_target_and_inliner() {
        let mut ctx = context();
        assert!(ctx.selection_target().is_none());
        ctx.increase_level();
        ctx.set_selection_target(Some(json!({"x": 1})));
        ctx.set_inliner(Some(Arc::new(NoOpInliner)));
        assert_eq!(ctx.inliner().map(|i| i.name().to_string()), Some("NONE".to_string()));
        ctx.decrease_level();
        assert!(ctx.selection_target().is_none());
        assert!(ctx.inliner().is_none());
    }

    #[test]
    fn test_template_data_per_level() {
        let mut ctx = context();
        ctx.increase_level();
        ctx.set_template_data(TemplateData::new(Some("fragment"), TemplateMode::Text));
        assert_eq!(ctx.template_mode(), TemplateMode::Text);
        ctx.decrease_level();
        assert_eq!(ctx.template_data().template_name.as_deref(), Some("test"));
    }

    #[test]
    fn test_decrease_at_zero_is_ignored() {
        let mut ctx = context();
        ctx.decrease_level();
        assert_eq!(ctx.level(), 0);
        assert_eq!(ctx.variable("a"), Some(&json!(1)));
    }
}
