//! Template processing entry point
//!
//! [`TemplateManager`] ties the pieces together for one engine configuration:
//! it parses template sources (through the cache selected by its
//! [`TemplateConfig`]), replays the parsed model through a
//! [`ProcessorTemplateHandler`] and collects what comes out of it.
//!
//! ```rust,ignore
//! use serde_json::json;
//! use thymeleaf_events::{EngineConfiguration, TemplateManager, TemplateMode};
//!
//! let manager = TemplateManager::new(Arc::new(EngineConfiguration::builder().dialect(standard()).build()?));
//! let html = manager.process(Some("greeting"), "<p th:text=\"${name}\">x</p>", TemplateMode::Html, &json!({"name": "World"}))?;
//! ```

use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::cache::{global_cache, CacheStats, TemplateCache, TemplateCacheKey};
use crate::config::{CacheMode, EngineConfiguration, TemplateConfig};
use crate::context::{EngineContext, StandardEngineContext, TemplateData};
use crate::error::{Error, Result};
use crate::model::ImmutableModel;
use crate::parser;
use crate::processor_template_handler::ProcessorTemplateHandler;
use crate::template_handler::{OutputTemplateHandler, TemplateHandler};
use crate::template_mode::TemplateMode;

pub struct TemplateManager {
    configuration: Arc<EngineConfiguration>,
    config: TemplateConfig,
    cache: TemplateCache,
}

impl TemplateManager {
    pub fn new(configuration: Arc<EngineConfiguration>) -> Self {
        Self::with_config(configuration, TemplateConfig::default())
    }

    pub fn with_config(configuration: Arc<EngineConfiguration>, config: TemplateConfig) -> Self {
        let cache = TemplateCache::with_capacity(config.cache_capacity());
        Self {
            configuration,
            config,
            cache,
        }
    }

    pub fn configuration(&self) -> &Arc<EngineConfiguration> {
        &self.configuration
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// Parse a template, going through the cache unless caching is disabled
    pub fn parse(&self, template_name: Option<&str>, source: &str, template_mode: TemplateMode) -> Result<ImmutableModel> {
        let parse = || {
            parser::parse_template(&self.configuration, template_mode, template_name, source)
                .map(ImmutableModel::from)
        };
        match self.config.cache_mode() {
            CacheMode::None => parse(),
            CacheMode::Normal => self
                .cache
                .get_or_parse(&TemplateCacheKey::new(template_name, source, template_mode), parse),
            CacheMode::Aggressive => {
                global_cache().get_or_parse(&TemplateCacheKey::new(template_name, source, template_mode), parse)
            }
        }
    }

    /// Process a template with the entries of `variables` (a JSON object) as
    /// context variables, returning the output
    pub fn process(
        &self,
        template_name: Option<&str>,
        source: &str,
        template_mode: TemplateMode,
        variables: &Value,
    ) -> Result<String> {
        let mut context = StandardEngineContext::with_variables(
            Arc::clone(&self.configuration),
            TemplateData::new(template_name, template_mode),
            variables,
        );
        self.process_in_context(source, &mut context)
    }

    /// Process a template in an existing context
    ///
    /// Name and mode of the template come from the context's template data.
    pub fn process_in_context(&self, source: &str, context: &mut dyn EngineContext) -> Result<String> {
        let output = OutputTemplateHandler::with_capacity(source.len());
        Ok(self.process_with_handler(source, context, output)?.into_output())
    }

    /// Process a template, sending the resulting events to `handler`
    ///
    /// The handler is returned once the whole template went through it.
    pub fn process_with_handler<H: TemplateHandler>(
        &self,
        source: &str,
        context: &mut dyn EngineContext,
        handler: H,
    ) -> Result<H> {
        if !Arc::ptr_eq(context.configuration(), &self.configuration) {
            return Err(Error::invalid_static(
                "Context was created for another engine configuration than the template manager's",
            ));
        }
        let template_data = context.template_data().clone();
        let model = self.parse(
            template_data.template_name.as_deref(),
            source,
            template_data.template_mode,
        )?;
        debug!(
            target: "thymeleaf.engine",
            "processing {:?} ({}, {} events)",
            template_data.template_name,
            template_data.template_mode,
            model.len()
        );

        let mut processor = ProcessorTemplateHandler::new(context, handler);
        model.process(&mut processor)?;
        Ok(processor.into_next())
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
