//! Checks the engine performs around processing: level bookkeeping at
//! template end, dialect registration and error locations.

mod common;

use std::sync::Arc;

use common::{dialect, process};
use pretty_assertions::assert_eq;
use serde_json::json;
use thymeleaf_events::{
    Dialect, EngineConfiguration, EngineContext, Error, StandardEngineContext, TemplateData, TemplateManager, TemplateMode,
};

#[test]
fn test_unbalanced_context_level_fails_at_template_end() {
    let err = process("<p th:unbalance=\"\">x</p>", TemplateMode::Html, &json!({})).unwrap_err();

    assert!(err.is_processing());
    let message = err.to_string();
    assert!(message.contains("Context level after processing (1)"), "{message}");
    assert!(message.contains("does not correspond to context level before processing (0)"), "{message}");
}

#[test]
fn test_level_check_is_relative_to_the_starting_level() {
    let configuration = common::configuration();
    let manager = TemplateManager::new(Arc::clone(&configuration));
    let mut context = StandardEngineContext::new(configuration, TemplateData::new(None, TemplateMode::Html));
    context.increase_level();

    let output = manager.process_in_context("<p th:text=\"'x'\">y</p>", &mut context).unwrap();
    assert_eq!(output, "<p>x</p>");
    assert_eq!(context.level(), 1);
}

#[test]
fn test_processor_errors_carry_the_template_location() {
    let err = process("<div>\n  <p th:remove=\"sometimes\">x</p>\n</div>", TemplateMode::Html, &json!({}))
        .unwrap_err();
    match err {
        Error::TemplateProcessing { location, .. } => {
            assert_eq!(location.template_name.as_deref(), Some("test"));
            assert_eq!(location.line, Some(2));
            assert_eq!(location.col, Some(3));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_parse_errors_are_reported() {
    let err = process("<p>\n<!-- unterminated", TemplateMode::Html, &json!({})).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
}

#[test]
fn test_duplicate_dialect_prefix_is_rejected() {
    let result = EngineConfiguration::builder()
        .dialect(dialect())
        .dialect(Dialect::new("other", Some("TH"), 10))
        .build();
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn test_duplicate_dialect_name_is_rejected() {
    let result = EngineConfiguration::builder()
        .dialect(Dialect::new("same", Some("a"), 10))
        .dialect(Dialect::new("same", Some("b"), 20))
        .build();
    assert!(result.is_err());
}

#[test]
fn test_processors_are_ordered_by_precedence() {
    let configuration = common::configuration();
    let processors = configuration.element_processors(TemplateMode::Html);
    let precedences: Vec<i32> = processors.iter().map(|p| p.order().precedence).collect();
    let mut sorted = precedences.clone();
    sorted.sort();
    assert_eq!(precedences, sorted);
    assert!(configuration.element_processors(TemplateMode::Xml).is_empty());
}
