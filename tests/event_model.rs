//! Event model integration tests: interned names, attribute whitespace and
//! the validation done by models and event queues.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use thymeleaf_events::{
    AttributeNames, ElementNames, EngineConfiguration, EngineEventQueue, ModelFactory, TemplateEnd, TemplateEvent,
    TemplateMode, TemplateStart, Text,
};

fn factory(template_mode: TemplateMode) -> ModelFactory {
    let configuration = Arc::new(EngineConfiguration::builder().build().unwrap());
    ModelFactory::new(configuration, template_mode)
}

#[test]
fn test_names_are_interned() {
    let upper = ElementNames::for_name(TemplateMode::Html, "DIV").unwrap();
    let lower = ElementNames::for_name(TemplateMode::Html, "div").unwrap();
    assert!(upper.is_same(&lower));
    assert_eq!(upper.canonical_name(), "div");

    let data = AttributeNames::for_name(TemplateMode::Html, "data-th-text").unwrap();
    let colon = AttributeNames::for_name(TemplateMode::Html, "th:text").unwrap();
    assert!(data.is_same(&colon));
    assert_eq!((colon.prefix(), colon.name()), (Some("th"), "text"));

    // XML is case-sensitive
    let item = ElementNames::for_name(TemplateMode::Xml, "item").unwrap();
    let capitalized = ElementNames::for_name(TemplateMode::Xml, "Item").unwrap();
    assert!(!item.is_same(&capitalized));
}

#[test]
fn test_created_events_write_as_markup() {
    let factory = factory(TemplateMode::Html);
    let open = factory
        .create_open_element_tag("p", &[("class", "a"), ("id", "b")])
        .unwrap();
    let close = factory.create_close_element_tag_for(&open);

    let mut model = factory.create_model();
    model.add(open).unwrap();
    model.add(factory.create_text("x")).unwrap();
    model.add(close).unwrap();
    assert_eq!(model.to_string(), "<p class=\"a\" id=\"b\">x</p>");

    let parsed = factory.parse("<b>y</b>").unwrap();
    model.insert_model(2, &parsed).unwrap();
    assert_eq!(model.to_string(), "<p class=\"a\" id=\"b\">x<b>y</b></p>");
}

#[test]
fn test_attribute_removal_keeps_surrounding_white_space() {
    let factory = factory(TemplateMode::Html);
    let parsed = factory.parse("<p  a=\"1\"\n   b=\"2\" >").unwrap();
    let mut tag = match parsed.get(0) {
        Some(TemplateEvent::OpenElement(open)) => open.clone(),
        other => panic!("unexpected event: {other:?}"),
    };

    assert!(tag.remove_attribute("a"));
    assert_eq!(TemplateEvent::from(tag.clone()).to_string(), "<p  b=\"2\" >");
    assert!(tag.remove_attribute("b"));
    assert!(!tag.remove_attribute("b"));
    assert_eq!(tag.attributes().len(), 0);
}

#[test]
fn test_models_reject_boundary_events() {
    let factory = factory(TemplateMode::Html);
    let mut model = factory.create_model_with(factory.create_text("x")).unwrap();

    assert!(model.insert(0, TemplateStart::new(None, TemplateMode::Html)).is_err());
    assert!(model.add(TemplateEnd::new(None, TemplateMode::Html)).is_err());
    assert!(model.insert(5, Text::new("y")).is_err());
    assert_eq!(model.len(), 1);
}

#[test]
fn test_queue_keeps_boundaries_at_the_edges() {
    let mut queue = EngineEventQueue::new(TemplateMode::Html);
    queue.build(TemplateStart::new(Some("t"), TemplateMode::Html).into());
    queue.build(Text::new("a").into());
    queue.build(TemplateEnd::new(Some("t"), TemplateMode::Html).into());

    assert!(queue.insert(0, Text::new("before").into()).is_err());
    assert!(queue.add(Text::new("after").into()).is_err());
    queue.insert(1, Text::new("b").into()).unwrap();
    assert!(queue.replace(0, Text::new("c").into()).is_err());

    let mut inner = EngineEventQueue::new(TemplateMode::Html);
    inner.add_queue(&queue).unwrap();
    let texts: Vec<String> = inner.iter().map(|e| e.to_string()).collect();
    assert_eq!(texts, vec!["b", "a"]);
}

#[test]
fn test_immutable_models_are_shared_snapshots() {
    let factory = factory(TemplateMode::Html);
    let model = factory.parse("<p>a</p>").unwrap();
    let frozen = model.clone().into_immutable();
    let copy = frozen.clone();

    let mut editable = frozen.to_model();
    editable.add(Text::new("b")).unwrap();

    assert_eq!(copy.to_string(), "<p>a</p>");
    assert_eq!(editable.to_string(), "<p>a</p>b");
    assert!(!editable.same_as(&model));
}
