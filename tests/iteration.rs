//! Iteration integration tests
//!
//! Covers iterated elements in markup and textual modes, including the
//! whitespace reshaping between iterations and context level bookkeeping.

mod common;

use std::sync::Arc;

use common::{manager, process, process_html};
use pretty_assertions::assert_eq;
use serde_json::json;
use thymeleaf_events::{EngineContext, StandardEngineContext, TemplateData, TemplateMode};

#[test]
fn test_each_with_inlined_body() {
    let manager = manager();
    let mut context = StandardEngineContext::with_variables(
        Arc::clone(manager.configuration()),
        TemplateData::new(Some("list"), TemplateMode::Html),
        &json!({ "items": [1, 2] }),
    );
    let before = context.level();

    let result = manager
        .process_in_context("<li th:each=\"i : ${items}\">[[${i}]]</li>", &mut context)
        .unwrap();

    assert_eq!(result, "<li>1</li><li>2</li>");
    assert_eq!(context.level(), before);
    assert!(!context.contains_variable("i"));
}

#[test]
fn test_preceding_white_space_is_repeated() {
    let template = "<ul>\n  <li th:each=\"i : ${items}\" th:text=\"${i}\">x</li>\n</ul>";
    assert_eq!(
        process_html(template, &json!({ "items": ["a", "b", "c"] })),
        "<ul>\n  <li>a</li>\n  <li>b</li>\n  <li>c</li>\n</ul>"
    );
}

#[test]
fn test_status_variables() {
    let data = json!({ "items": ["a", "b"] });
    assert_eq!(
        process_html("<p th:each=\"i : ${items}\" th:text=\"${iStat.count}\">x</p>", &data),
        "<p>1</p><p>2</p>"
    );
    assert_eq!(
        process_html("<p th:each=\"i, s : ${items}\">[[${s.index}]]/[[${s.size}]]</p>", &data),
        "<p>0/2</p><p>1/2</p>"
    );
}

#[test]
fn test_object_entries() {
    let data = json!({ "counts": { "x": 1 } });
    assert_eq!(
        process_html("<dt th:each=\"e : ${counts}\">[[${e.key}]]=[[${e.value}]]</dt>", &data),
        "<dt>x=1</dt>"
    );
}

#[test]
fn test_empty_iterable_removes_the_element() {
    let data = json!({ "items": [] });
    assert_eq!(
        process_html("<ul><li th:each=\"i : ${items}\">x</li></ul>", &data),
        "<ul></ul>"
    );
    assert_eq!(
        process_html("<ul><li th:each=\"i : ${missing}\"/></ul>", &json!({})),
        "<ul></ul>"
    );
}

#[test]
fn test_nested_iteration() {
    let template = "<tr th:each=\"row : ${rows}\"><td th:each=\"cell : ${row}\">[[${cell}]]</td></tr>";
    let data = json!({ "rows": [[1, 2], [3]] });
    assert_eq!(
        process_html(template, &data),
        "<tr><td>1</td><td>2</td></tr><tr><td>3</td></tr>"
    );
}

#[test]
fn test_iterated_standalone_element() {
    let data = json!({ "srcs": ["a.png", "b.png"] });
    assert_eq!(
        process_html("<img th:each=\"s : ${srcs}\" th:class=\"${s}\">", &data),
        "<img class=\"a.png\"><img class=\"b.png\">"
    );
}

#[test]
fn test_textual_iteration_does_not_add_blank_lines() {
    let template = "[#th:block th:each=\"x : ${xs}\"]\n  - [[${x}]]\n[/th:block]";
    let result = process(template, TemplateMode::Text, &json!({ "xs": [1, 2, 3] })).unwrap();

    // One leading line break, one per item, no blank line in between
    assert_eq!(result, "\n  - 1\n  - 2\n  - 3\n");
    assert!(!result.contains("\n\n"));
}

#[test]
fn test_textual_single_iteration_keeps_the_body() {
    let template = "[#th:block th:each=\"x : ${xs}\"]\n  - [[${x}]]\n[/th:block]";
    let result = process(template, TemplateMode::Text, &json!({ "xs": ["only"] })).unwrap();
    assert_eq!(result, "\n  - only\n");
}
