//! Element and attribute definitions
//!
//! A definition ties an interned name to its static metadata (HTML element
//! type, boolean attribute flag) and to the precedence-ordered processors that
//! statically match that name. Definition repositories belong to an
//! [`EngineConfiguration`](crate::config::EngineConfiguration), since the set
//! of processors is a configuration concern.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::names::{AttributeName, AttributeNames, ElementName, ElementNames};
use crate::processor::ElementProcessor;
use crate::template_mode::TemplateMode;

/// Structural type of an HTML element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HtmlElementType {
    /// No content and no close tag (`<br>`)
    Void,
    Normal,
    /// Content is not parsed as markup (`<script>`, `<style>`)
    RawText,
    /// Content is text but may contain character references (`<title>`)
    EscapableRawText,
}

pub const STANDARD_HTML_ELEMENTS: &[(&str, HtmlElementType)] = &[
    ("html", HtmlElementType::Normal),
    ("head", HtmlElementType::Normal),
    ("title", HtmlElementType::EscapableRawText),
    ("base", HtmlElementType::Void),
    ("link", HtmlElementType::Void),
    ("meta", HtmlElementType::Void),
    ("style", HtmlElementType::RawText),
    ("script", HtmlElementType::RawText),
    ("noscript", HtmlElementType::Normal),
    ("body", HtmlElementType::Normal),
    ("article", HtmlElementType::Normal),
    ("section", HtmlElementType::Normal),
    ("nav", HtmlElementType::Normal),
    ("aside", HtmlElementType::Normal),
    ("h1", HtmlElementType::Normal),
    ("h2", HtmlElementType::Normal),
    ("h3", HtmlElementType::Normal),
    ("h4", HtmlElementType::Normal),
    ("h5", HtmlElementType::Normal),
    ("h6", HtmlElementType::Normal),
    ("hgroup", HtmlElementType::Normal),
    ("header", HtmlElementType::Normal),
    ("footer", HtmlElementType::Normal),
    ("address", HtmlElementType::Normal),
    ("main", HtmlElementType::Normal),
    ("p", HtmlElementType::Normal),
    ("hr", HtmlElementType::Void),
    ("pre", HtmlElementType::Normal),
    ("blockquote", HtmlElementType::Normal),
    ("ol", HtmlElementType::Normal),
    ("ul", HtmlElementType::Normal),
    ("li", HtmlElementType::Normal),
    ("dl", HtmlElementType::Normal),
    ("dt", HtmlElementType::Normal),
    ("dd", HtmlElementType::Normal),
    ("figure", HtmlElementType::Normal),
    ("figcaption", HtmlElementType::Normal),
    ("div", HtmlElementType::Normal),
    ("a", HtmlElementType::Normal),
    ("em", HtmlElementType::Normal),
    ("strong", HtmlElementType::Normal),
    ("small", HtmlElementType::Normal),
    ("s", HtmlElementType::Normal),
    ("cite", HtmlElementType::Normal),
    ("g", HtmlElementType::Normal),
    ("dfn", HtmlElementType::Normal),
    ("abbr", HtmlElementType::Normal),
    ("time", HtmlElementType::Normal),
    ("code", HtmlElementType::Normal),
    ("var", HtmlElementType::Normal),
    ("samp", HtmlElementType::Normal),
    ("kbd", HtmlElementType::Normal),
    ("sub", HtmlElementType::Normal),
    ("sup", HtmlElementType::Normal),
    ("i", HtmlElementType::Normal),
    ("b", HtmlElementType::Normal),
    ("u", HtmlElementType::Normal),
    ("mark", HtmlElementType::Normal),
    ("ruby", HtmlElementType::Normal),
    ("rt", HtmlElementType::Normal),
    ("rp", HtmlElementType::Normal),
    ("bdi", HtmlElementType::Normal),
    ("bdo", HtmlElementType::Normal),
    ("span", HtmlElementType::Normal),
    ("br", HtmlElementType::Void),
    ("wbr", HtmlElementType::Void),
    ("ins", HtmlElementType::Normal),
    ("del", HtmlElementType::Normal),
    ("img", HtmlElementType::Void),
    ("iframe", HtmlElementType::Normal),
    ("embed", HtmlElementType::Void),
    ("object", HtmlElementType::Normal),
    ("param", HtmlElementType::Void),
    ("video", HtmlElementType::Normal),
    ("audio", HtmlElementType::Normal),
    ("source", HtmlElementType::Void),
    ("track", HtmlElementType::Void),
    ("canvas", HtmlElementType::Normal),
    ("map", HtmlElementType::Normal),
    ("area", HtmlElementType::Void),
    ("table", HtmlElementType::Normal),
    ("caption", HtmlElementType::Normal),
    ("colgroup", HtmlElementType::Normal),
    ("col", HtmlElementType::Void),
    ("tbody", HtmlElementType::Normal),
    ("thead", HtmlElementType::Normal),
    ("tfoot", HtmlElementType::Normal),
    ("tr", HtmlElementType::Normal),
    ("td", HtmlElementType::Normal),
    ("th", HtmlElementType::Normal),
    ("form", HtmlElementType::Normal),
    ("fieldset", HtmlElementType::Normal),
    ("legend", HtmlElementType::Normal),
    ("label", HtmlElementType::Normal),
    ("input", HtmlElementType::Void),
    ("button", HtmlElementType::Normal),
    ("select", HtmlElementType::Normal),
    ("datalist", HtmlElementType::Normal),
    ("optgroup", HtmlElementType::Normal),
    ("option", HtmlElementType::Normal),
    ("textarea", HtmlElementType::EscapableRawText),
    ("keygen", HtmlElementType::Void),
    ("output", HtmlElementType::Normal),
    ("progress", HtmlElementType::Normal),
    ("meter", HtmlElementType::Normal),
    ("details", HtmlElementType::Normal),
    ("summary", HtmlElementType::Normal),
    ("command", HtmlElementType::Normal),
    ("menu", HtmlElementType::Normal),
    ("menuitem", HtmlElementType::Void),
    ("dialog", HtmlElementType::Normal),
];

pub const STANDARD_HTML_ATTRIBUTE_NAMES: &[&str] = &[
    "abbr", "accept", "accept-charset", "accesskey", "action", "align", "alt", "archive", "async",
    "autocomplete", "autofocus", "autoplay", "axis", "border", "cellpadding", "cellspacing",
    "challenge", "char", "charoff", "charset", "checked", "cite", "class", "classid",
    "codebase", "codetype", "cols", "colspan", "command", "content", "contenteditable",
    "contextmenu", "controls", "coords", "data", "datetime", "declare", "default",
    "defer", "dir", "disabled", "draggable", "dropzone", "enctype", "for", "form",
    "formaction", "formenctype", "formmethod", "formnovalidate", "formtarget",
    "frame", "headers", "height", "hidden", "high", "href", "hreflang", "http-equiv",
    "icon", "id", "ismap", "keytype", "kind", "label", "lang", "list", "longdesc",
    "loop", "low", "max", "maxlength", "media", "method", "min", "multiple", "muted",
    "name", "nohref", "novalidate", "nowrap", "onabort", "onafterprint", "onbeforeprint",
    "onbeforeunload", "onblur", "oncanplay", "oncanplaythrough", "onchange",
    "onclick", "oncontextmenu", "oncuechange", "ondblclick", "ondrag", "ondragend",
    "ondragenter", "ondragleave", "ondragover", "ondragstart", "ondrop",
    "ondurationchange", "onemptied", "onended", "onerror", "onfocus",
    "onformchange", "onforminput", "onhaschange", "oninput", "oninvalid", "onkeydown",
    "onkeypress", "onkeyup", "onload", "onloadeddata", "onloadedmetadata",
    "onloadstart", "onmessage", "onmousedown", "onmousemove", "onmouseout", "onmouseover",
    "onmouseup", "onmousewheel", "onoffline", "ononline", "onpagehide", "onpageshow",
    "onpause", "onplay", "onplaying", "onpopstate", "onprogress", "onratechange",
    "onredo", "onreset", "onresize", "onscroll", "onseeked", "onseeking",
    "onselect", "onstalled", "onstorage", "onsubmit", "onsuspend", "ontimeupdate",
    "onundo", "onunload", "onvolumechange", "onwaiting", "open", "optimum", "pattern",
    "placeholder", "poster", "preload", "profile", "pubdate", "radiogroup", "readonly", "rel",
    "required", "rev", "reversed", "rows", "rowspan", "rules", "scheme", "scope", "scoped",
    "seamless", "selected", "shape", "size", "span", "spellcheck", "src", "srclang", "standby",
    "style", "summary", "tabindex", "title", "translate", "type", "usemap", "valign", "value",
    "valuetype", "width", "xml:lang", "xml:space", "xmlns",
];

pub const STANDARD_HTML_BOOLEAN_ATTRIBUTE_NAMES: &[&str] = &[
    "async", "autofocus", "autoplay", "checked", "controls", "declare", "default", "defer",
    "disabled", "formnovalidate", "hidden", "ismap", "loop", "multiple", "novalidate",
    "nowrap", "open", "pubdate", "readonly", "required", "reversed", "selected", "scoped",
    "seamless",
];

#[derive(Debug)]
struct ElementDefinitionData {
    name: ElementName,
    html_type: Option<HtmlElementType>,
    processors: Arc<[ElementProcessor]>,
}

/// Immutable definition of an element name
#[derive(Clone)]
pub struct ElementDefinition(Arc<ElementDefinitionData>);

impl ElementDefinition {
    pub fn element_name(&self) -> &ElementName {
        &self.0.name
    }

    /// `None` outside HTML mode
    pub fn html_element_type(&self) -> Option<HtmlElementType> {
        self.0.html_type
    }

    pub fn is_void(&self) -> bool {
        self.0.html_type == Some(HtmlElementType::Void)
    }

    /// Processors bound to this element, in execution order
    pub fn associated_processors(&self) -> &Arc<[ElementProcessor]> {
        &self.0.processors
    }

    pub fn has_associated_processors(&self) -> bool {
        !self.0.processors.is_empty()
    }
}

impl PartialEq for ElementDefinition {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ElementDefinition {}

impl fmt::Debug for ElementDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementDefinition")
            .field("name", &self.0.name)
            .field("html_type", &self.0.html_type)
            .field("processors", &self.0.processors.len())
            .finish()
    }
}

impl fmt::Display for ElementDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

#[derive(Debug)]
struct AttributeDefinitionData {
    name: AttributeName,
    boolean: bool,
    processors: Arc<[ElementProcessor]>,
}

/// Immutable definition of an attribute name
#[derive(Clone)]
pub struct AttributeDefinition(Arc<AttributeDefinitionData>);

impl AttributeDefinition {
    pub fn attribute_name(&self) -> &AttributeName {
        &self.0.name
    }

    /// Standard HTML boolean attribute (`checked`, `disabled`...)
    pub fn is_boolean(&self) -> bool {
        self.0.boolean
    }

    pub fn associated_processors(&self) -> &Arc<[ElementProcessor]> {
        &self.0.processors
    }

    pub fn has_associated_processors(&self) -> bool {
        !self.0.processors.is_empty()
    }
}

impl PartialEq for AttributeDefinition {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for AttributeDefinition {}

impl fmt::Debug for AttributeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDefinition")
            .field("name", &self.0.name)
            .field("boolean", &self.0.boolean)
            .field("processors", &self.0.processors.len())
            .finish()
    }
}

/// Per-mode processors from which definitions compute their associations
pub type ProcessorsByMode = HashMap<TemplateMode, Vec<ElementProcessor>>;

/// Two-tier definition cache: an immutable map built at configuration time,
/// then a lock-protected map for names met while processing
struct DefinitionRepository<N, D> {
    standard: HashMap<N, D>,
    dynamic: RwLock<HashMap<N, D>>,
}

impl<N, D> DefinitionRepository<N, D>
where
    N: std::hash::Hash + Eq + Clone,
    D: Clone,
{
    fn new(standard: HashMap<N, D>) -> Self {
        Self {
            standard,
            dynamic: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, name: &N, build: impl FnOnce() -> D) -> D {
        if let Some(definition) = self.standard.get(name) {
            return definition.clone();
        }
        {
            let dynamic = self.dynamic.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(definition) = dynamic.get(name) {
                return definition.clone();
            }
        }
        let mut dynamic = self.dynamic.write().unwrap_or_else(PoisonError::into_inner);
        // Re-check: the name may have been stored while waiting for the write lock
        if let Some(definition) = dynamic.get(name) {
            return definition.clone();
        }
        let definition = build();
        dynamic.insert(name.clone(), definition.clone());
        definition
    }
}

/// Element definitions for every template mode
pub struct ElementDefinitions {
    processors: ProcessorsByMode,
    repositories: HashMap<TemplateMode, DefinitionRepository<ElementName, ElementDefinition>>,
}

impl ElementDefinitions {
    /// Build the repositories from the sorted element processors of each mode
    pub fn new(processors: ProcessorsByMode) -> Result<Self> {
        let mut repositories = HashMap::new();
        for mode in TemplateMode::ALL {
            if mode == TemplateMode::Raw {
                continue;
            }
            let mut standard = HashMap::new();
            if mode == TemplateMode::Html {
                let html_processors = processors.get(&mode).map(Vec::as_slice).unwrap_or(&[]);
                for (name, html_type) in STANDARD_HTML_ELEMENTS {
                    let element_name = ElementNames::for_name(mode, name)?;
                    let definition = build_element_definition(html_processors, mode, &element_name, Some(*html_type));
                    standard.insert(element_name, definition);
                }
            }
            repositories.insert(mode, DefinitionRepository::new(standard));
        }
        Ok(Self {
            processors,
            repositories,
        })
    }

    pub fn for_name(&self, template_mode: TemplateMode, element_name: &str) -> Result<ElementDefinition> {
        let name = ElementNames::for_name(template_mode, element_name)?;
        self.for_element_name(&name)
    }

    pub fn for_prefixed_name(
        &self,
        template_mode: TemplateMode,
        prefix: Option<&str>,
        element_name: &str,
    ) -> Result<ElementDefinition> {
        let name = ElementNames::for_prefixed_name(template_mode, prefix, element_name)?;
        self.for_element_name(&name)
    }

    pub fn for_element_name(&self, name: &ElementName) -> Result<ElementDefinition> {
        let mode = name.template_mode();
        let repository = self.repositories.get(&mode).ok_or_else(|| {
            Error::invalid_owned(format!("No element definitions for template mode {mode}"))
        })?;
        let processors = self.processors.get(&mode).map(Vec::as_slice).unwrap_or(&[]);
        // Non-standard HTML elements are treated as normal elements
        let html_type = (mode == TemplateMode::Html).then_some(HtmlElementType::Normal);
        Ok(repository.get(name, || build_element_definition(processors, mode, name, html_type)))
    }
}

fn build_element_definition(
    processors: &[ElementProcessor],
    template_mode: TemplateMode,
    name: &ElementName,
    html_type: Option<HtmlElementType>,
) -> ElementDefinition {
    let associated: Vec<ElementProcessor> = processors
        .iter()
        .filter(|p| p.template_mode() == template_mode)
        // Processors bound to an attribute are associated through the attribute definition
        .filter(|p| !p.is_attribute_bound())
        .filter(|p| p.matching_element_name().map_or(true, |m| m.matches(name)))
        .cloned()
        .collect();
    ElementDefinition(Arc::new(ElementDefinitionData {
        name: name.clone(),
        html_type,
        processors: associated.into(),
    }))
}

/// Attribute definitions for every template mode
pub struct AttributeDefinitions {
    processors: ProcessorsByMode,
    repositories: HashMap<TemplateMode, DefinitionRepository<AttributeName, AttributeDefinition>>,
}

impl AttributeDefinitions {
    pub fn new(processors: ProcessorsByMode) -> Result<Self> {
        let mut repositories = HashMap::new();
        for mode in TemplateMode::ALL {
            if mode == TemplateMode::Raw {
                continue;
            }
            let mut standard = HashMap::new();
            if mode == TemplateMode::Html {
                let html_processors = processors.get(&mode).map(Vec::as_slice).unwrap_or(&[]);
                for name in STANDARD_HTML_ATTRIBUTE_NAMES {
                    let attribute_name = AttributeNames::for_name(mode, name)?;
                    let definition = build_attribute_definition(html_processors, mode, &attribute_name);
                    standard.insert(attribute_name, definition);
                }
            }
            repositories.insert(mode, DefinitionRepository::new(standard));
        }
        Ok(Self {
            processors,
            repositories,
        })
    }

    pub fn for_name(&self, template_mode: TemplateMode, attribute_name: &str) -> Result<AttributeDefinition> {
        let name = AttributeNames::for_name(template_mode, attribute_name)?;
        self.for_attribute_name(&name)
    }

    pub fn for_prefixed_name(
        &self,
        template_mode: TemplateMode,
        prefix: Option<&str>,
        attribute_name: &str,
    ) -> Result<AttributeDefinition> {
        let name = AttributeNames::for_prefixed_name(template_mode, prefix, attribute_name)?;
        self.for_attribute_name(&name)
    }

    pub fn for_attribute_name(&self, name: &AttributeName) -> Result<AttributeDefinition> {
        let mode = name.template_mode();
        let repository = self.repositories.get(&mode).ok_or_else(|| {
            Error::invalid_owned(format!("No attribute definitions for template mode {mode}"))
        })?;
        let processors = self.processors.get(&mode).map(Vec::as_slice).unwrap_or(&[]);
        Ok(repository.get(name, || build_attribute_definition(processors, mode, name)))
    }
}

fn build_attribute_definition(
    processors: &[ElementProcessor],
    template_mode: TemplateMode,
    name: &AttributeName,
) -> AttributeDefinition {
    let associated: Vec<ElementProcessor> = processors
        .iter()
        .filter(|p| p.template_mode() == template_mode)
        .filter(|p| match p.matching_attribute_name() {
            Some(m) => !m.is_matching_all_attributes() && m.matches(name),
            None => false,
        })
        .cloned()
        .collect();
    let boolean = template_mode == TemplateMode::Html
        && !name.has_prefix()
        && STANDARD_HTML_BOOLEAN_ATTRIBUTE_NAMES.contains(&name.name());
    AttributeDefinition(Arc::new(AttributeDefinitionData {
        name: name.clone(),
        boolean,
        processors: associated.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> (ElementDefinitions, AttributeDefinitions) {
        (
            ElementDefinitions::new(ProcessorsByMode::new()).unwrap(),
            AttributeDefinitions::new(ProcessorsByMode::new()).unwrap(),
        )
    }

    #[test]
    fn test_standard_html_element_types() {
        let (elements, _) = empty();
        let br = elements.for_name(TemplateMode::Html, "BR").unwrap();
        assert_eq!(br.html_element_type(), Some(HtmlElementType::Void));
        assert!(br.is_void());
        let script = elements.for_name(TemplateMode::Html, "script").unwrap();
        assert_eq!(script.html_element_type(), Some(HtmlElementType::RawText));
        let custom = elements.for_name(TemplateMode::Html, "my-widget").unwrap();
        assert_eq!(custom.html_element_type(), Some(HtmlElementType::Normal));
        let xml = elements.for_name(TemplateMode::Xml, "br").unwrap();
        assert_eq!(xml.html_element_type(), None);
    }

    #[test]
    fn test_definitions_are_cached() {
        let (elements, attributes) = empty();
        let a = elements.for_name(TemplateMode::Xml, "item").unwrap();
        let b = elements.for_name(TemplateMode::Xml, "item").unwrap();
        assert_eq!(a, b);

        let c = attributes.for_name(TemplateMode::Html, "th:text").unwrap();
        let d = attributes.for_name(TemplateMode::Html, "data-th-text").unwrap();
        assert_eq!(c, d);
    }

    #[test]
    fn test_boolean_attributes() {
        let (_, attributes) = empty();
        assert!(attributes.for_name(TemplateMode::Html, "checked").unwrap().is_boolean());
        assert!(!attributes.for_name(TemplateMode::Html, "class").unwrap().is_boolean());
        assert!(!attributes.for_name(TemplateMode::Xml, "checked").unwrap().is_boolean());
    }

    #[test]
    fn test_raw_mode_has_no_definitions() {
        let (elements, _) = empty();
        assert!(elements.for_name(TemplateMode::Raw, "div").is_err());
    }
}
