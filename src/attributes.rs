//! Attributes of element tags
//!
//! [`Attributes`] is an ordered sequence of [`Attribute`]s interleaved with the
//! raw whitespace found between them, so that a tag writes back exactly as it
//! was parsed. `inner_white_spaces[i]` precedes `attributes[i]`, and there may
//! be one extra trailing whitespace before the tag closes:
//!
//! ```text
//! <div  class="a"
//!       id='b' >
//!     ^^      ^^^^^^^^      ^
//!     ws[0]   ws[1]         ws[2] (trailing)
//! ```
//!
//! Invariant: `inner_white_spaces.len()` is either `len()` or `len() + 1`.
//!
//! Tags hold their attributes behind an `Arc`, so cloned tags share them until
//! one of the clones mutates (`Arc::make_mut`). Every mutation increases
//! [`Attributes::version`], which tags use to know when their cached processor
//! list must be recomputed.

use std::fmt;
use std::sync::Arc;

use crate::definitions::{AttributeDefinition, AttributeDefinitions};
use crate::error::{Error, Result};
use crate::event::EventLocation;
use crate::names::{AttributeName, AttributeNames};
use crate::template_mode::TemplateMode;

const DEFAULT_WHITE_SPACE: &str = " ";
const DEFAULT_OPERATOR: &str = "=";

/// Quoting style of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeValueQuotes {
    Double,
    Single,
    None,
}

impl AttributeValueQuotes {
    fn quote(self) -> &'static str {
        match self {
            AttributeValueQuotes::Double => "\"",
            AttributeValueQuotes::Single => "'",
            AttributeValueQuotes::None => "",
        }
    }
}

/// One attribute occurrence in a tag
#[derive(Debug, Clone)]
pub struct Attribute {
    definition: AttributeDefinition,
    complete_name: Arc<str>,
    operator: Option<Arc<str>>,
    value: Option<Arc<str>>,
    value_quotes: AttributeValueQuotes,
    location: Option<EventLocation>,
}

impl Attribute {
    pub fn new(
        definition: AttributeDefinition,
        complete_name: &str,
        operator: Option<&str>,
        value: Option<&str>,
        value_quotes: AttributeValueQuotes,
        location: Option<EventLocation>,
    ) -> Self {
        let operator = match (operator, value) {
            (Some(op), _) => Some(Arc::from(op)),
            (None, Some(_)) => Some(Arc::from(DEFAULT_OPERATOR)),
            (None, None) => None,
        };
        Self {
            definition,
            complete_name: Arc::from(complete_name),
            operator,
            value: value.map(Arc::from),
            value_quotes,
            location,
        }
    }

    pub fn definition(&self) -> &AttributeDefinition {
        &self.definition
    }

    pub fn attribute_name(&self) -> &AttributeName {
        self.definition.attribute_name()
    }

    /// The name exactly as written in the template
    pub fn complete_name(&self) -> &str {
        &self.complete_name
    }

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn value_quotes(&self) -> AttributeValueQuotes {
        self.value_quotes
    }

    pub fn location(&self) -> Option<&EventLocation> {
        self.location.as_ref()
    }

    /// Copy of this attribute with a new name, value and quoting
    ///
    /// The definition is kept unless a new one is given, so that a name case
    /// change (`TH:TEXT` → `th:text`) does not lose it. The operator is kept.
    fn modified(
        &self,
        complete_name: &str,
        definition: Option<&AttributeDefinition>,
        value: Option<&str>,
        value_quotes: Option<AttributeValueQuotes>,
    ) -> Attribute {
        let operator = match (&self.operator, value) {
            (Some(op), _) => Some(Arc::clone(op)),
            (None, Some(_)) => Some(Arc::from(DEFAULT_OPERATOR)),
            (None, None) => None,
        };
        let mut value_quotes = value_quotes.unwrap_or(self.value_quotes);
        if value_quotes == AttributeValueQuotes::None && value.map_or(false, needs_quotes) {
            value_quotes = AttributeValueQuotes::Double;
        }
        Attribute {
            definition: definition.cloned().unwrap_or_else(|| self.definition.clone()),
            complete_name: Arc::from(complete_name),
            operator,
            value: value.map(Arc::from),
            value_quotes,
            location: self.location.clone(),
        }
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        writer.write_str(&self.complete_name)?;
        if let Some(value) = &self.value {
            writer.write_str(self.operator.as_deref().unwrap_or(DEFAULT_OPERATOR))?;
            let quote = self.value_quotes.quote();
            writer.write_str(quote)?;
            writer.write_str(value)?;
            writer.write_str(quote)?;
        }
        Ok(())
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f)
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '=' | '<' | '>' | '`'))
}

fn validate_set(
    template_mode: TemplateMode,
    value: Option<&str>,
    value_quotes: Option<AttributeValueQuotes>,
) -> Result<()> {
    if value.is_none() && template_mode == TemplateMode::Xml {
        return Err(Error::invalid_static(
            "Cannot set null-value attributes in XML template mode",
        ));
    }
    if value_quotes == Some(AttributeValueQuotes::None) {
        if template_mode == TemplateMode::Xml {
            return Err(Error::invalid_static(
                "Cannot set no-quote attributes when in XML template mode",
            ));
        }
        if value == Some("") {
            return Err(Error::invalid_static(
                "Cannot set an empty-string value to an attribute with no quotes",
            ));
        }
    }
    Ok(())
}

/// Ordered, versioned attribute collection with interleaved whitespace
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    attributes: Vec<Arc<Attribute>>,
    inner_white_spaces: Vec<Arc<str>>,
    version: u64,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-split parts, checking the whitespace invariant
    pub fn from_parts(attributes: Vec<Attribute>, inner_white_spaces: Vec<String>) -> Result<Self> {
        let n = attributes.len();
        if inner_white_spaces.len() != n && inner_white_spaces.len() != n + 1 {
            return Err(Error::invalid_owned(format!(
                "{} inner white spaces cannot surround {} attributes",
                inner_white_spaces.len(),
                n
            )));
        }
        Ok(Self {
            attributes: attributes.into_iter().map(Arc::new).collect(),
            inner_white_spaces: inner_white_spaces.into_iter().map(Arc::from).collect(),
            version: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Monotonic modification counter
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> + '_ {
        self.attributes.iter().map(|a| &**a)
    }

    pub fn get(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get(index).map(|a| &**a)
    }

    pub fn inner_white_spaces(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner_white_spaces.iter().map(|w| &**w)
    }

    pub fn has_trailing_white_space(&self) -> bool {
        self.inner_white_spaces.len() > self.attributes.len()
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Index of an attribute by the name it was written with, falling back to
    /// its canonical name (`data-th-text` is found when asking for `th:text`)
    pub fn index_of(&self, template_mode: TemplateMode, complete_name: &str) -> Option<usize> {
        let fast = self.attributes.iter().position(|a| {
            if template_mode.is_case_sensitive() {
                &*a.complete_name == complete_name
            } else {
                a.complete_name.eq_ignore_ascii_case(complete_name)
            }
        });
        if fast.is_some() {
            return fast;
        }
        let name = AttributeNames::for_name(template_mode, complete_name).ok()?;
        self.index_of_name(&name)
    }

    pub fn index_of_prefixed(&self, template_mode: TemplateMode, prefix: Option<&str>, name: &str) -> Option<usize> {
        let name = AttributeNames::for_prefixed_name(template_mode, prefix, name).ok()?;
        self.index_of_name(&name)
    }

    pub fn index_of_name(&self, name: &AttributeName) -> Option<usize> {
        self.attributes.iter().position(|a| a.attribute_name() == name)
    }

    pub fn has_attribute(&self, template_mode: TemplateMode, complete_name: &str) -> bool {
        self.index_of(template_mode, complete_name).is_some()
    }

    pub fn has_attribute_name(&self, name: &AttributeName) -> bool {
        self.index_of_name(name).is_some()
    }

    pub fn attribute(&self, template_mode: TemplateMode, complete_name: &str) -> Option<&Attribute> {
        self.index_of(template_mode, complete_name).map(|i| &*self.attributes[i])
    }

    pub fn attribute_by_name(&self, name: &AttributeName) -> Option<&Attribute> {
        self.index_of_name(name).map(|i| &*self.attributes[i])
    }

    pub fn value(&self, template_mode: TemplateMode, complete_name: &str) -> Option<&str> {
        self.attribute(template_mode, complete_name).and_then(Attribute::value)
    }

    // ------------------------------------------------------------------
    // Parse-time building
    // ------------------------------------------------------------------

    /// Append whitespace found by the parser, merging consecutive runs
    pub fn push_white_space(&mut self, white_space: &str) {
        if self.has_trailing_white_space() {
            if let Some(last) = self.inner_white_spaces.last_mut() {
                let merged = format!("{last}{white_space}");
                *last = Arc::from(merged);
            }
        } else {
            self.inner_white_spaces.push(Arc::from(white_space));
        }
        self.touch();
    }

    /// Append an attribute found by the parser
    ///
    /// An attribute directly after another one (`a="1"b="2"`) gets an empty
    /// whitespace slot so the invariant holds.
    pub fn push_attribute(&mut self, attribute: Attribute) {
        if !self.has_trailing_white_space() {
            self.inner_white_spaces.push(Arc::from(""));
        }
        self.attributes.push(Arc::new(attribute));
        self.touch();
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Set an attribute value, creating the attribute if needed
    ///
    /// An existing attribute keeps its position and definition, although the
    /// written name may change case. A new one is appended after a single
    /// space, keeping any trailing whitespace at the end of the tag.
    #[allow(clippy::too_many_arguments)]
    pub fn set_attribute(
        &mut self,
        definitions: &AttributeDefinitions,
        template_mode: TemplateMode,
        definition: Option<&AttributeDefinition>,
        complete_name: &str,
        value: Option<&str>,
        value_quotes: Option<AttributeValueQuotes>,
    ) -> Result<()> {
        validate_set(template_mode, value, value_quotes)?;

        let existing = match definition {
            Some(definition) => self.index_of_name(definition.attribute_name()),
            None => self.index_of(template_mode, complete_name),
        };
        if let Some(idx) = existing {
            let modified = self.attributes[idx].modified(complete_name, None, value, value_quotes);
            self.attributes[idx] = Arc::new(modified);
            self.touch();
            return Ok(());
        }

        let definition = match definition {
            Some(definition) => definition.clone(),
            None => definitions.for_name(template_mode, complete_name)?,
        };
        let mut value_quotes = value_quotes.unwrap_or(AttributeValueQuotes::Double);
        if value_quotes == AttributeValueQuotes::None && value.map_or(false, needs_quotes) {
            value_quotes = AttributeValueQuotes::Double;
        }
        let attribute = Attribute::new(definition, complete_name, None, value, value_quotes, None);

        if self.has_trailing_white_space() {
            // Respect the whitespace after the last attribute: it stays last
            let trailing = self.inner_white_spaces.pop();
            self.inner_white_spaces.push(Arc::from(DEFAULT_WHITE_SPACE));
            self.inner_white_spaces.extend(trailing);
        } else {
            self.inner_white_spaces.push(Arc::from(DEFAULT_WHITE_SPACE));
        }
        self.attributes.push(Arc::new(attribute));
        self.touch();
        Ok(())
    }

    /// Replace `old_name` with a new attribute, at the old one's position
    ///
    /// If the new attribute already exists it is modified instead and the old
    /// one removed. If the old one does not exist this behaves like
    /// [`set_attribute`](Self::set_attribute).
    #[allow(clippy::too_many_arguments)]
    pub fn replace_attribute(
        &mut self,
        definitions: &AttributeDefinitions,
        template_mode: TemplateMode,
        old_name: &AttributeName,
        definition: Option<&AttributeDefinition>,
        complete_name: &str,
        value: Option<&str>,
        value_quotes: Option<AttributeValueQuotes>,
    ) -> Result<()> {
        validate_set(template_mode, value, value_quotes)?;

        if definition.map_or(false, |d| d.attribute_name() == old_name) {
            return self.set_attribute(definitions, template_mode, definition, complete_name, value, value_quotes);
        }
        let Some(old_idx) = self.index_of_name(old_name) else {
            return self.set_attribute(definitions, template_mode, definition, complete_name, value, value_quotes);
        };

        let existing = match definition {
            Some(definition) => self.index_of_name(definition.attribute_name()),
            None => self.index_of(template_mode, complete_name),
        };
        if let Some(existing_idx) = existing {
            if existing_idx != old_idx {
                let modified = self.attributes[existing_idx].modified(complete_name, None, value, value_quotes);
                self.attributes[existing_idx] = Arc::new(modified);
                self.remove_at(old_idx);
                self.touch();
                return Ok(());
            }
        }

        let definition = match definition {
            Some(definition) => definition.clone(),
            None => definitions.for_name(template_mode, complete_name)?,
        };
        let modified = self.attributes[old_idx].modified(complete_name, Some(&definition), value, value_quotes);
        self.attributes[old_idx] = Arc::new(modified);
        self.touch();
        Ok(())
    }

    /// Remove an attribute by written or canonical name, returning whether it existed
    pub fn remove_attribute(&mut self, template_mode: TemplateMode, complete_name: &str) -> bool {
        match self.index_of(template_mode, complete_name) {
            Some(idx) => {
                self.remove_at(idx);
                self.touch();
                true
            }
            None => false,
        }
    }

    pub fn remove_prefixed_attribute(&mut self, template_mode: TemplateMode, prefix: Option<&str>, name: &str) -> bool {
        match self.index_of_prefixed(template_mode, prefix, name) {
            Some(idx) => {
                self.remove_at(idx);
                self.touch();
                true
            }
            None => false,
        }
    }

    pub fn remove_attribute_name(&mut self, name: &AttributeName) -> bool {
        match self.index_of_name(name) {
            Some(idx) => {
                self.remove_at(idx);
                self.touch();
                true
            }
            None => false,
        }
    }

    fn remove_at(&mut self, idx: usize) {
        let count = self.attributes.len();
        if count == 1 && self.inner_white_spaces.len() == 1 {
            self.attributes.clear();
            self.inner_white_spaces.clear();
            return;
        }
        self.attributes.remove(idx);
        // Drop the whitespace after the removed attribute, except for the last
        // one, where the whitespace before it goes and any trailing one stays
        let ws_idx = if idx + 1 == count { idx } else { idx + 1 };
        if ws_idx < self.inner_white_spaces.len() {
            self.inner_white_spaces.remove(ws_idx);
        }
    }

    /// Remove every attribute and whitespace
    pub fn clear_all(&mut self) {
        self.attributes.clear();
        self.inner_white_spaces.clear();
        self.touch();
    }

    pub fn write(&self, writer: &mut dyn fmt::Write) -> fmt::Result {
        for (i, attribute) in self.attributes.iter().enumerate() {
            let ws = self.inner_white_spaces.get(i).map_or(DEFAULT_WHITE_SPACE, |w| &**w);
            writer.write_str(ws)?;
            attribute.write(writer)?;
        }
        if let Some(trailing) = self.inner_white_spaces.get(self.attributes.len()) {
            writer.write_str(trailing)?;
        }
        Ok(())
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfiguration;
    use crate::definitions::ProcessorsByMode;
    use crate::event::TemplateEvent;

    fn definitions() -> AttributeDefinitions {
        AttributeDefinitions::new(ProcessorsByMode::new()).unwrap()
    }

    fn parsed(defs: &AttributeDefinitions, mode: TemplateMode, parts: &[(&str, &str, &str)], trailing: Option<&str>) -> Attributes {
        let mut attributes = Attributes::new();
        for (ws, name, value) in parts {
            attributes.push_white_space(ws);
            let definition = defs.for_name(mode, name).unwrap();
            attributes.push_attribute(Attribute::new(definition, name, None, Some(value), AttributeValueQuotes::Double, None));
        }
        if let Some(trailing) = trailing {
            attributes.push_white_space(trailing);
        }
        attributes
    }

    fn assert_invariant(attributes: &Attributes) {
        let ws = attributes.inner_white_spaces().count();
        assert!(ws == attributes.len() || ws == attributes.len() + 1, "{ws} vs {}", attributes.len());
    }

    #[test]
    fn test_write_preserves_layout() {
        let defs = definitions();
        let attrs = parsed(&defs, TemplateMode::Html, &[("  ", "class", "a"), ("\n   ", "id", "b")], Some(" "));
        assert_eq!(attrs.to_string(), "  class=\"a\"\n   id=\"b\" ");
    }

    #[test]
    fn test_set_new_attribute_keeps_trailing_white_space() {
        let defs = definitions();
        let mut attrs = parsed(&defs, TemplateMode::Html, &[(" ", "class", "a")], Some("\n"));
        attrs.set_attribute(&defs, TemplateMode::Html, None, "id", Some("x"), None).unwrap();
        assert_eq!(attrs.to_string(), " class=\"a\" id=\"x\"\n");
        assert_invariant(&attrs);
    }

    #[test]
    fn test_set_existing_attribute_in_place() {
        let defs = definitions();
        let mut attrs = parsed(&defs, TemplateMode::Html, &[(" ", "CLASS", "a"), (" ", "id", "b")], None);
        let before = attrs.version();
        attrs.set_attribute(&defs, TemplateMode::Html, None, "class", Some("z"), Some(AttributeValueQuotes::Single)).unwrap();
        assert_eq!(attrs.to_string(), " class='z' id=\"b\"");
        assert!(attrs.version() > before);
    }

    #[test]
    fn test_remove_last_attribute_keeps_trailing_white_space() {
        let defs = definitions();
        let mut attrs = parsed(&defs, TemplateMode::Html, &[(" ", "a", "1"), ("  ", "b", "2")], Some("\n"));
        assert!(attrs.remove_attribute(TemplateMode::Html, "b"));
        assert_eq!(attrs.to_string(), " a=\"1\"\n");
        assert_invariant(&attrs);
    }

    #[test]
    fn test_remove_middle_attribute_drops_following_white_space() {
        let defs = definitions();
        let mut attrs = parsed(&defs, TemplateMode::Html, &[(" ", "a", "1"), ("  ", "b", "2"), ("\t", "c", "3")], None);
        assert!(attrs.remove_attribute(TemplateMode::Html, "b"));
        assert_eq!(attrs.to_string(), " a=\"1\"  c=\"3\"");
        assert!(!attrs.remove_attribute(TemplateMode::Html, "zzz"));
    }

    #[test]
    fn test_remove_only_attribute() {
        let defs = definitions();
        let mut attrs = parsed(&defs, TemplateMode::Html, &[(" ", "a", "1")], None);
        attrs.remove_attribute(TemplateMode::Html, "a");
        assert!(attrs.is_empty());
        assert_eq!(attrs.inner_white_spaces().count(), 0);
    }

    #[test]
    fn test_lookup_by_canonical_name() {
        let defs = definitions();
        let attrs = parsed(&defs, TemplateMode::Html, &[(" ", "data-th-text", "${x}")], None);
        assert_eq!(attrs.value(TemplateMode::Html, "th:text"), Some("${x}"));
        assert_eq!(attrs.index_of_prefixed(TemplateMode::Html, Some("th"), "text"), Some(0));
    }

    #[test]
    fn test_replace_attribute() {
        let defs = definitions();
        let mut attrs = parsed(&defs, TemplateMode::Html, &[(" ", "th:href", "@{/a}"), (" ", "class", "x")], None);
        let old = AttributeNames::for_name(TemplateMode::Html, "th:href").unwrap();
        attrs.replace_attribute(&defs, TemplateMode::Html, &old, None, "href", Some("/a"), None).unwrap();
        assert_eq!(attrs.to_string(), " href=\"/a\" class=\"x\"");
        assert!(attrs.attribute(TemplateMode::Html, "href").is_some());
    }

    #[test]
    fn test_replace_attribute_onto_existing_one() {
        let defs = definitions();
        let mut attrs = parsed(&defs, TemplateMode::Html, &[(" ", "th:class", "y"), (" ", "class", "x")], None);
        let old = AttributeNames::for_name(TemplateMode::Html, "th:class").unwrap();
        attrs.replace_attribute(&defs, TemplateMode::Html, &old, None, "class", Some("y"), None).unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.value(TemplateMode::Html, "class"), Some("y"));
        assert_invariant(&attrs);
    }

    #[test]
    fn test_validation_failures() {
        let defs = definitions();
        let mut attrs = Attributes::new();
        assert!(attrs.set_attribute(&defs, TemplateMode::Xml, None, "a", None, None).is_err());
        assert!(attrs
            .set_attribute(&defs, TemplateMode::Xml, None, "a", Some("v"), Some(AttributeValueQuotes::None))
            .is_err());
        assert!(attrs
            .set_attribute(&defs, TemplateMode::Html, None, "a", Some(""), Some(AttributeValueQuotes::None))
            .is_err());
        assert_eq!(attrs.version(), 0);
    }

    #[test]
    fn test_boolean_attribute_written_without_value() {
        let defs = definitions();
        let mut attrs = Attributes::new();
        attrs.set_attribute(&defs, TemplateMode::Html, None, "checked", None, None).unwrap();
        assert_eq!(attrs.to_string(), " checked");
    }

    #[test]
    fn test_clear_all_bumps_version() {
        let defs = definitions();
        let mut attrs = parsed(&defs, TemplateMode::Html, &[(" ", "a", "1")], Some(" "));
        let before = attrs.version();
        attrs.clear_all();
        assert!(attrs.version() > before);
        assert_eq!(attrs.to_string(), "");
    }

    #[test]
    fn test_from_parts_checks_invariant() {
        assert!(Attributes::from_parts(Vec::new(), vec![" ".into(), " ".into()]).is_err());
        assert!(Attributes::from_parts(Vec::new(), vec![" ".into()]).is_ok());
    }

    #[test]
    fn test_reads_leave_version_unchanged() {
        let defs = definitions();
        let attrs = parsed(&defs, TemplateMode::Html, &[(" ", "data-th-text", "x"), (" ", "id", "y")], Some(" "));
        let before = attrs.version();
        assert_eq!(attrs.index_of(TemplateMode::Html, "th:text"), Some(0));
        assert_eq!(attrs.index_of_prefixed(TemplateMode::Html, Some("th"), "text"), Some(0));
        assert_eq!(attrs.value(TemplateMode::Html, "ID"), Some("y"));
        assert!(attrs.has_attribute(TemplateMode::Html, "id"));
        assert!(attrs.attribute(TemplateMode::Html, "missing").is_none());
        assert_eq!(attrs.iter().count(), 2);
        assert_eq!(attrs.to_string(), " data-th-text=\"x\" id=\"y\" ");
        assert_eq!(attrs.version(), before);
    }

    fn open_tag_attributes(configuration: &EngineConfiguration, markup: &str) -> Attributes {
        let model = crate::parser::parse_template(configuration, TemplateMode::Html, None, markup).unwrap();
        model
            .iter()
            .find_map(|event| match event {
                TemplateEvent::OpenElement(tag) => Some(tag.attributes().clone()),
                _ => None,
            })
            .unwrap()
    }

    fn summary(attrs: &Attributes) -> Vec<(String, Option<String>, AttributeValueQuotes)> {
        attrs
            .iter()
            .map(|a| (a.complete_name().to_string(), a.value().map(str::to_string), a.value_quotes()))
            .collect()
    }

    #[test]
    fn test_modified_attributes_survive_reparsing() {
        let configuration = EngineConfiguration::builder().build().unwrap();
        let defs = configuration.attribute_definitions();
        let mode = TemplateMode::Html;
        let mut attrs = open_tag_attributes(&configuration, "<p  class=\"a\"\n   id='b' title=c\t>x</p>");
        assert_invariant(&attrs);

        attrs.set_attribute(defs, mode, None, "lang", Some("en"), None).unwrap();
        assert_invariant(&attrs);
        assert!(attrs.remove_attribute(mode, "id"));
        assert_invariant(&attrs);
        attrs.set_attribute(defs, mode, None, "class", Some("z"), Some(AttributeValueQuotes::Single)).unwrap();
        assert_invariant(&attrs);
        attrs.set_attribute(defs, mode, None, "dir", Some("ltr"), Some(AttributeValueQuotes::None)).unwrap();
        assert_invariant(&attrs);
        assert!(attrs.remove_attribute(mode, "title"));
        assert_invariant(&attrs);
        attrs.set_attribute(defs, mode, None, "alt", Some("two words"), Some(AttributeValueQuotes::None)).unwrap();
        assert_invariant(&attrs);

        let markup = format!("<p{attrs}>x</p>");
        assert_eq!(markup, "<p  class='z'\n   lang=\"en\" dir=ltr alt=\"two words\"\t>x</p>");
        let reparsed = open_tag_attributes(&configuration, &markup);
        assert_eq!(summary(&reparsed), summary(&attrs));
        assert_eq!(reparsed.to_string(), attrs.to_string());
    }
}

