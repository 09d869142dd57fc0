//! Interned element and attribute names
//!
//! Every distinct textual name is parsed once into an [`ElementName`] or
//! [`AttributeName`] and cached forever in a per-mode repository, so that two
//! names obtained for the same spelling are the *same* allocation and compare
//! by pointer in hot paths.
//!
//! Splitting rules:
//!
//! - XML and textual modes split `prefix:name` at the first `:`.
//! - HTML elements split at the first `:` or `-` (`th:block`, `th-block`).
//! - HTML attributes split at the first `:` and also recognise the
//!   `data-prefix-name` form. `xml:` and `xmlns:` are never dialect prefixes.
//! - A leading separator means there is no prefix.
//!
//! HTML names are stored lowercased and looked up ignoring ASCII case.
//!
//! # Concurrency
//!
//! Repositories are shared process-wide. Standard HTML names live in a
//! read-only table searched without locking. Everything else goes through a
//! `RwLock`: read-locked search, and on a miss a separate write-locked search
//! that is repeated before inserting, since another thread may have stored the
//! same name in between.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::definitions::{STANDARD_HTML_ATTRIBUTE_NAMES, STANDARD_HTML_ELEMENTS};
use crate::error::{Error, Result};
use crate::template_mode::TemplateMode;

#[derive(Debug)]
struct NameData {
    template_mode: TemplateMode,
    prefix: Option<Box<str>>,
    name: Box<str>,
    complete_names: Box<[Box<str>]>,
}

impl NameData {
    fn display(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, complete) in self.complete_names.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(complete)?;
        }
        f.write_str("}")
    }
}

macro_rules! interned_name {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $ty(Arc<NameData>);

        impl $ty {
            /// Mode whose repository interned this name
            pub fn template_mode(&self) -> TemplateMode {
                self.0.template_mode
            }

            /// Dialect prefix, `th` for both `th:text` and `data-th-text`
            pub fn prefix(&self) -> Option<&str> {
                self.0.prefix.as_deref()
            }

            pub fn has_prefix(&self) -> bool {
                self.0.prefix.is_some()
            }

            /// Local part of the name, without prefix
            pub fn name(&self) -> &str {
                &self.0.name
            }

            /// Every spelling that designates this name, canonical one first
            pub fn complete_names(&self) -> impl Iterator<Item = &str> + '_ {
                self.0.complete_names.iter().map(|n| &**n)
            }

            /// `prefix:name`, or the bare name when there is no prefix
            pub fn canonical_name(&self) -> &str {
                &self.0.complete_names[0]
            }

            /// Whether `complete_name` is one of the spellings of this name
            pub fn matches_complete_name(&self, complete_name: &str) -> bool {
                let case_sensitive = self.0.template_mode.is_case_sensitive();
                self.complete_names()
                    .any(|n| compare_keys(n, Key::Complete(complete_name), case_sensitive).is_eq())
            }

            /// Identity comparison. Interning makes it equivalent to equality.
            pub fn is_same(&self, other: &$ty) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                std::ptr::hash(Arc::as_ptr(&self.0), state)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.display(f)
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}:", stringify!($ty), self.0.template_mode)?;
                self.0.display(f)?;
                f.write_str(")")
            }
        }
    };
}

interned_name! {
    /// Canonical, interned element name
    ElementName
}

interned_name! {
    /// Canonical, interned attribute name
    AttributeName
}

/// Probe used for binary searching without building a `String`
#[derive(Debug, Clone, Copy)]
enum Key<'a> {
    Complete(&'a str),
    Prefixed(&'a str, &'a str),
}

fn fold(b: u8, case_sensitive: bool) -> u8 {
    if case_sensitive {
        b
    } else {
        b.to_ascii_lowercase()
    }
}

fn compare_keys(stored: &str, key: Key<'_>, case_sensitive: bool) -> Ordering {
    let stored = stored.bytes().map(|b| fold(b, case_sensitive));
    match key {
        Key::Complete(text) => stored.cmp(text.bytes().map(|b| fold(b, case_sensitive))),
        Key::Prefixed(prefix, name) => stored.cmp(
            prefix
                .bytes()
                .chain(std::iter::once(b':'))
                .chain(name.bytes())
                .map(|b| fold(b, case_sensitive)),
        ),
    }
}

trait Interned: Clone {
    fn data(&self) -> &NameData;
}

impl Interned for ElementName {
    fn data(&self) -> &NameData {
        &self.0
    }
}

impl Interned for AttributeName {
    fn data(&self) -> &NameData {
        &self.0
    }
}

type Entries<N> = Vec<(Box<str>, N)>;

fn search<N>(entries: &Entries<N>, key: Key<'_>, case_sensitive: bool) -> std::result::Result<usize, usize> {
    entries.binary_search_by(|(stored, _)| compare_keys(stored, key, case_sensitive))
}

struct NameRepository<N> {
    template_mode: TemplateMode,
    standard: Entries<N>,
    entries: RwLock<Entries<N>>,
}

impl<N: Interned> NameRepository<N> {
    fn new(template_mode: TemplateMode, standard: Vec<N>) -> Self {
        let mut table = Vec::with_capacity(standard.len() * 2);
        for name in standard {
            insert_all_spellings(&mut table, &name, template_mode.is_case_sensitive());
        }
        Self {
            template_mode,
            standard: table,
            entries: RwLock::new(Vec::with_capacity(500)),
        }
    }

    fn get(&self, key: Key<'_>, build: impl FnOnce() -> Result<N>) -> Result<N> {
        let case_sensitive = self.template_mode.is_case_sensitive();

        if let Ok(idx) = search(&self.standard, key, case_sensitive) {
            return Ok(self.standard[idx].1.clone());
        }

        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Ok(idx) = search(&entries, key, case_sensitive) {
                return Ok(entries[idx].1.clone());
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread might have stored it while we were waiting for the lock
        if let Ok(idx) = search(&entries, key, case_sensitive) {
            return Ok(entries[idx].1.clone());
        }

        let name = build()?;
        insert_all_spellings(&mut entries, &name, case_sensitive);
        log::trace!(
            target: "thymeleaf.names",
            "interned {} name {}",
            self.template_mode,
            name.data().complete_names[0]
        );
        Ok(name)
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn insert_all_spellings<N: Interned>(entries: &mut Entries<N>, name: &N, case_sensitive: bool) {
    for complete in name.data().complete_names.iter() {
        if let Err(pos) = search(entries, Key::Complete(complete), case_sensitive) {
            entries.insert(pos, (complete.clone(), name.clone()));
        }
    }
}

fn new_data(
    template_mode: TemplateMode,
    prefix: Option<&str>,
    name: &str,
    complete_names: Vec<String>,
) -> Arc<NameData> {
    let lower = |s: &str| -> Box<str> {
        if template_mode.is_case_sensitive() {
            s.into()
        } else {
            s.to_ascii_lowercase().into_boxed_str()
        }
    };
    Arc::new(NameData {
        template_mode,
        prefix: prefix.map(lower),
        name: lower(name),
        complete_names: complete_names.iter().map(|n| lower(n)).collect(),
    })
}

fn is_blank(s: Option<&str>) -> bool {
    s.map_or(true, |s| s.trim().is_empty())
}

fn starts_with_ignore_case(text: &str, start: &str) -> bool {
    text.len() >= start.len() && text.as_bytes()[..start.len()].eq_ignore_ascii_case(start.as_bytes())
}

fn buffer_slice(buffer: &str, offset: usize, len: usize) -> Result<&str> {
    offset
        .checked_add(len)
        .and_then(|end| buffer.get(offset..end))
        .ok_or_else(|| {
            Error::invalid_owned(format!(
                "Name offset {offset} and length {len} do not designate a valid slice of the buffer"
            ))
        })
}

// ----------------------------------------------------------------------------
// Element names
// ----------------------------------------------------------------------------

fn build_element_name(template_mode: TemplateMode, prefix: Option<&str>, name: &str) -> ElementName {
    let complete_names = match prefix {
        None => vec![name.to_string()],
        Some(prefix) if template_mode == TemplateMode::Html => {
            vec![format!("{prefix}:{name}"), format!("{prefix}-{name}")]
        }
        Some(prefix) => vec![format!("{prefix}:{name}")],
    };
    ElementName(new_data(template_mode, prefix, name, complete_names))
}

/// Split a complete element name into prefix and local name
fn split_element_name(template_mode: TemplateMode, complete: &str) -> (Option<&str>, &str) {
    let html = template_mode == TemplateMode::Html;
    let Some(pos) = complete.find(|c| c == ':' || (html && c == '-')) else {
        return (None, complete);
    };
    if pos == 0 {
        return (None, complete);
    }
    if html
        && complete.as_bytes()[pos] == b':'
        && (starts_with_ignore_case(complete, "xml:") || starts_with_ignore_case(complete, "xmlns:"))
    {
        return (None, complete);
    }
    (Some(&complete[..pos]), &complete[pos + 1..])
}

static ELEMENT_NAMES: Lazy<Vec<NameRepository<ElementName>>> = Lazy::new(|| {
    TemplateMode::ALL
        .iter()
        .map(|&mode| {
            let standard = if mode == TemplateMode::Html {
                STANDARD_HTML_ELEMENTS
                    .iter()
                    .map(|(name, _)| build_element_name(mode, None, name))
                    .collect()
            } else {
                Vec::new()
            };
            NameRepository::new(mode, standard)
        })
        .collect()
});

/// Entry point for obtaining interned [`ElementName`]s
pub struct ElementNames;

impl ElementNames {
    /// Obtain the element name for a complete (possibly prefixed) name
    pub fn for_name(template_mode: TemplateMode, element_name: &str) -> Result<ElementName> {
        if template_mode == TemplateMode::Raw {
            return Err(Error::invalid_static("RAW template mode has no element names"));
        }
        // Textual modes allow the empty element name: `[# th:each="..."]`
        if !template_mode.is_text() && element_name.trim().is_empty() {
            return Err(Error::invalid_static("Element name cannot be empty"));
        }
        ELEMENT_NAMES[template_mode.index()].get(Key::Complete(element_name), || {
            let (prefix, name) = split_element_name(template_mode, element_name);
            Ok(build_element_name(template_mode, prefix, name))
        })
    }

    /// Obtain the element name for a slice of a parse buffer
    pub fn for_buffer(
        template_mode: TemplateMode,
        buffer: &str,
        offset: usize,
        len: usize,
    ) -> Result<ElementName> {
        Self::for_name(template_mode, buffer_slice(buffer, offset, len)?)
    }

    /// Obtain the element name for an explicit prefix and local name
    ///
    /// A blank prefix falls back to parsing `element_name` as a complete name.
    pub fn for_prefixed_name(
        template_mode: TemplateMode,
        prefix: Option<&str>,
        element_name: &str,
    ) -> Result<ElementName> {
        let prefix = prefix.filter(|_| !is_blank(prefix));
        let Some(prefix) = prefix else {
            return Self::for_name(template_mode, element_name);
        };
        if template_mode == TemplateMode::Raw {
            return Err(Error::invalid_static("RAW template mode has no element names"));
        }
        if element_name.trim().is_empty() {
            return Err(Error::invalid_static(
                "Element name cannot be empty when a prefix is specified",
            ));
        }
        ELEMENT_NAMES[template_mode.index()].get(Key::Prefixed(prefix, element_name), || {
            Ok(build_element_name(template_mode, Some(prefix), element_name))
        })
    }

    /// Number of dynamically interned spellings for a mode
    pub fn repository_len(template_mode: TemplateMode) -> usize {
        ELEMENT_NAMES[template_mode.index()].len()
    }
}

// ----------------------------------------------------------------------------
// Attribute names
// ----------------------------------------------------------------------------

fn build_attribute_name(template_mode: TemplateMode, prefix: Option<&str>, name: &str) -> AttributeName {
    let complete_names = match prefix {
        None => vec![name.to_string()],
        Some(prefix) if template_mode == TemplateMode::Html => {
            vec![format!("{prefix}:{name}"), format!("data-{prefix}-{name}")]
        }
        Some(prefix) => vec![format!("{prefix}:{name}")],
    };
    AttributeName(new_data(template_mode, prefix, name, complete_names))
}

fn split_attribute_name(template_mode: TemplateMode, complete: &str) -> (Option<&str>, &str) {
    if let Some(pos) = complete.find(':') {
        if pos == 0 {
            return (None, complete);
        }
        if template_mode == TemplateMode::Html
            && (starts_with_ignore_case(complete, "xml:") || starts_with_ignore_case(complete, "xmlns:"))
        {
            return (None, complete);
        }
        return (Some(&complete[..pos]), &complete[pos + 1..]);
    }
    if template_mode == TemplateMode::Html && starts_with_ignore_case(complete, "data-") {
        let rest = &complete[5..];
        if let Some(dash) = rest.find('-') {
            if dash > 0 && dash + 1 < rest.len() {
                return (Some(&rest[..dash]), &rest[dash + 1..]);
            }
        }
    }
    (None, complete)
}

static ATTRIBUTE_NAMES: Lazy<Vec<NameRepository<AttributeName>>> = Lazy::new(|| {
    TemplateMode::ALL
        .iter()
        .map(|&mode| {
            let standard = if mode == TemplateMode::Html {
                STANDARD_HTML_ATTRIBUTE_NAMES
                    .iter()
                    .map(|name| {
                        let (prefix, local) = split_attribute_name(mode, name);
                        build_attribute_name(mode, prefix, local)
                    })
                    .collect()
            } else {
                Vec::new()
            };
            NameRepository::new(mode, standard)
        })
        .collect()
});

/// Entry point for obtaining interned [`AttributeName`]s
pub struct AttributeNames;

impl AttributeNames {
    /// Interned name for a complete attribute name (`th:text`, `data-th-text`,
    /// `class`...)
    ///
    /// Fails for RAW mode and for blank names. Unknown names are created and
    /// interned on first use.
    pub fn for_name(template_mode: TemplateMode, attribute_name: &str) -> Result<AttributeName> {
        if template_mode == TemplateMode::Raw {
            return Err(Error::invalid_static("RAW template mode has no attribute names"));
        }
        if attribute_name.trim().is_empty() {
            return Err(Error::invalid_static("Attribute name cannot be empty"));
        }
        ATTRIBUTE_NAMES[template_mode.index()].get(Key::Complete(attribute_name), || {
            let (prefix, name) = split_attribute_name(template_mode, attribute_name);
            Ok(build_attribute_name(template_mode, prefix, name))
        })
    }

    /// Same as [`for_name`](Self::for_name) on `buffer[offset..offset + len]`
    pub fn for_buffer(
        template_mode: TemplateMode,
        buffer: &str,
        offset: usize,
        len: usize,
    ) -> Result<AttributeName> {
        Self::for_name(template_mode, buffer_slice(buffer, offset, len)?)
    }

    /// A blank prefix falls back to parsing `attribute_name` as a complete name
    pub fn for_prefixed_name(
        template_mode: TemplateMode,
        prefix: Option<&str>,
        attribute_name: &str,
    ) -> Result<AttributeName> {
        let prefix = prefix.filter(|_| !is_blank(prefix));
        let Some(prefix) = prefix else {
            return Self::for_name(template_mode, attribute_name);
        };
        if template_mode == TemplateMode::Raw {
            return Err(Error::invalid_static("RAW template mode has no attribute names"));
        }
        if attribute_name.trim().is_empty() {
            return Err(Error::invalid_static("Attribute name cannot be empty"));
        }
        ATTRIBUTE_NAMES[template_mode.index()].get(Key::Prefixed(prefix, attribute_name), || {
            Ok(build_attribute_name(template_mode, Some(prefix), attribute_name))
        })
    }

    /// Number of names interned so far for `template_mode`
    pub fn repository_len(template_mode: TemplateMode) -> usize {
        ATTRIBUTE_NAMES[template_mode.index()].len()
    }
}
