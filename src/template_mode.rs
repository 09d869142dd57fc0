//! Template modes

use std::fmt;

/// The kind of template being processed
///
/// Determines name-splitting rules, case sensitivity and which definitions
/// and processors apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateMode {
    Html,
    Xml,
    Text,
    Javascript,
    Css,
    Raw,
}

impl TemplateMode {
    pub const ALL: [TemplateMode; 6] = [
        TemplateMode::Html,
        TemplateMode::Xml,
        TemplateMode::Text,
        TemplateMode::Javascript,
        TemplateMode::Css,
        TemplateMode::Raw,
    ];

    pub fn is_markup(self) -> bool {
        matches!(self, TemplateMode::Html | TemplateMode::Xml)
    }

    /// Textual modes share the `[#element]...[/element]` syntax
    pub fn is_text(self) -> bool {
        matches!(
            self,
            TemplateMode::Text | TemplateMode::Javascript | TemplateMode::Css
        )
    }

    /// Only HTML names are matched without regard to case
    pub fn is_case_sensitive(self) -> bool {
        self != TemplateMode::Html
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TemplateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemplateMode::Html => "HTML",
            TemplateMode::Xml => "XML",
            TemplateMode::Text => "TEXT",
            TemplateMode::Javascript => "JAVASCRIPT",
            TemplateMode::Css => "CSS",
            TemplateMode::Raw => "RAW",
        };
        f.write_str(name)
    }
}
