//! Languages offered for voice input and output.
//!
//! The model mirrors whatever language the user writes in, so this table only
//! drives speech recognition and synthesis.

/// A selectable interface language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// BCP 47 tag passed to the speech backends.
    pub code: &'static str,
    /// Name shown in the language picker, in the language itself.
    pub label: &'static str,
}

/// Tag used until the user picks something else.
pub const DEFAULT_LANGUAGE: &str = "en-US";

pub const LANGUAGES: &[Language] = &[
    Language {
        code: "en-US",
        label: "English",
    },
    Language {
        code: "hi-IN",
        label: "हिंदी",
    },
    Language {
        code: "ta-IN",
        label: "தமிழ்",
    },
    Language {
        code: "te-IN",
        label: "తెలుగు",
    },
    Language {
        code: "bn-IN",
        label: "বাংলা",
    },
    Language {
        code: "es-ES",
        label: "Español",
    },
    Language {
        code: "fr-FR",
        label: "Français",
    },
    Language {
        code: "ar-SA",
        label: "العربية",
    },
];

impl Language {
    /// Looks up a language by its tag.
    pub fn find(code: &str) -> Option<&'static Language> {
        LANGUAGES.iter().find(|l| l.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_language_is_listed() {
        assert_eq!(Language::find(DEFAULT_LANGUAGE).unwrap().label, "English");
    }

    #[test]
    fn unknown_tag_is_not_found() {
        assert!(Language::find("de-DE").is_none());
    }
}
