use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{DatasetError, Result};

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Language the tweets of a dataset are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Language {
    English,
    French,
    Arabic,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::English => "English",
            Language::French => "French",
            Language::Arabic => "Arabic",
        };
        f.pad(s)
    }
}

impl FromStr for Language {
    type Err = DatasetError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "french" | "fr" => Ok(Language::French),
            "arabic" | "ar" => Ok(Language::Arabic),
            other => Err(DatasetError::format(format!("unknown language '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Fixed identity of one supported dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatasetDescriptor {
    pub name: &'static str,
    pub language: Language,
}

const fn entry(name: &'static str, language: Language) -> DatasetDescriptor {
    DatasetDescriptor { name, language }
}

/// Every dataset the hosting repository publishes, in listing order.
pub const REGISTRY: &[DatasetDescriptor] = &[
    entry("MAVEN", Language::English),
    entry("Event2012", Language::English),
    entry("Event2018", Language::French),
    entry("Arabic_Twitter", Language::Arabic),
    entry("CrisisLexT26", Language::English),
    entry("CrisisLexT6", Language::English),
    entry("CrisisMMD", Language::English),
    entry("CrisisNLP", Language::English),
    entry("HumAID", Language::English),
    entry("ICWSM2018", Language::English),
    entry("ISCRAM2013", Language::English),
    entry("BigCrisisData", Language::English),
    entry("KBP", Language::English),
    entry("Event2012_100", Language::English),
    entry("Event2018_100", Language::French),
    entry("Arabic_100", Language::Arabic),
];

/// Exact-match lookup; names are case sensitive.
pub fn descriptor(name: &str) -> Option<&'static DatasetDescriptor> {
    REGISTRY.iter().find(|d| d.name == name)
}

/// All registered names in registry order.
pub fn supported_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|d| d.name).collect()
}

/// Resolve the language of `name`, failing with a message that lists every
/// supported dataset.
pub fn dataset_language(name: &str) -> Result<Language> {
    descriptor(name)
        .map(|d| d.language)
        .ok_or_else(|| DatasetError::Lookup {
            name: name.to_string(),
            supported: supported_names(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_languages() {
        assert_eq!(dataset_language("MAVEN").unwrap(), Language::English);
        assert_eq!(dataset_language("Event2018").unwrap(), Language::French);
        assert_eq!(dataset_language("Arabic_Twitter").unwrap(), Language::Arabic);
        assert_eq!(dataset_language("Event2018_100").unwrap(), Language::French);
        assert_eq!(dataset_language("Arabic_100").unwrap(), Language::Arabic);
        assert_eq!(dataset_language("CrisisLexT26").unwrap(), Language::English);
    }

    #[test]
    fn test_every_entry_resolves() {
        for d in REGISTRY {
            assert_eq!(dataset_language(d.name).unwrap(), d.language);
        }
        assert_eq!(REGISTRY.len(), 16);
    }

    #[test]
    fn test_unknown_name_lists_registry() {
        let err = dataset_language("invalid_dataset").unwrap_err();
        assert!(matches!(err, DatasetError::Lookup { .. }));
        let msg = err.to_string();
        assert!(msg.contains("invalid_dataset"));
        for name in supported_names() {
            assert!(msg.contains(name), "message should list {name}: {msg}");
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(dataset_language("maven").is_err());
    }

    #[test]
    fn test_language_display_and_parse() {
        assert_eq!(Language::French.to_string(), "French");
        assert_eq!("arabic".parse::<Language>().unwrap(), Language::Arabic);
        assert!("klingon".parse::<Language>().is_err());
    }
}
