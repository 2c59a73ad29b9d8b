//! Caption languages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Language of the source transcript and of the untranslated caption track.
pub const SOURCE_LANGUAGE: &str = "en";

/// Caption language: ISO-639-1 code and English display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    pub name: String,
}

impl Language {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// Default translation targets.
pub const TRANSLATION_LANGUAGES: &[(&str, &str)] = &[
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("pt", "Portuguese"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh", "Chinese (Simplified)"),
    ("ar", "Arabic"),
];

pub fn default_targets() -> Vec<Language> {
    TRANSLATION_LANGUAGES
        .iter()
        .map(|&(code, name)| Language::new(code, name))
        .collect()
}

/// Parse a `code=Name` pair.
///
/// A bare code is looked up in [`TRANSLATION_LANGUAGES`] for its name.
pub fn parse_language(s: &str) -> Result<Language, String> {
    let (code, name) = match s.split_once('=') {
        Some((code, name)) => (code.trim(), name.trim().to_string()),
        None => {
            let code = s.trim();
            let name = TRANSLATION_LANGUAGES
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, n)| n.to_string())
                .ok_or_else(|| format!("unknown language code {code:?}, use code=Name"))?;
            (code, name)
        }
    };

    if code.is_empty() || name.is_empty() {
        return Err(format!("invalid language {s:?}, expected code=Name"));
    }
    Ok(Language::new(code, name))
}

/// Languages a job must produce: the source language, plus every target unless the job asked
/// for the source language only.
pub fn expected_codes(job_language: &str, targets: &[Language]) -> Vec<String> {
    let mut codes = vec![SOURCE_LANGUAGE.to_string()];
    if job_language != SOURCE_LANGUAGE {
        codes.extend(
            targets
                .iter()
                .filter(|l| l.code != SOURCE_LANGUAGE)
                .map(|l| l.code.clone()),
        );
    }
    codes
}
