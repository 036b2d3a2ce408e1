use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PROFILE: &str = "eng";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("Recognition profile is empty")]
    Empty,
    #[error("Invalid language code in recognition profile: '{0}'")]
    InvalidLanguage(String),
}

/// Language set handed to the OCR engine, written as `eng` or `eng+spa`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecognitionProfile {
    languages: Vec<String>,
}

impl RecognitionProfile {
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Add a language to the set; already-present languages are ignored.
    pub fn with_language(mut self, language: &str) -> Result<Self, ProfileError> {
        let language = validate_language(language)?;
        if !self.languages.iter().any(|l| l == language) {
            self.languages.push(language.to_string());
        }
        Ok(self)
    }
}

impl Default for RecognitionProfile {
    fn default() -> Self {
        RecognitionProfile {
            languages: vec![DEFAULT_PROFILE.to_string()],
        }
    }
}

fn validate_language(code: &str) -> Result<&str, ProfileError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ProfileError::InvalidLanguage(code.to_string()));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ProfileError::InvalidLanguage(code.to_string()));
    }
    Ok(code)
}

impl FromStr for RecognitionProfile {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ProfileError::Empty);
        }
        let mut languages: Vec<String> = Vec::new();
        for part in s.split('+') {
            let code = validate_language(part)?;
            if !languages.iter().any(|l| l == code) {
                languages.push(code.to_string());
            }
        }
        Ok(RecognitionProfile { languages })
    }
}

impl TryFrom<String> for RecognitionProfile {
    type Error = ProfileError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecognitionProfile> for String {
    fn from(profile: RecognitionProfile) -> Self {
        profile.to_string()
    }
}

impl fmt::Display for RecognitionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.languages.join("+"))
    }
}
