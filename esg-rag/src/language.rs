//! Response-language direction for generated answers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

const FRENCH_INSTRUCTION: &str = "Réponds toujours en français, quelle que soit la langue de la question.";
const ARABIC_INSTRUCTION: &str = "أجب دائمًا باللغة العربية، بغض النظر عن لغة السؤال.";

/// The language the answer should be written in.
///
/// `None` injects no instruction, so the model answers in whatever language it
/// picks (usually the question's). The other variants prepend a fixed
/// instruction to the question before generation. Retrieval always uses the
/// raw question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLanguage {
    #[default]
    None,
    French,
    Arabic,
}

impl ResponseLanguage {
    /// The instruction injected for this language, if any.
    pub fn instruction(&self) -> Option<&'static str> {
        match self {
            ResponseLanguage::None => None,
            ResponseLanguage::French => Some(FRENCH_INSTRUCTION),
            ResponseLanguage::Arabic => Some(ARABIC_INSTRUCTION),
        }
    }

    /// Prefix `question` with this language's instruction and a blank line.
    pub fn apply(&self, question: &str) -> String {
        match self.instruction() {
            Some(instruction) => format!("{instruction}\n\n{question}"),
            None => question.to_string(),
        }
    }

    /// Parse an optional language tag, treating a missing tag as [`ResponseLanguage::None`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for unknown tags.
    pub fn parse_optional(tag: Option<&str>) -> Result<Self, RagError> {
        tag.map_or(Ok(ResponseLanguage::None), str::parse)
    }
}

impl FromStr for ResponseLanguage {
    type Err = RagError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_lowercase().as_str() {
            "" | "none" | "default" | "english" | "en" => Ok(ResponseLanguage::None),
            "french" | "français" | "francais" | "fr" => Ok(ResponseLanguage::French),
            "arabic" | "العربية" | "ar" => Ok(ResponseLanguage::Arabic),
            other => Err(RagError::InvalidArgument(format!(
                "unsupported language '{other}', expected one of: none, French, Arabic"
            ))),
        }
    }
}

impl fmt::Display for ResponseLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseLanguage::None => "none",
            ResponseLanguage::French => "French",
            ResponseLanguage::Arabic => "Arabic",
        };
        f.write_str(name)
    }
}
