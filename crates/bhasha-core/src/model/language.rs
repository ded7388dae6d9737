use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A supported Indian language.
///
/// Each language owns one playlist and one pair of report columns. The
/// language-identification model labels text with script tags (for example
/// `hin_Deva` for Hindi in Devanagari and `hin_Latn` for romanized Hindi);
/// [`Language::from_tag`] folds those tags back into languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Hindi,
    Tamil,
    Telugu,
    Malayalam,
    Kannada,
}

impl Language {
    /// All supported languages, in report column order.
    pub const ALL: [Self; 5] = [
        Self::Hindi,
        Self::Tamil,
        Self::Telugu,
        Self::Malayalam,
        Self::Kannada,
    ];

    /// Human-readable name, used in playlist names and reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hindi => "Hindi",
            Self::Tamil => "Tamil",
            Self::Telugu => "Telugu",
            Self::Malayalam => "Malayalam",
            Self::Kannada => "Kannada",
        }
    }

    /// Lowercase slug, used in report column names.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Hindi => "hindi",
            Self::Tamil => "tamil",
            Self::Telugu => "telugu",
            Self::Malayalam => "malayalam",
            Self::Kannada => "kannada",
        }
    }

    /// Script tags (native script first, then romanized) that count as
    /// evidence for this language.
    #[must_use]
    pub const fn script_tags(self) -> [&'static str; 2] {
        match self {
            Self::Hindi => ["hin_Deva", "hin_Latn"],
            Self::Tamil => ["tam_Tamil", "tam_Latn"],
            Self::Telugu => ["tel_Telu", "tel_Latn"],
            Self::Malayalam => ["mal_Mlym", "mal_Latn"],
            Self::Kannada => ["kan_Knda", "kan_Latn"],
        }
    }

    /// Map a model script tag to its language, if supported.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.script_tags().contains(&tag))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.slug() == lower)
            .ok_or_else(|| Error::InvalidData(format!("unsupported language: {s}")))
    }
}
