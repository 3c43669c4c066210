//! Spoken-language table and candidate ranking.

use super::provider::LanguageProbability;
use crate::models::MAX_CANDIDATE_LANGUAGES;
use serde::{Deserialize, Serialize};

/// Languages recognised by Whisper-family engines: (code, label).
const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("zh", "Chinese"),
    ("de", "German"),
    ("es", "Spanish"),
    ("ru", "Russian"),
    ("ko", "Korean"),
    ("fr", "French"),
    ("ja", "Japanese"),
    ("pt", "Portuguese"),
    ("tr", "Turkish"),
    ("pl", "Polish"),
    ("ca", "Catalan"),
    ("nl", "Dutch"),
    ("ar", "Arabic"),
    ("sv", "Swedish"),
    ("it", "Italian"),
    ("id", "Indonesian"),
    ("hi", "Hindi"),
    ("fi", "Finnish"),
    ("vi", "Vietnamese"),
    ("he", "Hebrew"),
    ("uk", "Ukrainian"),
    ("el", "Greek"),
    ("ms", "Malay"),
    ("cs", "Czech"),
    ("ro", "Romanian"),
    ("da", "Danish"),
    ("hu", "Hungarian"),
    ("ta", "Tamil"),
    ("no", "Norwegian"),
    ("th", "Thai"),
    ("ur", "Urdu"),
    ("hr", "Croatian"),
    ("bg", "Bulgarian"),
    ("lt", "Lithuanian"),
    ("la", "Latin"),
    ("mi", "Maori"),
    ("ml", "Malayalam"),
    ("cy", "Welsh"),
    ("sk", "Slovak"),
    ("te", "Telugu"),
    ("fa", "Persian"),
    ("lv", "Latvian"),
    ("bn", "Bengali"),
    ("sr", "Serbian"),
    ("az", "Azerbaijani"),
    ("sl", "Slovenian"),
    ("kn", "Kannada"),
    ("et", "Estonian"),
    ("mk", "Macedonian"),
    ("br", "Breton"),
    ("eu", "Basque"),
    ("is", "Icelandic"),
    ("hy", "Armenian"),
    ("ne", "Nepali"),
    ("mn", "Mongolian"),
    ("bs", "Bosnian"),
    ("kk", "Kazakh"),
    ("sq", "Albanian"),
    ("sw", "Swahili"),
    ("gl", "Galician"),
    ("mr", "Marathi"),
    ("pa", "Punjabi"),
    ("si", "Sinhala"),
    ("km", "Khmer"),
    ("sn", "Shona"),
    ("yo", "Yoruba"),
    ("so", "Somali"),
    ("af", "Afrikaans"),
    ("oc", "Occitan"),
    ("ka", "Georgian"),
    ("be", "Belarusian"),
    ("tg", "Tajik"),
    ("sd", "Sindhi"),
    ("gu", "Gujarati"),
    ("am", "Amharic"),
    ("yi", "Yiddish"),
    ("lo", "Lao"),
    ("uz", "Uzbek"),
    ("fo", "Faroese"),
    ("ht", "Haitian Creole"),
    ("ps", "Pashto"),
    ("tk", "Turkmen"),
    ("nn", "Nynorsk"),
    ("mt", "Maltese"),
    ("sa", "Sanskrit"),
    ("lb", "Luxembourgish"),
    ("my", "Myanmar"),
    ("bo", "Tibetan"),
    ("tl", "Tagalog"),
    ("mg", "Malagasy"),
    ("as", "Assamese"),
    ("tt", "Tatar"),
    ("haw", "Hawaiian"),
    ("ln", "Lingala"),
    ("ha", "Hausa"),
    ("ba", "Bashkir"),
    ("jw", "Javanese"),
    ("su", "Sundanese"),
    ("yue", "Cantonese"),
];

/// A language code with its human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageCode {
    /// ISO-like code, e.g. `en`.
    pub code: String,
    /// Label, e.g. `English`.
    pub label: String,
}

impl LanguageCode {
    /// Build from a code, labelling it from the table (or with the code
    /// itself when unknown).
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        Self {
            code: code.to_string(),
            label: language_label(code).unwrap_or(code).to_string(),
        }
    }
}

/// Label for `code`, if it is in the table.
#[must_use]
pub fn language_label(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, label)| *label)
}

/// Resolve a code or a label (case-insensitive) to a known language.
#[must_use]
pub fn lookup_language(code_or_label: &str) -> Option<LanguageCode> {
    let needle = code_or_label.trim();
    LANGUAGES
        .iter()
        .find(|(code, label)| {
            code.eq_ignore_ascii_case(needle) || label.eq_ignore_ascii_case(needle)
        })
        .map(|(code, label)| LanguageCode {
            code: (*code).to_string(),
            label: (*label).to_string(),
        })
}

/// Every known language, in table order.
pub fn all_languages() -> impl Iterator<Item = LanguageCode> {
    LANGUAGES.iter().map(|(code, label)| LanguageCode {
        code: (*code).to_string(),
        label: (*label).to_string(),
    })
}

/// Rank engine-reported probabilities into at most `limit` candidates.
///
/// Sorting is stable: equal probabilities keep the engine's order. Entries
/// without a finite probability are dropped. `limit` is capped at
/// [`MAX_CANDIDATE_LANGUAGES`].
#[must_use]
pub fn rank_languages(mut probabilities: Vec<LanguageProbability>, limit: usize) -> Vec<LanguageCode> {
    probabilities.retain(|p| p.probability.is_finite());
    probabilities.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    probabilities
        .into_iter()
        .take(limit.min(MAX_CANDIDATE_LANGUAGES))
        .map(|p| LanguageCode::from_code(&p.code))
        .collect()
}

/// Pad `ranked` with table languages it does not already hold, in table
/// order, until it has `limit` entries (capped at
/// [`MAX_CANDIDATE_LANGUAGES`]).
#[must_use]
pub fn fill_candidates(mut ranked: Vec<LanguageCode>, limit: usize) -> Vec<LanguageCode> {
    let limit = limit.min(MAX_CANDIDATE_LANGUAGES);
    for lang in all_languages() {
        if ranked.len() >= limit {
            break;
        }
        if !ranked.iter().any(|r| r.code == lang.code) {
            ranked.push(lang);
        }
    }
    ranked
}
