//! Grade and Feedback Extraction
//!
//! Coaching responses are free text. The upstream model is instructed to include
//! a `**Rating: X/10**` line, but it does not always comply, so extraction walks
//! a ladder of progressively weaker signals: explicit 1-10 ratings, then
//! percentage-style scores, then a keyword sentiment estimate.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Grade recorded when extraction itself fails.
///
/// This sits outside the 1-10 scale used everywhere else; it is carried over
/// from an earlier 1-100 grading scheme and is logged whenever it is applied.
pub const EXTRACTION_FALLBACK_GRADE: u8 = 70;

/// Grade used when no rating is found and the sentiment is not positive.
pub const NEUTRAL_GRADE: u8 = 5;

const POSITIVE_WORDS: [&str; 8] = [
    "good",
    "great",
    "excellent",
    "well",
    "strong",
    "effective",
    "helpful",
    "approachable",
];
const NEGATIVE_WORDS: [&str; 6] = [
    "poor",
    "weak",
    "ineffective",
    "unhelpful",
    "unapproachable",
    "bad",
];

// Most specific first. Only the first match of each pattern is considered.
const RATING_PATTERNS: [&str; 9] = [
    r"\*\*rating[:\s]*(\d{1,2})/10\*\*",
    r"rating[:\s]*(\d{1,2})/10",
    r"rating[:\s]*(\d{1,2})",
    r"rate[:\s]*(\d{1,2})",
    r"score[:\s]*(\d{1,2})",
    r"grade[:\s]*(\d{1,2})",
    r"(\d{1,2})\s*out\s*of\s*10",
    r"(\d{1,2})/10",
    r"(\d{1,2})\s*of\s*10",
];
const PERCENTAGE_PATTERNS: [&str; 3] = [
    r"(\d{1,3})%",
    r"(\d{1,3})\s*out\s*of\s*100",
    r"(\d{1,3})/100",
];

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("grade patterns are unavailable: {0}")]
    Patterns(regex::Error),
}

struct GradePatterns {
    ratings: Vec<Regex>,
    percentages: Vec<Regex>,
}

impl GradePatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            ratings: RATING_PATTERNS
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
            percentages: PERCENTAGE_PATTERNS
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
        })
    }
}

static GRADE_PATTERNS: LazyLock<Result<GradePatterns, regex::Error>> =
    LazyLock::new(GradePatterns::compile);

/// The outcome of analysing one coaching response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub grade: u8,
    pub feedback: String,
    pub full_response: String,
}

/// Extracts a 1-10 grade from `text`. Never fails: extraction errors degrade to
/// [`EXTRACTION_FALLBACK_GRADE`].
pub fn extract_feedback(text: &str) -> Feedback {
    match try_extract_feedback(text) {
        Ok(feedback) => feedback,
        Err(e) => {
            warn!(
                error = %e,
                grade = EXTRACTION_FALLBACK_GRADE,
                "Feedback extraction failed; recording out-of-scale fallback grade"
            );
            Feedback {
                grade: EXTRACTION_FALLBACK_GRADE,
                feedback: text.to_string(),
                full_response: text.to_string(),
            }
        }
    }
}

/// Fallible core of [`extract_feedback`].
pub fn try_extract_feedback(text: &str) -> Result<Feedback, ExtractionError> {
    let patterns = GRADE_PATTERNS
        .as_ref()
        .map_err(|e| ExtractionError::Patterns(e.clone()))?;
    let lowered = text.to_lowercase();

    let grade = find_rating(patterns, &lowered)
        .or_else(|| find_percentage(patterns, &lowered))
        .unwrap_or_else(|| estimate_from_sentiment(&lowered));
    info!(grade, chars = text.len(), "Extracted training feedback");

    Ok(Feedback {
        grade,
        feedback: text.to_string(),
        full_response: text.to_string(),
    })
}

fn find_rating(patterns: &GradePatterns, lowered: &str) -> Option<u8> {
    patterns.ratings.iter().find_map(|re| {
        let value: u8 = re.captures(lowered)?.get(1)?.as_str().parse().ok()?;
        (1..=10).contains(&value).then_some(value)
    })
}

fn find_percentage(patterns: &GradePatterns, lowered: &str) -> Option<u8> {
    patterns.percentages.iter().find_map(|re| {
        let percentage: u16 = re.captures(lowered)?.get(1)?.as_str().parse().ok()?;
        if percentage > 100 {
            return None;
        }
        let grade = percentage_to_grade(percentage);
        debug!(percentage, grade, "Converted percentage score to 1-10 rating");
        Some(grade)
    })
}

/// Maps 0-100 onto 1-10, rounding halves away from zero (85 -> 9).
pub fn percentage_to_grade(percentage: u16) -> u8 {
    (f64::from(percentage) / 10.0).round().clamp(1.0, 10.0) as u8
}

fn estimate_from_sentiment(lowered: &str) -> u8 {
    let positive = count_present(&POSITIVE_WORDS, lowered);
    let negative = count_present(&NEGATIVE_WORDS, lowered);
    if positive > negative {
        (6 + positive).clamp(6, 9) as u8
    } else {
        NEUTRAL_GRADE
    }
}

// Counts listed words occurring anywhere in the text, each at most once.
fn count_present(words: &[&str], lowered: &str) -> usize {
    words.iter().filter(|w| lowered.contains(*w)).count()
}
