//! Category catalogue and per-category submission payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::state::rejection::Rejection;

const MAX_ANSWER_CHARS: usize = 200;
const MAX_RANKING_ITEMS: usize = 10;

/// Categories a room can play. Resolved once at the boundary from free text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CategoryId {
    /// Teams guess a number; closest wins.
    Estimation,
    /// Teams type a free-text answer.
    Quiz,
    /// Teams put a list of items in order.
    Ranking,
    /// First team to buzz gets to answer.
    BuzzerRace,
}

impl CategoryId {
    /// Full catalogue, in presentation order.
    pub const ALL: [CategoryId; 4] = [
        CategoryId::Estimation,
        CategoryId::Quiz,
        CategoryId::Ranking,
        CategoryId::BuzzerRace,
    ];

    /// Canonical wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Estimation => "estimation",
            Self::Quiz => "quiz",
            Self::Ranking => "ranking",
            Self::BuzzerRace => "buzzer_race",
        }
    }

    /// Whether rounds are decided through the buzzer instead of submissions.
    pub fn is_race(self) -> bool {
        matches!(self, Self::BuzzerRace)
    }

    /// Resolve a client supplied name, tolerating aliases, case and broken encodings.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = repair_mojibake(raw.trim())
            .to_lowercase()
            .replace(['-', ' '], "_");

        let category = match normalized.as_str() {
            "estimation" | "estimate" | "schätzung" | "schaetzung" | "schätzen" | "guess" => {
                Self::Estimation
            }
            "quiz" | "trivia" | "wissen" => Self::Quiz,
            "ranking" | "order" | "reihenfolge" | "sort" => Self::Ranking,
            "buzzer_race" | "buzzer" | "race" | "buzzerrunde" | "buzzer_runde" => Self::BuzzerRace,
            _ => return None,
        };
        Some(category)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Undo UTF-8 text that was decoded as Latin-1 once (`Ã¤` → `ä`).
fn repair_mojibake(raw: &str) -> String {
    const PAIRS: [(&str, &str); 7] = [
        ("Ã¤", "ä"),
        ("Ã¶", "ö"),
        ("Ã¼", "ü"),
        ("Ã„", "Ä"),
        ("Ã–", "Ö"),
        ("Ãœ", "Ü"),
        ("ÃŸ", "ß"),
    ];

    PAIRS
        .iter()
        .fold(raw.to_owned(), |text, (broken, fixed)| {
            text.replace(broken, fixed)
        })
}

/// Normalised answer of one team for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionPayload {
    /// Numeric guess.
    Estimation {
        /// Guessed value, rounded to two decimals.
        value: f64,
    },
    /// Free-text answer.
    Quiz {
        /// Trimmed answer text.
        answer: String,
    },
    /// Ordered list of items.
    Ranking {
        /// Items from first to last.
        order: Vec<String>,
    },
}

impl SubmissionPayload {
    /// Validate and normalise a raw client payload for `category`.
    ///
    /// Accepts either the documented object (`{"value": 12}`) or the bare
    /// value (`12`, `"12,5"`).
    pub fn normalize(category: CategoryId, raw: &Value) -> Result<Self, Rejection> {
        match category {
            CategoryId::Estimation => {
                let value = parse_number(field_or_self(raw, "value"))
                    .ok_or_else(|| Rejection::invalid_payload("estimation needs a number"))?;
                if value < 0.0 {
                    return Err(Rejection::invalid_payload("estimation must not be negative"));
                }
                Ok(Self::Estimation {
                    value: (value * 100.0).round() / 100.0,
                })
            }
            CategoryId::Quiz => {
                let answer = field_or_self(raw, "answer")
                    .as_str()
                    .map(str::trim)
                    .unwrap_or_default();
                if answer.is_empty() {
                    return Err(Rejection::invalid_payload("quiz answer is empty"));
                }
                Ok(Self::Quiz {
                    answer: answer.chars().take(MAX_ANSWER_CHARS).collect(),
                })
            }
            CategoryId::Ranking => {
                let mut order: Vec<String> = Vec::new();
                let items = field_or_self(raw, "order")
                    .as_array()
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for item in items.iter().filter_map(Value::as_str).map(str::trim) {
                    if item.is_empty() || order.iter().any(|existing| existing == item) {
                        continue;
                    }
                    order.push(item.to_owned());
                    if order.len() == MAX_RANKING_ITEMS {
                        break;
                    }
                }
                if order.is_empty() {
                    return Err(Rejection::invalid_payload("ranking is empty"));
                }
                Ok(Self::Ranking { order })
            }
            CategoryId::BuzzerRace => Err(Rejection::invalid_payload(
                "the race category is played with the buzzer",
            )),
        }
    }

    /// Numeric value used to sort estimation recaps.
    pub fn estimate(&self) -> Option<f64> {
        match self {
            Self::Estimation { value } => Some(*value),
            _ => None,
        }
    }
}

fn field_or_self<'a>(raw: &'a Value, field: &str) -> &'a Value {
    raw.get(field).unwrap_or(raw)
}

fn parse_number(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().replace(',', ".").parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_accepts_aliases_and_mojibake() {
        assert_eq!(CategoryId::parse("estimation"), Some(CategoryId::Estimation));
        assert_eq!(CategoryId::parse(" Schätzung "), Some(CategoryId::Estimation));
        assert_eq!(CategoryId::parse("schÃ¤tzung"), Some(CategoryId::Estimation));
        assert_eq!(CategoryId::parse("Buzzer-Race"), Some(CategoryId::BuzzerRace));
        assert_eq!(CategoryId::parse("QUIZ"), Some(CategoryId::Quiz));
        assert_eq!(CategoryId::parse("karaoke"), None);
    }

    #[test]
    fn estimation_accepts_object_or_bare_values() {
        assert_eq!(
            SubmissionPayload::normalize(CategoryId::Estimation, &json!({"value": 12.345})),
            Ok(SubmissionPayload::Estimation { value: 12.35 })
        );
        assert_eq!(
            SubmissionPayload::normalize(CategoryId::Estimation, &json!("7,5")),
            Ok(SubmissionPayload::Estimation { value: 7.5 })
        );
        assert_eq!(
            SubmissionPayload::normalize(CategoryId::Estimation, &json!({"value": -1}))
                .unwrap_err()
                .code(),
            "invalid_payload"
        );
        assert!(SubmissionPayload::normalize(CategoryId::Estimation, &json!("lots")).is_err());
    }

    #[test]
    fn quiz_answer_is_trimmed_and_bounded() {
        let long = "x".repeat(500);
        let Ok(SubmissionPayload::Quiz { answer }) =
            SubmissionPayload::normalize(CategoryId::Quiz, &json!({ "answer": long }))
        else {
            panic!("expected quiz payload");
        };
        assert_eq!(answer.chars().count(), MAX_ANSWER_CHARS);

        assert_eq!(
            SubmissionPayload::normalize(CategoryId::Quiz, &json!("  Paris ")),
            Ok(SubmissionPayload::Quiz {
                answer: "Paris".into()
            })
        );
        assert!(SubmissionPayload::normalize(CategoryId::Quiz, &json!({"answer": "  "})).is_err());
    }

    #[test]
    fn ranking_drops_blanks_and_duplicates() {
        let payload = SubmissionPayload::normalize(
            CategoryId::Ranking,
            &json!({"order": ["b", " a ", "", "b", 3, "c"]}),
        );
        assert_eq!(
            payload,
            Ok(SubmissionPayload::Ranking {
                order: vec!["b".into(), "a".into(), "c".into()]
            })
        );
        assert!(SubmissionPayload::normalize(CategoryId::Ranking, &json!({"order": []})).is_err());
    }

    #[test]
    fn race_category_takes_no_submissions() {
        assert!(SubmissionPayload::normalize(CategoryId::BuzzerRace, &json!({})).is_err());
    }
}
