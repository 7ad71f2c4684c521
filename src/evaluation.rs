//! Post-session evaluation form and the rating record built from it.
//!
//! Section 1 is a four-item session rating scale (0-100) with follow-up
//! questions when a rating is low or high, section 2 asks about future
//! engagement (0-10), and section 3 rates perceived empathy (0-100).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Ratings below this ask what went wrong.
pub const NEGATIVE_FOLLOWUP_BELOW: u8 = 40;
/// Ratings above this ask what went well.
pub const POSITIVE_FOLLOWUP_ABOVE: u8 = 60;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AllianceItem {
    pub low_anchor: &'static str,
    pub high_anchor: &'static str,
    pub negative_followup: &'static str,
    pub positive_followup: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScaleItem {
    pub question: &'static str,
    pub low_anchor: &'static str,
    pub high_anchor: &'static str,
    pub max: u8,
}

pub const ALLIANCE_ITEMS: [AllianceItem; 4] = [
    AllianceItem {
        low_anchor: "I did not feel heard, understood, and respected.",
        high_anchor: "I felt heard, understood, and respected.",
        negative_followup: "What made you feel unheard or disrespected during the session?",
        positive_followup: "What did the chatbot do that made you feel especially respected and understood?",
    },
    AllianceItem {
        low_anchor: "We did not work on or talk about what I wanted to work on and talk about.",
        high_anchor: "We worked on and talked about what I wanted to work on and talk about.",
        negative_followup: "What important topics or goals did you feel were missed?",
        positive_followup: "What made this session particularly focused and relevant to your needs?",
    },
    AllianceItem {
        low_anchor: "The chatbot's approach is not a good fit for me.",
        high_anchor: "The chatbot's approach is a good fit for me.",
        negative_followup: "What about the chatbot's approach didn't work well for you?",
        positive_followup: "What aspects of the chatbot's approach were especially helpful?",
    },
    AllianceItem {
        low_anchor: "There was something missing in the session today.",
        high_anchor: "Overall, today's session was right for me.",
        negative_followup: "What were the main things that made this session unsatisfactory?",
        positive_followup: "What made this session particularly valuable for you?",
    },
];

pub const ENGAGEMENT_ITEMS: [ScaleItem; 2] = [
    ScaleItem {
        question: "How much would you like to continue working with the chatbot in the future?",
        low_anchor: "Not at all",
        high_anchor: "Very much",
        max: 10,
    },
    ScaleItem {
        question: "How likely are you to recommend this chatbot to others?",
        low_anchor: "Not likely at all",
        high_anchor: "Extremely likely",
        max: 10,
    },
];

pub const EMPATHY_ITEMS: [ScaleItem; 3] = [
    ScaleItem {
        question: "To what extent did the chatbot express warmth and care towards you?",
        low_anchor: "Not at all",
        high_anchor: "A great deal",
        max: 100,
    },
    ScaleItem {
        question: "How accurately did the chatbot reflect your feelings and experiences back to you?",
        low_anchor: "Not at all",
        high_anchor: "Extremely accurate",
        max: 100,
    },
    ScaleItem {
        question: "How well did the chatbot help you explore feelings you hadn't initially expressed?",
        low_anchor: "Not at all",
        high_anchor: "Very well",
        max: 100,
    },
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RatingError {
    #[error("{field} must be between 0 and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i32,
        max: u8,
    },
}

fn default_alliance() -> i32 {
    50
}

fn default_engagement() -> i32 {
    5
}

/// Raw form submission. Slider defaults match the initial slider positions.
/// Scores are wider than their range so out-of-range values reach `check`.
#[derive(Debug, Clone, Deserialize)]
pub struct RatingSubmission {
    #[serde(default = "default_alliance")]
    pub ta_1: i32,
    #[serde(default = "default_alliance")]
    pub ta_2: i32,
    #[serde(default = "default_alliance")]
    pub ta_3: i32,
    #[serde(default = "default_alliance")]
    pub ta_4: i32,
    #[serde(default)]
    pub ta_1_pos: String,
    #[serde(default)]
    pub ta_2_pos: String,
    #[serde(default)]
    pub ta_3_pos: String,
    #[serde(default)]
    pub ta_4_pos: String,
    #[serde(default)]
    pub ta_1_neg: String,
    #[serde(default)]
    pub ta_2_neg: String,
    #[serde(default)]
    pub ta_3_neg: String,
    #[serde(default)]
    pub ta_4_neg: String,
    #[serde(default = "default_engagement")]
    pub ue_1: i32,
    #[serde(default = "default_engagement")]
    pub ue_2: i32,
    #[serde(default = "default_alliance")]
    pub emp_1: i32,
    #[serde(default = "default_alliance")]
    pub emp_2: i32,
    #[serde(default = "default_alliance")]
    pub emp_3: i32,
}

impl Default for RatingSubmission {
    fn default() -> Self {
        Self {
            ta_1: 50,
            ta_2: 50,
            ta_3: 50,
            ta_4: 50,
            ta_1_pos: String::new(),
            ta_2_pos: String::new(),
            ta_3_pos: String::new(),
            ta_4_pos: String::new(),
            ta_1_neg: String::new(),
            ta_2_neg: String::new(),
            ta_3_neg: String::new(),
            ta_4_neg: String::new(),
            ue_1: 5,
            ue_2: 5,
            emp_1: 50,
            emp_2: 50,
            emp_3: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RatingValue {
    Score(u8),
    Text(String),
}

impl fmt::Display for RatingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatingValue::Score(score) => write!(f, "{}", score),
            RatingValue::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Serialize)]
struct RatingRow<'a> {
    aspect: &'a str,
    rating: String,
}

/// Ordered aspect/value pairs, built once per submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingRecord {
    entries: Vec<(&'static str, RatingValue)>,
}

/// Keep a follow-up answer only when its question was asked.
fn followup(rating: u8, positive: &str, negative: &str) -> (String, String) {
    let positive = if rating > POSITIVE_FOLLOWUP_ABOVE {
        positive.trim().to_string()
    } else {
        String::new()
    };
    let negative = if rating < NEGATIVE_FOLLOWUP_BELOW {
        negative.trim().to_string()
    } else {
        String::new()
    };
    (positive, negative)
}

fn check(field: &'static str, value: i32, max: u8) -> Result<u8, RatingError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= max)
        .ok_or(RatingError::OutOfRange { field, value, max })
}

impl RatingRecord {
    pub fn from_submission(submission: &RatingSubmission) -> Result<Self, RatingError> {
        let ta = [
            check("TA_rating_1", submission.ta_1, 100)?,
            check("TA_rating_2", submission.ta_2, 100)?,
            check("TA_rating_3", submission.ta_3, 100)?,
            check("TA_rating_4", submission.ta_4, 100)?,
        ];
        let ue = [
            check("UE_rating_1", submission.ue_1, 10)?,
            check("UE_rating_2", submission.ue_2, 10)?,
        ];
        let empathy = [
            check("Empathy_rating_1", submission.emp_1, 100)?,
            check("Empathy_rating_2", submission.emp_2, 100)?,
            check("Empathy_rating_3", submission.emp_3, 100)?,
        ];

        let (pos_1, neg_1) = followup(ta[0], &submission.ta_1_pos, &submission.ta_1_neg);
        let (pos_2, neg_2) = followup(ta[1], &submission.ta_2_pos, &submission.ta_2_neg);
        let (pos_3, neg_3) = followup(ta[2], &submission.ta_3_pos, &submission.ta_3_neg);
        let (pos_4, neg_4) = followup(ta[3], &submission.ta_4_pos, &submission.ta_4_neg);

        use RatingValue::{Score, Text};
        let entries = vec![
            ("TA_rating_1", Score(ta[0])),
            ("TA_rating_2", Score(ta[1])),
            ("TA_rating_3", Score(ta[2])),
            ("TA_rating_4", Score(ta[3])),
            ("TA_rationale_1_pos", Text(pos_1)),
            ("TA_rationale_2_pos", Text(pos_2)),
            ("TA_rationale_3_pos", Text(pos_3)),
            ("TA_rationale_4_pos", Text(pos_4)),
            ("TA_rationale_1_neg", Text(neg_1)),
            ("TA_rationale_2_neg", Text(neg_2)),
            ("TA_rationale_3_neg", Text(neg_3)),
            ("TA_rationale_4_neg", Text(neg_4)),
            ("UE_rating_1", Score(ue[0])),
            ("UE_rating_2", Score(ue[1])),
            ("Empathy_rating_1", Score(empathy[0])),
            ("Empathy_rating_2", Score(empathy[1])),
            ("Empathy_rating_3", Score(empathy[2])),
        ];
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(&'static str, RatingValue)] {
        &self.entries
    }

    /// CSV with an `aspect,rating` header, one row per aspect.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for (aspect, value) in &self.entries {
            writer
                .serialize(RatingRow {
                    aspect,
                    rating: value.to_string(),
                })
                .context("Failed to serialize rating row")?;
        }
        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush ratings CSV: {}", e.error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(record: &'a RatingRecord, aspect: &str) -> Option<&'a RatingValue> {
        record
            .entries()
            .iter()
            .find(|(name, _)| *name == aspect)
            .map(|(_, value)| value)
    }

    #[test]
    fn test_default_submission_has_no_rationales() {
        let record = RatingRecord::from_submission(&RatingSubmission::default()).unwrap();
        assert_eq!(record.entries().len(), 17);
        assert_eq!(value(&record, "TA_rating_1"), Some(&RatingValue::Score(50)));
        assert_eq!(value(&record, "UE_rating_2"), Some(&RatingValue::Score(5)));
        assert_eq!(
            value(&record, "TA_rationale_1_pos"),
            Some(&RatingValue::Text(String::new()))
        );
    }

    #[test]
    fn test_followups_kept_only_past_thresholds() {
        let submission = RatingSubmission {
            ta_1: 39,
            ta_1_neg: " It ignored my question ".to_string(),
            ta_1_pos: "should be dropped".to_string(),
            ta_2: 61,
            ta_2_pos: "Stayed on topic".to_string(),
            ta_2_neg: "should be dropped".to_string(),
            ta_3: 40,
            ta_3_neg: "boundary, dropped".to_string(),
            ta_4: 60,
            ta_4_pos: "boundary, dropped".to_string(),
            ..RatingSubmission::default()
        };
        let record = RatingRecord::from_submission(&submission).unwrap();

        let text = |aspect: &str| match value(&record, aspect) {
            Some(RatingValue::Text(t)) => t.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(text("TA_rationale_1_neg"), "It ignored my question");
        assert_eq!(text("TA_rationale_1_pos"), "");
        assert_eq!(text("TA_rationale_2_pos"), "Stayed on topic");
        assert_eq!(text("TA_rationale_2_neg"), "");
        assert_eq!(text("TA_rationale_3_neg"), "");
        assert_eq!(text("TA_rationale_4_pos"), "");
    }

    #[test]
    fn test_out_of_range_rejected() {
        let submission = RatingSubmission {
            ue_1: 11,
            ..RatingSubmission::default()
        };
        assert_eq!(
            RatingRecord::from_submission(&submission),
            Err(RatingError::OutOfRange {
                field: "UE_rating_1",
                value: 11,
                max: 10
            })
        );

        let submission = RatingSubmission {
            emp_3: 101,
            ..RatingSubmission::default()
        };
        assert!(RatingRecord::from_submission(&submission).is_err());

        let submission = RatingSubmission {
            ta_2: -1,
            ..RatingSubmission::default()
        };
        assert_eq!(
            RatingRecord::from_submission(&submission),
            Err(RatingError::OutOfRange {
                field: "TA_rating_2",
                value: -1,
                max: 100
            })
        );

        let submission = RatingSubmission {
            ta_1: 300,
            ..RatingSubmission::default()
        };
        assert!(RatingRecord::from_submission(&submission).is_err());
    }

    #[test]
    fn test_to_csv_rows_in_fixed_order() {
        let submission = RatingSubmission {
            ta_3: 90,
            ta_3_pos: "Practical, one step at a time".to_string(),
            ..RatingSubmission::default()
        };
        let csv = String::from_utf8(
            RatingRecord::from_submission(&submission)
                .unwrap()
                .to_csv()
                .unwrap(),
        )
        .unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 18);
        assert_eq!(lines[0], "aspect,rating");
        assert_eq!(lines[1], "TA_rating_1,50");
        assert_eq!(lines[3], "TA_rating_3,90");
        assert_eq!(lines[7], "TA_rationale_3_pos,\"Practical, one step at a time\"");
        assert_eq!(lines[9], "TA_rationale_1_neg,");
        assert_eq!(lines[13], "UE_rating_1,5");
        assert_eq!(lines[17], "Empathy_rating_3,50");
    }
}
