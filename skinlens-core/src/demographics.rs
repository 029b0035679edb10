//! Demographic prediction review
//!
//! Turns the raw confidence distributions returned by the analysis endpoint
//! into ranked, percentage-based lists the user can review, override and
//! accept.

use crate::error::SkinLensError;
use crate::inference::{AnalysisResponse, Distribution, PredictionSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prediction category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Race / ethnicity
    Race,
    /// Age range
    Age,
    /// Gender
    Gender,
}

impl Category {
    /// All categories in display order
    pub const ALL: [Category; 3] = [Category::Race, Category::Age, Category::Gender];

    /// Lowercase name used in payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Race => "race",
            Category::Age => "age",
            Category::Gender => "gender",
        }
    }

    fn display_label(&self, raw: &str) -> String {
        match self {
            Category::Race => capitalize(raw),
            Category::Age => raw.to_string(),
            Category::Gender => raw.to_uppercase(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One label with its rounded confidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Display label
    pub label: String,
    /// Confidence as a whole percentage, 0..=100
    pub confidence: u8,
}

/// Ranked predictions for one category plus the user's current pick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPredictions {
    entries: Vec<Prediction>,
    selected: usize,
}

impl RankedPredictions {
    fn from_distribution(category: Category, distribution: &Distribution) -> Self {
        let mut entries: Vec<Prediction> = distribution
            .iter()
            .map(|(label, confidence)| Prediction {
                label: category.display_label(label),
                confidence: to_percent(confidence),
            })
            .collect();

        // stable: equal confidences keep arrival order
        entries.sort_by(|a, b| b.confidence.cmp(&a.confidence));

        Self {
            entries,
            selected: 0,
        }
    }

    /// Entries, highest confidence first
    pub fn entries(&self) -> &[Prediction] {
        &self.entries
    }

    /// Highest-confidence entry
    pub fn top(&self) -> Option<&Prediction> {
        self.entries.first()
    }

    /// Entry currently chosen by the user (the top entry until changed)
    pub fn selected(&self) -> Option<&Prediction> {
        self.entries.get(self.selected)
    }

    /// Whether no predictions were returned for this category
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What the user confirmed at the end of the review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedProfile {
    /// Accepted race label
    pub race: String,
    /// Accepted age range
    pub age: String,
    /// Accepted gender label
    pub gender: String,
}

/// Reviewable demographic predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicReport {
    race: RankedPredictions,
    age: RankedPredictions,
    gender: RankedPredictions,
}

impl DemographicReport {
    /// Build a report from raw distributions
    pub fn from_predictions(predictions: &PredictionSet) -> Self {
        Self {
            race: RankedPredictions::from_distribution(Category::Race, &predictions.race),
            age: RankedPredictions::from_distribution(Category::Age, &predictions.age),
            gender: RankedPredictions::from_distribution(Category::Gender, &predictions.gender),
        }
    }

    /// Ranked predictions for a category
    pub fn category(&self, category: Category) -> &RankedPredictions {
        match category {
            Category::Race => &self.race,
            Category::Age => &self.age,
            Category::Gender => &self.gender,
        }
    }

    fn category_mut(&mut self, category: Category) -> &mut RankedPredictions {
        match category {
            Category::Race => &mut self.race,
            Category::Age => &mut self.age,
            Category::Gender => &mut self.gender,
        }
    }

    /// Override the selection for a category by display label
    pub fn select(&mut self, category: Category, label: &str) -> Result<(), SkinLensError> {
        let ranked = self.category_mut(category);
        let index = ranked
            .entries
            .iter()
            .position(|p| p.label == label)
            .ok_or_else(|| SkinLensError::InvalidState {
                expected: format!("a known {} label", category),
                actual: label.to_string(),
            })?;
        ranked.selected = index;
        Ok(())
    }

    /// Confirm the current selections
    pub fn accept(&self) -> Result<AcceptedProfile, SkinLensError> {
        let pick = |category: Category| {
            self.category(category)
                .selected()
                .map(|p| p.label.clone())
                .ok_or_else(|| SkinLensError::InvalidState {
                    expected: format!("at least one {} prediction", category),
                    actual: "none".to_string(),
                })
        };

        Ok(AcceptedProfile {
            race: pick(Category::Race)?,
            age: pick(Category::Age)?,
            gender: pick(Category::Gender)?,
        })
    }
}

impl From<&AnalysisResponse> for DemographicReport {
    fn from(response: &AnalysisResponse) -> Self {
        Self::from_predictions(&response.data)
    }
}

fn to_percent(confidence: f64) -> u8 {
    if !confidence.is_finite() {
        return 0;
    }
    (confidence * 100.0).round().clamp(0.0, 100.0) as u8
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
