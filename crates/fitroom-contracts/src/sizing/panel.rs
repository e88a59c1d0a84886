use super::response::PredictionResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternativeRow {
    pub size: String,
    pub confidence: Option<String>,
}

/// Read-only projection of a [`PredictionResult`] for the result panel.
///
/// The recommended size never repeats in `alternatives`; confidences are
/// percentages with one decimal place when the response carries scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPanel {
    pub suggested_size: String,
    pub alternatives: Vec<AlternativeRow>,
    pub note: Option<String>,
    pub model_version: Option<String>,
}

impl ResultPanel {
    pub fn from_result(result: &PredictionResult) -> Self {
        let alternatives = result
            .distinct_alternatives()
            .map(|alt| AlternativeRow {
                size: alt.size.clone(),
                confidence: alt.score.map(format_confidence),
            })
            .collect();
        Self {
            suggested_size: result.recommended_size.clone(),
            alternatives,
            note: non_empty(result.alternatives_note.as_deref()),
            model_version: non_empty(Some(result.model_version.as_str())),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("Suggested Size: {}", self.suggested_size)];
        if !self.alternatives.is_empty() {
            lines.push("Other Possible Sizes:".to_string());
            for row in &self.alternatives {
                match row.confidence.as_deref() {
                    Some(confidence) => {
                        lines.push(format!("  {} - Confidence: {confidence}", row.size))
                    }
                    None => lines.push(format!("  {}", row.size)),
                }
            }
        }
        if let Some(note) = self.note.as_deref() {
            lines.push(note.to_string());
        }
        if let Some(version) = self.model_version.as_deref() {
            lines.push(format!("Model Used: {version}"));
        }
        lines
    }
}

pub fn format_confidence(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
