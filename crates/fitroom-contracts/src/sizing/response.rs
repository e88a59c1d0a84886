use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub size: String,
    /// Absent on the older response shape.
    #[serde(default)]
    pub score: Option<f64>,
}

/// Successful body of `POST {base_url}/predict`.
///
/// Optional fields cover both response generations served by the predictor:
/// the early shape carried only `recommended_size` and `model_version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub recommended_size: String,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub alternatives_note: Option<String>,
    #[serde(default)]
    pub model_version: String,
}

impl PredictionResult {
    /// Alternatives other than the recommended size, in server order.
    pub fn distinct_alternatives(&self) -> impl Iterator<Item = &Alternative> {
        self.alternatives
            .iter()
            .filter(move |alt| alt.size != self.recommended_size)
    }
}

#[cfg(test)]
mod tests {
    use super::PredictionResult;

    #[test]
    fn parses_rich_response_shape() -> anyhow::Result<()> {
        let result: PredictionResult = serde_json::from_str(
            r#"{
                "recommended_size": "M",
                "alternatives": [{"size": "M", "score": 0.9}, {"size": "L", "score": 0.4}],
                "alternatives_note": "Between sizes",
                "model_version": "v1"
            }"#,
        )?;
        assert_eq!(result.recommended_size, "M");
        assert_eq!(result.alternatives.len(), 2);
        assert_eq!(result.alternatives[1].score, Some(0.4));
        assert_eq!(result.alternatives_note.as_deref(), Some("Between sizes"));
        let distinct: Vec<&str> = result
            .distinct_alternatives()
            .map(|alt| alt.size.as_str())
            .collect();
        assert_eq!(distinct, vec!["L"]);
        Ok(())
    }

    #[test]
    fn parses_minimal_response_shape() -> anyhow::Result<()> {
        let result: PredictionResult =
            serde_json::from_str(r#"{"recommended_size": "S", "model_version": "1.0.0"}"#)?;
        assert!(result.alternatives.is_empty());
        assert_eq!(result.alternatives_note, None);
        assert_eq!(result.distinct_alternatives().count(), 0);
        Ok(())
    }

    #[test]
    fn rejects_body_without_recommended_size() {
        let parsed = serde_json::from_str::<PredictionResult>(r#"{"model_version": "v1"}"#);
        assert!(parsed.is_err());
    }
}
