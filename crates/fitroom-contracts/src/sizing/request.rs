use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    #[default]
    DecisionTree,
    NeuralNetwork,
    NaiveBayes,
}

impl ModelType {
    pub const ALL: [ModelType; 3] = [
        ModelType::DecisionTree,
        ModelType::NeuralNetwork,
        ModelType::NaiveBayes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::DecisionTree => "decision_tree",
            ModelType::NeuralNetwork => "neural_network",
            ModelType::NaiveBayes => "naive_bayes",
        }
    }

    /// Label shown next to the model selector.
    pub fn label(self) -> &'static str {
        match self {
            ModelType::DecisionTree => "Decision Tree",
            ModelType::NeuralNetwork => "Neural Network (MLP)",
            ModelType::NaiveBayes => "Naive Bayes",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        ModelType::ALL
            .into_iter()
            .find(|model| model.as_str() == normalized)
            .ok_or_else(|| format!("Unknown model type '{}'.", raw.trim()))
    }
}

/// Body of `POST {base_url}/predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub age: u32,
    pub model_type: ModelType,
}
