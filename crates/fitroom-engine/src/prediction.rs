use std::fmt;
use std::sync::Arc;

use fitroom_contracts::events::{EventPayload, EventWriter};
use fitroom_contracts::sizing::{ModelType, PredictionRequest, PredictionResult, ResultPanel};
use serde_json::{json, Value};

use crate::error::{ServiceFailure, ValidationRejection};
use crate::predictor::Predictor;
use crate::task::{Task, TaskPoll};

pub const LOADING_MESSAGE: &str = "Predicting your best size...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    Height,
    Weight,
    Age,
    ModelType,
}

impl FormField {
    pub fn as_str(self) -> &'static str {
        match self {
            FormField::Height => "height",
            FormField::Weight => "weight",
            FormField::Age => "age",
            FormField::ModelType => "model_type",
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw, unvalidated form input exactly as the shopper typed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionForm {
    pub height: String,
    pub weight: String,
    pub age: String,
    pub model_type: String,
}

impl Default for PredictionForm {
    fn default() -> Self {
        Self {
            height: String::new(),
            weight: String::new(),
            age: String::new(),
            model_type: ModelType::default().as_str().to_string(),
        }
    }
}

impl PredictionForm {
    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::Height => &self.height,
            FormField::Weight => &self.weight,
            FormField::Age => &self.age,
            FormField::ModelType => &self.model_type,
        }
    }

    fn set(&mut self, field: FormField, raw: String) {
        match field {
            FormField::Height => self.height = raw,
            FormField::Weight => self.weight = raw,
            FormField::Age => self.age = raw,
            FormField::ModelType => self.model_type = raw,
        }
    }

    /// Presence is checked before positivity, so an empty field always reports
    /// as missing even when another one is also out of range.
    pub fn validate(&self) -> Result<PredictionRequest, ValidationRejection> {
        let numeric = [FormField::Height, FormField::Weight, FormField::Age];
        let missing: Vec<FormField> = numeric
            .into_iter()
            .filter(|field| self.get(*field).trim().is_empty())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationRejection::MissingFields { missing });
        }

        let height = positive_number(&self.height);
        let weight = positive_number(&self.weight);
        let age = positive_number(&self.age)
            .filter(|value| value.fract() == 0.0 && *value <= f64::from(u32::MAX))
            .map(|value| value as u32);
        let (Some(height_cm), Some(weight_kg), Some(age)) = (height, weight, age) else {
            let fields = [
                (FormField::Height, height.is_none()),
                (FormField::Weight, weight.is_none()),
                (FormField::Age, age.is_none()),
            ]
            .into_iter()
            .filter_map(|(field, invalid)| invalid.then_some(field))
            .collect();
            return Err(ValidationRejection::NonPositive { fields });
        };

        let model_type = self
            .model_type
            .parse::<ModelType>()
            .map_err(|_| ValidationRejection::UnknownModel {
                raw: self.model_type.clone(),
            })?;

        Ok(PredictionRequest {
            height_cm,
            weight_kg,
            age,
            model_type,
        })
    }
}

fn positive_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
}

/// What the size suggestion surface currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Idle,
    Pending,
    Succeeded(PredictionResult),
    Failed(String),
}

impl ViewState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ViewState::Pending)
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        match self {
            ViewState::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ViewState::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn form_visible(&self) -> bool {
        !matches!(self, ViewState::Succeeded(_))
    }

    pub fn form_editable(&self) -> bool {
        matches!(self, ViewState::Idle | ViewState::Failed(_))
    }

    pub fn result_panel(&self) -> Option<ResultPanel> {
        self.result().map(ResultPanel::from_result)
    }

    /// Loading line or error banner, if either is showing.
    pub fn banner(&self) -> Option<String> {
        match self {
            ViewState::Pending => Some(LOADING_MESSAGE.to_string()),
            ViewState::Failed(message) => Some(format!("⚠ {message}")),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ViewState::Idle => "idle",
            ViewState::Pending => "pending",
            ViewState::Succeeded(_) => "succeeded",
            ViewState::Failed(_) => "failed",
        }
    }
}

/// Whether form values survive `reset()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldRetention {
    #[default]
    Retain,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Issued,
    /// A request is already in flight or a result is showing.
    Ignored,
}

type PredictionOutcome = Result<PredictionResult, ServiceFailure>;

/// Size suggestion controller: form state, validation gate, one in-flight
/// request, and the Idle/Pending/Succeeded/Failed view state.
pub struct PredictionFlow {
    predictor: Arc<dyn Predictor>,
    form: PredictionForm,
    view: ViewState,
    in_flight: Option<Task<PredictionOutcome>>,
    retention: FieldRetention,
    events: Option<EventWriter>,
    requests_issued: u64,
}

impl PredictionFlow {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self {
            predictor,
            form: PredictionForm::default(),
            view: ViewState::Idle,
            in_flight: None,
            retention: FieldRetention::default(),
            events: None,
            requests_issued: 0,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_retention(mut self, retention: FieldRetention) -> Self {
        self.retention = retention;
        self
    }

    pub fn form(&self) -> &PredictionForm {
        &self.form
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn requests_issued(&self) -> u64 {
        self.requests_issued
    }

    pub fn set_field(&mut self, field: FormField, raw: impl Into<String>) {
        self.form.set(field, raw.into());
    }

    pub fn submit(&mut self) -> Result<SubmitOutcome, ValidationRejection> {
        if !self.view.form_editable() {
            return Ok(SubmitOutcome::Ignored);
        }
        let request = match self.form.validate() {
            Ok(request) => request,
            Err(rejection) => {
                self.record(
                    "prediction_rejected",
                    json!({ "reason": rejection.to_string() }),
                );
                return Err(rejection);
            }
        };

        self.record(
            "prediction_requested",
            json!({
                "height_cm": request.height_cm,
                "weight_kg": request.weight_kg,
                "age": request.age,
                "model_type": request.model_type.as_str(),
            }),
        );
        self.requests_issued += 1;
        self.view = ViewState::Pending;

        let predictor = Arc::clone(&self.predictor);
        match Task::spawn("fitroom-predict", move || predictor.predict(&request)) {
            Ok(task) => self.in_flight = Some(task),
            Err(err) => self.apply(Err(ServiceFailure::transport(&err))),
        }
        Ok(SubmitOutcome::Issued)
    }

    /// Applies the response if it has arrived. Returns true on a transition.
    pub fn poll(&mut self) -> bool {
        let Some(task) = self.in_flight.as_mut() else {
            return false;
        };
        let outcome = match task.poll() {
            TaskPoll::Pending => return false,
            TaskPoll::Ready(outcome) => outcome,
            TaskPoll::Lost => Err(ServiceFailure::lost()),
        };
        self.in_flight = None;
        self.apply(outcome);
        true
    }

    /// Blocks until the in-flight request resolves.
    pub fn wait(&mut self) -> &ViewState {
        if let Some(task) = self.in_flight.take() {
            let outcome = task.wait().unwrap_or_else(|| Err(ServiceFailure::lost()));
            self.apply(outcome);
        }
        &self.view
    }

    /// "Try again": back to Idle from Succeeded or Failed.
    pub fn reset(&mut self) -> bool {
        if !matches!(self.view, ViewState::Succeeded(_) | ViewState::Failed(_)) {
            return false;
        }
        let from = self.view.label();
        self.view = ViewState::Idle;
        if self.retention == FieldRetention::Clear {
            self.form = PredictionForm::default();
        }
        self.record("prediction_reset", json!({ "from": from }));
        true
    }

    /// Discards the controller; a request still in flight is abandoned.
    pub fn close(mut self) {
        if self.in_flight.take().is_some() {
            self.record("prediction_abandoned", json!({}));
        }
    }

    fn apply(&mut self, outcome: PredictionOutcome) {
        match outcome {
            Ok(result) => {
                self.record(
                    "prediction_succeeded",
                    json!({
                        "recommended_size": result.recommended_size,
                        "alternatives": result.alternatives.len(),
                        "model_version": result.model_version,
                    }),
                );
                self.view = ViewState::Succeeded(result);
            }
            Err(failure) => {
                self.record(
                    "prediction_failed",
                    json!({
                        "status": failure.status(),
                        "message": failure.message(),
                    }),
                );
                self.view = ViewState::Failed(failure.message().to_string());
            }
        }
    }

    fn record(&self, event_type: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        events.record(event_type, payload);
    }
}
