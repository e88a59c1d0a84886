use std::fmt;
use std::sync::Arc;

use fitroom_contracts::events::{EventPayload, EventWriter};
use serde_json::{json, Value};

use crate::blob::{BlobInfo, BlobRef};
use crate::error::{ServiceFailure, ValidationRejection};
use crate::generator::{Cancellation, TryOnGenerator, TryOnJob};
use crate::task::{Task, TaskPoll};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TryOnStep {
    #[default]
    Upload,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    User,
    Product,
}

impl ImageSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSlot::User => "user",
            ImageSlot::Product => "product",
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Started,
    /// Generation already running, or the result is already showing.
    Ignored,
}

/// Snapshot handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryOnView {
    pub step: TryOnStep,
    pub user_image: Option<BlobInfo>,
    pub product_image: Option<BlobInfo>,
    pub result_image: Option<BlobInfo>,
    pub generating: bool,
    pub error: Option<String>,
}

impl TryOnView {
    pub fn can_advance(&self) -> bool {
        self.step == TryOnStep::Upload
            && !self.generating
            && self.user_image.is_some()
            && self.product_image.is_some()
    }
}

type GenerateOutcome = Result<BlobRef, ServiceFailure>;

/// A running generation. The worker only holds weak image handles, and
/// dropping this cancels it.
struct Generation {
    task: Task<GenerateOutcome>,
    _cancel: Cancellation,
}

/// Two-step virtual try-on wizard: Upload (both images required) then Result.
///
/// The session owns every image handle it holds; replacing a slot or closing
/// the session releases the previous handles.
pub struct TryOnSession {
    generator: Arc<dyn TryOnGenerator>,
    user_image: Option<BlobRef>,
    product_image: Option<BlobRef>,
    step: TryOnStep,
    result_image: Option<BlobRef>,
    generating: Option<Generation>,
    error: Option<String>,
    events: Option<EventWriter>,
}

impl TryOnSession {
    pub fn new(generator: Arc<dyn TryOnGenerator>) -> Self {
        Self {
            generator,
            user_image: None,
            product_image: None,
            step: TryOnStep::Upload,
            result_image: None,
            generating: None,
            error: None,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn step(&self) -> TryOnStep {
        self.step
    }

    pub fn user_image(&self) -> Option<&BlobRef> {
        self.user_image.as_ref()
    }

    pub fn product_image(&self) -> Option<&BlobRef> {
        self.product_image.as_ref()
    }

    pub fn result_image(&self) -> Option<&BlobRef> {
        self.result_image.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_generating(&self) -> bool {
        self.generating.is_some()
    }

    pub fn set_user_image(&mut self, blob: BlobRef) {
        self.set_image(ImageSlot::User, blob);
    }

    pub fn set_product_image(&mut self, blob: BlobRef) {
        self.set_image(ImageSlot::Product, blob);
    }

    /// Replaces the slot's handle and releases the previous one at once.
    /// A stale preview or a generation started from the old images is
    /// discarded, and a showing result returns the wizard to Upload.
    pub fn set_image(&mut self, slot: ImageSlot, blob: BlobRef) {
        self.record(
            "tryon_image_selected",
            json!({
                "slot": slot.as_str(),
                "blob_id": blob.id().to_string(),
                "digest": blob.digest(),
                "mime": blob.mime(),
                "bytes": blob.len(),
            }),
        );
        let previous = match slot {
            ImageSlot::User => self.user_image.replace(blob),
            ImageSlot::Product => self.product_image.replace(blob),
        };
        drop(previous);
        if self.result_image.take().is_some() {
            self.step = TryOnStep::Upload;
        }
        if self.generating.take().is_some() {
            self.record("tryon_generation_abandoned", json!({ "slot": slot.as_str() }));
        }
    }

    pub fn advance(&mut self) -> Result<AdvanceOutcome, ValidationRejection> {
        if self.step == TryOnStep::Result || self.generating.is_some() {
            return Ok(AdvanceOutcome::Ignored);
        }
        let (Some(user), Some(product)) = (self.user_image.clone(), self.product_image.clone())
        else {
            let missing: Vec<ImageSlot> = [
                (ImageSlot::User, self.user_image.is_none()),
                (ImageSlot::Product, self.product_image.is_none()),
            ]
            .into_iter()
            .filter_map(|(slot, absent)| absent.then_some(slot))
            .collect();
            self.record(
                "tryon_rejected",
                json!({
                    "missing": missing.iter().map(|slot| slot.as_str()).collect::<Vec<_>>(),
                }),
            );
            return Err(ValidationRejection::MissingImages { missing });
        };

        self.error = None;
        self.record(
            "tryon_generation_started",
            json!({
                "user_digest": user.digest(),
                "product_digest": product.digest(),
            }),
        );
        let (job, cancel) = TryOnJob::new(&user, &product);
        let generator = Arc::clone(&self.generator);
        match Task::spawn("fitroom-tryon", move || generator.generate(&job)) {
            Ok(task) => {
                self.generating = Some(Generation {
                    task,
                    _cancel: cancel,
                })
            }
            Err(err) => self.apply(Err(ServiceFailure::transport(&err))),
        }
        Ok(AdvanceOutcome::Started)
    }

    /// Applies the generation result if it has arrived. Returns true on a
    /// transition.
    pub fn poll(&mut self) -> bool {
        let Some(generation) = self.generating.as_mut() else {
            return false;
        };
        let outcome = match generation.task.poll() {
            TaskPoll::Pending => return false,
            TaskPoll::Ready(outcome) => outcome,
            TaskPoll::Lost => Err(ServiceFailure::lost()),
        };
        self.generating = None;
        self.apply(outcome);
        true
    }

    /// Blocks until a running generation resolves.
    pub fn wait(&mut self) -> TryOnStep {
        if let Some(generation) = self.generating.take() {
            let outcome = generation
                .task
                .wait()
                .unwrap_or_else(|| Err(ServiceFailure::lost()));
            self.apply(outcome);
        }
        self.step
    }

    /// Result -> Upload. Both image handles are kept for another attempt.
    pub fn back(&mut self) -> bool {
        if self.step != TryOnStep::Result {
            return false;
        }
        self.step = TryOnStep::Upload;
        self.record("tryon_back", json!({}));
        true
    }

    pub fn snapshot(&self) -> TryOnView {
        TryOnView {
            step: self.step,
            user_image: self.user_image.as_ref().map(BlobRef::info),
            product_image: self.product_image.as_ref().map(BlobRef::info),
            result_image: self.result_image.as_ref().map(BlobRef::info),
            generating: self.generating.is_some(),
            error: self.error.clone(),
        }
    }

    /// Ends the session at any step, releasing every held image handle and
    /// abandoning a running generation.
    pub fn close(mut self) {
        self.generating = None;
        self.result_image = None;
        self.user_image = None;
        self.product_image = None;
        let step = match self.step {
            TryOnStep::Upload => "upload",
            TryOnStep::Result => "result",
        };
        self.record("tryon_closed", json!({ "step": step }));
    }

    fn apply(&mut self, outcome: GenerateOutcome) {
        match outcome {
            Ok(result) => {
                self.record(
                    "tryon_generation_finished",
                    json!({
                        "result_id": result.id().to_string(),
                        "digest": result.digest(),
                    }),
                );
                self.result_image = Some(result);
                self.step = TryOnStep::Result;
            }
            Err(failure) => {
                self.record(
                    "tryon_generation_failed",
                    json!({
                        "status": failure.status(),
                        "message": failure.message(),
                    }),
                );
                self.error = Some(failure.message().to_string());
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
