use std::fmt;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use fitroom_contracts::error_body::{failure_message, TRYON_FAILED_MESSAGE};
use fitroom_contracts::service::{GarmentCategory, TryOnResponse};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;

use crate::blob::{BlobRef, BlobStore, WeakBlob};
use crate::config::ApiConfig;
use crate::error::ServiceFailure;

pub const STUB_DELAY: Duration = Duration::from_millis(2000);

/// Composites a shopper photo with a product image.
pub trait TryOnGenerator: Send + Sync {
    fn generate(&self, job: &TryOnJob) -> Result<BlobRef, ServiceFailure>;
}

/// Inputs of one generation, as seen from the worker.
///
/// The job never keeps its images live: once the owning session lets go of
/// a handle, [`TryOnJob::user`] and [`TryOnJob::product`] report
/// [`ServiceFailure::Cancelled`]. Dropping the paired [`Cancellation`] wakes
/// any [`TryOnJob::pause`] early.
#[derive(Debug)]
pub struct TryOnJob {
    user: WeakBlob,
    product: WeakBlob,
    cancel: mpsc::Receiver<()>,
}

/// Owner side of a [`TryOnJob`]; dropping it cancels the job.
#[derive(Debug)]
pub struct Cancellation {
    _tx: mpsc::Sender<()>,
}

impl TryOnJob {
    pub fn new(user: &BlobRef, product: &BlobRef) -> (Self, Cancellation) {
        let (tx, rx) = mpsc::channel();
        let job = Self {
            user: user.downgrade(),
            product: product.downgrade(),
            cancel: rx,
        };
        (job, Cancellation { _tx: tx })
    }

    pub fn user(&self) -> Result<BlobRef, ServiceFailure> {
        self.user.upgrade().ok_or(ServiceFailure::Cancelled)
    }

    pub fn product(&self) -> Result<BlobRef, ServiceFailure> {
        self.product.upgrade().ok_or(ServiceFailure::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        !matches!(self.cancel.try_recv(), Err(mpsc::TryRecvError::Empty))
    }

    /// Sleeps for `delay` unless the job is cancelled first.
    pub fn pause(&self, delay: Duration) -> Result<(), ServiceFailure> {
        match self.cancel.recv_timeout(delay) {
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(()),
            _ => Err(ServiceFailure::Cancelled),
        }
    }
}

/// Placeholder compositor: waits, then hands back the shopper's own photo.
#[derive(Debug, Clone, Copy)]
pub struct StubGenerator {
    delay: Duration,
}

impl StubGenerator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for StubGenerator {
    fn default() -> Self {
        Self::new(STUB_DELAY)
    }
}

impl TryOnGenerator for StubGenerator {
    fn generate(&self, job: &TryOnJob) -> Result<BlobRef, ServiceFailure> {
        job.pause(self.delay)?;
        job.user()
    }
}

/// Remote try-on pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TryOnPipeline {
    /// OOTDiffusion half-body model.
    #[default]
    Hd,
    /// OOTDiffusion full-body model, told which garment region to replace.
    Dc(GarmentCategory),
    /// Hosted image model.
    Imagen,
}

impl TryOnPipeline {
    pub const NAMES: [&'static str; 3] = ["hd", "dc", "imagen"];

    /// Combines a pipeline name with an optional garment category. Only the
    /// `dc` pipeline takes a category; it defaults to upper body.
    pub fn from_parts(name: &str, category: Option<GarmentCategory>) -> Result<Self, String> {
        let pipeline = match name.trim().to_ascii_lowercase().as_str() {
            "hd" => TryOnPipeline::Hd,
            "dc" => TryOnPipeline::Dc(category.unwrap_or_default()),
            "imagen" => TryOnPipeline::Imagen,
            other => {
                return Err(format!(
                    "Unknown try-on pipeline '{other}'; expected one of {}.",
                    Self::NAMES.join(", ")
                ))
            }
        };
        if category.is_some() && !matches!(pipeline, TryOnPipeline::Dc(_)) {
            return Err(format!("The {pipeline} pipeline does not take a category."));
        }
        Ok(pipeline)
    }

    pub fn name(self) -> &'static str {
        match self {
            TryOnPipeline::Hd => "hd",
            TryOnPipeline::Dc(_) => "dc",
            TryOnPipeline::Imagen => "imagen",
        }
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            TryOnPipeline::Hd => "try-on-hd",
            TryOnPipeline::Dc(_) => "try-on-dc",
            TryOnPipeline::Imagen => "imagen-try-on",
        }
    }
}

impl fmt::Display for TryOnPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Remote compositor behind the try-on service.
///
/// Uploads both images to the selected pipeline and downloads the composite
/// into `store` as a fresh blob.
#[derive(Debug, Clone)]
pub struct HttpTryOnGenerator {
    config: ApiConfig,
    http: HttpClient,
    store: BlobStore,
    pipeline: TryOnPipeline,
}

impl HttpTryOnGenerator {
    pub fn new(config: ApiConfig, store: BlobStore) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout())
            .build()
            .context("failed building try-on HTTP client")?;
        Ok(Self {
            config,
            http,
            store,
            pipeline: TryOnPipeline::default(),
        })
    }

    pub fn with_pipeline(mut self, pipeline: TryOnPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn pipeline(&self) -> TryOnPipeline {
        self.pipeline
    }

    fn image_part(blob: &BlobRef) -> Result<MultipartPart, ServiceFailure> {
        MultipartPart::bytes(blob.bytes().to_vec())
            .file_name(blob.name().to_string())
            .mime_str(blob.mime())
            .map_err(|err| ServiceFailure::transport(&err))
    }

    /// Copies both images into the upload; the handles are released before
    /// the request goes out.
    fn upload_form(&self, job: &TryOnJob) -> Result<MultipartForm, ServiceFailure> {
        let user = job.user()?;
        let product = job.product()?;
        let mut form = MultipartForm::new()
            .part("vton_img", Self::image_part(&user)?)
            .part("garm_img", Self::image_part(&product)?);
        if let TryOnPipeline::Dc(category) = self.pipeline {
            form = form.text("category", category.as_str());
        }
        Ok(form)
    }

    fn download(&self, response: &TryOnResponse) -> Result<BlobRef, ServiceFailure> {
        let url = self
            .config
            .resolve(&response.image_url)
            .map_err(|err| ServiceFailure::Request {
                status: 200,
                message: err.to_string(),
            })?;
        let download = self
            .http
            .get(url.clone())
            .send()
            .map_err(|err| ServiceFailure::transport(&err))?;
        let status = download.status();
        if !status.is_success() {
            return Err(ServiceFailure::Request {
                status: status.as_u16(),
                message: TRYON_FAILED_MESSAGE.to_string(),
            });
        }
        let bytes = download
            .bytes()
            .map_err(|err| ServiceFailure::transport(&err))?
            .to_vec();
        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .unwrap_or("tryon-result")
            .to_string();
        self.store
            .import_bytes(name, bytes)
            .map_err(|err| ServiceFailure::Request {
                status: status.as_u16(),
                message: format!("{TRYON_FAILED_MESSAGE} {err}"),
            })
    }
}

impl TryOnGenerator for HttpTryOnGenerator {
    fn generate(&self, job: &TryOnJob) -> Result<BlobRef, ServiceFailure> {
        let form = self.upload_form(job)?;
        let response = self
            .http
            .post(self.config.endpoint(self.pipeline.endpoint()))
            .multipart(form)
            .send()
            .map_err(|err| ServiceFailure::transport(&err))?;
        let status = response.status();
        let code = status.as_u16();
        let body = response
            .text()
            .map_err(|err| ServiceFailure::transport(&err))?;
        if !status.is_success() {
            return Err(ServiceFailure::Request {
                status: code,
                message: failure_message(&body, TRYON_FAILED_MESSAGE),
            });
        }
        let parsed: TryOnResponse =
            serde_json::from_str(&body).map_err(|_| ServiceFailure::Request {
                status: code,
                message: TRYON_FAILED_MESSAGE.to_string(),
            })?;
        // Nobody is waiting for the composite any more.
        if job.is_cancelled() {
            return Err(ServiceFailure::Cancelled);
        }
        self.download(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use fitroom_contracts::service::GarmentCategory;
    use serde_json::json;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{HttpTryOnGenerator, StubGenerator, TryOnGenerator, TryOnJob, TryOnPipeline};
    use crate::blob::tests::png_bytes;
    use crate::blob::BlobStore;
    use crate::config::ApiConfig;
    use crate::error::ServiceFailure;

    fn mock_server() -> anyhow::Result<(Runtime, MockServer)> {
        let rt = Runtime::new()?;
        let server = rt.block_on(MockServer::start());
        Ok((rt, server))
    }

    fn generator(base_url: &str, store: &BlobStore) -> anyhow::Result<HttpTryOnGenerator> {
        HttpTryOnGenerator::new(
            ApiConfig::new(base_url)?.with_timeout(Duration::from_secs(5)),
            store.clone(),
        )
    }

    #[test]
    fn stub_returns_user_image_after_delay() -> anyhow::Result<()> {
        let store = BlobStore::new();
        let user = store.import_bytes("me.png", png_bytes(1))?;
        let product = store.import_bytes("shirt.png", png_bytes(2))?;
        let (job, _cancel) = TryOnJob::new(&user, &product);
        let started = Instant::now();
        let result = StubGenerator::new(Duration::from_millis(20)).generate(&job)?;
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(result, user);
        Ok(())
    }

    #[test]
    fn stub_stops_waiting_once_cancelled() -> anyhow::Result<()> {
        let store = BlobStore::new();
        let user = store.import_bytes("me.png", png_bytes(1))?;
        let product = store.import_bytes("shirt.png", png_bytes(2))?;
        let (job, cancel) = TryOnJob::new(&user, &product);
        drop(cancel);

        let started = Instant::now();
        let outcome = StubGenerator::new(Duration::from_secs(60)).generate(&job);
        assert_eq!(outcome, Err(ServiceFailure::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn job_does_not_keep_images_live() -> anyhow::Result<()> {
        let store = BlobStore::new();
        let user = store.import_bytes("me.png", png_bytes(1))?;
        let product = store.import_bytes("shirt.png", png_bytes(2))?;
        let (job, _cancel) = TryOnJob::new(&user, &product);
        assert!(!job.is_cancelled());

        drop(product);
        assert_eq!(store.live_count(), 1);
        assert_eq!(job.product(), Err(ServiceFailure::Cancelled));
        assert_eq!(job.user(), Ok(user));
        Ok(())
    }

    #[test]
    fn pipeline_names_and_categories() {
        assert_eq!(TryOnPipeline::from_parts("hd", None), Ok(TryOnPipeline::Hd));
        assert_eq!(
            TryOnPipeline::from_parts("DC", None),
            Ok(TryOnPipeline::Dc(GarmentCategory::UpperBody))
        );
        assert_eq!(
            TryOnPipeline::from_parts("dc", Some(GarmentCategory::Dress)),
            Ok(TryOnPipeline::Dc(GarmentCategory::Dress))
        );
        assert_eq!(
            TryOnPipeline::from_parts(" imagen ", None),
            Ok(TryOnPipeline::Imagen)
        );
        assert!(TryOnPipeline::from_parts("imagen", Some(GarmentCategory::Dress)).is_err());
        assert!(TryOnPipeline::from_parts("sdxl", None).is_err());
        assert_eq!(TryOnPipeline::Imagen.endpoint(), "imagen-try-on");
    }

    #[test]
    fn http_generator_uploads_both_images_and_downloads_result() -> anyhow::Result<()> {
        let (rt, server) = mock_server()?;
        let composite = png_bytes(99);
        rt.block_on(async {
            Mock::given(method("POST"))
                .and(path("/api/virtual-tryon/try-on-hd"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "image_url": "/outputs/hd_tryon_42.png",
                    "message": "Virtual try-on completed successfully",
                    "category": "HD",
                    "processing_time": 3.2,
                })))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/outputs/hd_tryon_42.png"))
                .respond_with(ResponseTemplate::new(200).set_body_raw(composite.clone(), "image/png"))
                .mount(&server)
                .await;
        });
        let store = BlobStore::new();
        let generator = generator(&format!("{}/api/virtual-tryon", server.uri()), &store)?;
        let user = store.import_bytes("me.png", png_bytes(1))?;
        let product = store.import_bytes("shirt.png", png_bytes(2))?;
        let (job, _cancel) = TryOnJob::new(&user, &product);

        let result = generator.generate(&job)?;
        assert_eq!(result.bytes(), composite.as_slice());
        assert_eq!(result.name(), "hd_tryon_42.png");
        assert_ne!(result, user);
        assert_eq!(store.live_count(), 3);

        let requests = rt.block_on(server.received_requests()).unwrap_or_default();
        assert_eq!(requests.len(), 2);
        let upload = String::from_utf8_lossy(&requests[0].body).to_string();
        assert!(upload.contains("name=\"vton_img\"; filename=\"me.png\""));
        assert!(upload.contains("name=\"garm_img\"; filename=\"shirt.png\""));
        assert!(!upload.contains("name=\"category\""));
        Ok(())
    }

    #[test]
    fn http_generator_sends_category_to_dc_pipeline() -> anyhow::Result<()> {
        let (rt, server) = mock_server()?;
        rt.block_on(
            Mock::given(method("POST"))
                .and(path("/try-on-dc"))
                .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                    "detail": "Virtual try-on failed: upstream queue full"
                })))
                .mount(&server),
        );
        let store = BlobStore::new();
        let generator = generator(&server.uri(), &store)?
            .with_pipeline(TryOnPipeline::Dc(GarmentCategory::Dress));
        let user = store.import_bytes("me.png", png_bytes(1))?;
        let product = store.import_bytes("dress.png", png_bytes(2))?;
        let (job, _cancel) = TryOnJob::new(&user, &product);

        let err = generator
            .generate(&job)
            .err()
            .unwrap_or_else(ServiceFailure::lost);
        assert_eq!(
            err,
            ServiceFailure::Request {
                status: 500,
                message: "Virtual try-on failed: upstream queue full".to_string()
            }
        );

        let requests = rt.block_on(server.received_requests()).unwrap_or_default();
        assert_eq!(requests.len(), 1);
        let upload = String::from_utf8_lossy(&requests[0].body).to_string();
        assert!(upload.contains("name=\"category\""));
        assert!(upload.contains("Dress"));
        Ok(())
    }

    #[test]
    fn http_generator_posts_images_only_to_imagen_pipeline() -> anyhow::Result<()> {
        let (rt, server) = mock_server()?;
        rt.block_on(async {
            Mock::given(method("POST"))
                .and(path("/imagen-try-on"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "image_url": "/outputs/imagen_tryon_7.png",
                    "message": "Virtual try-on with Imagen completed successfully",
                    "category": "Imagen AI",
                    "processing_time": 8.4,
                })))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/outputs/imagen_tryon_7.png"))
                .respond_with(ResponseTemplate::new(200).set_body_raw(png_bytes(7), "image/png"))
                .mount(&server)
                .await;
        });
        let store = BlobStore::new();
        let generator = generator(&server.uri(), &store)?.with_pipeline(TryOnPipeline::Imagen);
        let user = store.import_bytes("me.png", png_bytes(1))?;
        let product = store.import_bytes("shirt.png", png_bytes(2))?;
        let (job, _cancel) = TryOnJob::new(&user, &product);

        let result = generator.generate(&job)?;
        assert_eq!(result.name(), "imagen_tryon_7.png");

        let requests = rt.block_on(server.received_requests()).unwrap_or_default();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url.path(), "/imagen-try-on");
        let upload = String::from_utf8_lossy(&requests[0].body).to_string();
        assert_eq!(upload.matches("Content-Disposition: form-data;").count(), 2);
        assert!(upload.contains("name=\"vton_img\""));
        assert!(upload.contains("name=\"garm_img\""));
        assert!(!upload.contains("name=\"category\""));
        Ok(())
    }

    #[test]
    fn released_inputs_cancel_before_upload() -> anyhow::Result<()> {
        let (rt, server) = mock_server()?;
        let store = BlobStore::new();
        let generator = generator(&server.uri(), &store)?;
        let user = store.import_bytes("me.png", png_bytes(1))?;
        let (job, _cancel) = {
            let product = store.import_bytes("shirt.png", png_bytes(2))?;
            TryOnJob::new(&user, &product)
        };

        assert_eq!(generator.generate(&job), Err(ServiceFailure::Cancelled));
        let requests = rt.block_on(server.received_requests()).unwrap_or_default();
        assert!(requests.is_empty());
        Ok(())
    }

    #[test]
    fn non_image_result_is_a_request_failure() -> anyhow::Result<()> {
        let (rt, server) = mock_server()?;
        rt.block_on(async {
            Mock::given(method("POST"))
                .and(path("/try-on-hd"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({ "image_url": "/outputs/broken.png" })),
                )
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/outputs/broken.png"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_raw(b"not an image".to_vec(), "text/plain"),
                )
                .mount(&server)
                .await;
        });
        let store = BlobStore::new();
        let generator = generator(&server.uri(), &store)?;
        let user = store.import_bytes("me.png", png_bytes(1))?;
        let product = store.import_bytes("shirt.png", png_bytes(2))?;
        let (job, _cancel) = TryOnJob::new(&user, &product);
        let err = generator
            .generate(&job)
            .err()
            .unwrap_or_else(ServiceFailure::lost);
        assert_eq!(err.status(), Some(200));
        assert!(err.message().starts_with("Virtual try-on failed."));
        assert_eq!(store.live_count(), 2);
        Ok(())
    }
}
