use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fitroom_contracts::error_body::TRYON_FAILED_MESSAGE;
use fitroom_contracts::events::EventWriter;
use fitroom_contracts::service::GarmentCategory;
use fitroom_contracts::sizing::ModelType;
use fitroom_engine::config::TRYON_URL_ENV;
use fitroom_engine::generator::STUB_DELAY;
use fitroom_engine::{
    ApiConfig, BlobStore, FormField, HttpPredictor, HttpTryOnGenerator, PredictionFlow,
    StubGenerator, SubmitOutcome, TryOnGenerator, TryOnPipeline, TryOnSession, TryOnStep,
};

const EXIT_FAILED: i32 = 1;
const EXIT_REJECTED: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "fitroom", version, about = "Size suggestion and virtual try-on client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask the size predictor for a recommendation.
    Suggest(SuggestArgs),
    /// Composite a photo with a product image.
    TryOn(TryOnArgs),
    /// Report predictor health, readiness and model availability.
    Status(StatusArgs),
}

#[derive(Debug, Parser)]
struct SuggestArgs {
    #[arg(long, default_value = "")]
    height: String,
    #[arg(long, default_value = "")]
    weight: String,
    #[arg(long, default_value = "")]
    age: String,
    #[arg(long, default_value_t = ModelType::default().as_str().to_string())]
    model: String,
    #[arg(long, env = "FITROOM_API_URL")]
    api_url: String,
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct TryOnArgs {
    #[arg(long)]
    user: Option<PathBuf>,
    #[arg(long)]
    product: Option<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    /// Use the remote try-on service instead of the local placeholder.
    #[arg(long)]
    remote: bool,
    #[arg(long, env = "FITROOM_TRYON_URL")]
    tryon_url: Option<String>,
    /// Remote pipeline: hd, dc or imagen.
    #[arg(long, default_value = "hd")]
    pipeline: String,
    /// Garment category for the dc pipeline.
    #[arg(long)]
    category: Option<String>,
    #[arg(long, default_value_t = STUB_DELAY.as_millis() as u64)]
    delay_ms: u64,
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct StatusArgs {
    #[arg(long, env = "FITROOM_API_URL")]
    api_url: String,
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("fitroom error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Suggest(args) => run_suggest(args),
        Command::TryOn(args) => run_try_on(args),
        Command::Status(args) => run_status(args),
    }
}

fn event_writer(path: Option<&Path>, flow: &str) -> Option<EventWriter> {
    let session_id = format!("{flow}-{}", std::process::id());
    path.map(|path| EventWriter::new(path, session_id))
}

fn report_dropped_events(events: Option<&EventWriter>, err: &mut impl Write) -> io::Result<()> {
    match events.map(EventWriter::dropped) {
        Some(dropped) if dropped > 0 => {
            writeln!(err, "fitroom warning: {dropped} event(s) could not be written")
        }
        _ => Ok(()),
    }
}

fn run_suggest(args: SuggestArgs) -> Result<i32> {
    let config = ApiConfig::new(&args.api_url)?.with_timeout(Duration::from_secs(args.timeout_secs));
    let predictor = HttpPredictor::new(config)?;
    let events = event_writer(args.events.as_deref(), "suggest");
    let mut flow = PredictionFlow::new(Arc::new(predictor));
    if let Some(events) = events.clone() {
        flow = flow.with_events(events);
    }

    flow.set_field(FormField::Height, args.height);
    flow.set_field(FormField::Weight, args.weight);
    flow.set_field(FormField::Age, args.age);
    flow.set_field(FormField::ModelType, args.model);

    let mut out = io::stdout().lock();
    let mut err = io::stderr().lock();
    let code = render_suggestion(&mut flow, &mut out, &mut err)?;
    flow.close();
    report_dropped_events(events.as_ref(), &mut err)?;
    Ok(code)
}

/// Submits the filled-in form, waits for the answer and renders it.
fn render_suggestion(
    flow: &mut PredictionFlow,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<i32> {
    match flow.submit() {
        Ok(SubmitOutcome::Issued) => {}
        Ok(SubmitOutcome::Ignored) => return Ok(EXIT_FAILED),
        Err(rejection) => {
            writeln!(err, "{rejection}")?;
            return Ok(EXIT_REJECTED);
        }
    }
    if let Some(banner) = flow.view().banner() {
        writeln!(out, "{banner}")?;
    }

    let view = flow.wait();
    match view.result_panel() {
        Some(panel) => {
            for line in panel.lines() {
                writeln!(out, "{line}")?;
            }
            Ok(0)
        }
        None => {
            if let Some(banner) = view.banner() {
                writeln!(err, "{banner}")?;
            }
            Ok(EXIT_FAILED)
        }
    }
}

fn run_try_on(args: TryOnArgs) -> Result<i32> {
    let store = BlobStore::new();
    let category = args
        .category
        .as_deref()
        .map(str::parse::<GarmentCategory>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let generator: Arc<dyn TryOnGenerator> = if args.remote {
        let base = args
            .tryon_url
            .as_deref()
            .with_context(|| format!("--tryon-url or {TRYON_URL_ENV} is required with --remote"))?;
        let pipeline =
            TryOnPipeline::from_parts(&args.pipeline, category).map_err(anyhow::Error::msg)?;
        let config = ApiConfig::new(base)?.with_timeout(Duration::from_secs(args.timeout_secs));
        Arc::new(HttpTryOnGenerator::new(config, store.clone())?.with_pipeline(pipeline))
    } else {
        Arc::new(StubGenerator::new(Duration::from_millis(args.delay_ms)))
    };

    let events = event_writer(args.events.as_deref(), "tryon");
    let mut session = TryOnSession::new(generator);
    if let Some(events) = events.clone() {
        session = session.with_events(events);
    }
    if let Some(path) = args.user.as_deref() {
        session.set_user_image(store.import_path(path)?);
    }
    if let Some(path) = args.product.as_deref() {
        session.set_product_image(store.import_path(path)?);
    }

    let mut out = io::stdout().lock();
    let mut err = io::stderr().lock();
    let code = render_try_on(&mut session, &args.out, &mut out, &mut err)?;
    session.close();
    report_dropped_events(events.as_ref(), &mut err)?;
    Ok(code)
}

/// Runs the wizard from Upload to Result and writes the composite to `dest`.
fn render_try_on(
    session: &mut TryOnSession,
    dest: &Path,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<i32> {
    if let Err(rejection) = session.advance() {
        writeln!(err, "{rejection}")?;
        return Ok(EXIT_REJECTED);
    }
    writeln!(out, "Generating your virtual outfit preview...")?;

    if session.wait() == TryOnStep::Result {
        if let Some(result) = session.result_image() {
            write_result(dest, result.bytes())?;
            writeln!(out, "Your virtual outfit preview is ready: {}", dest.display())?;
            return Ok(0);
        }
    }
    let message = session.error().unwrap_or(TRYON_FAILED_MESSAGE);
    writeln!(err, "⚠ {message}")?;
    Ok(EXIT_FAILED)
}

fn write_result(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("failed writing {}", path.display()))
}

fn run_status(args: StatusArgs) -> Result<i32> {
    let config = ApiConfig::new(&args.api_url)?.with_timeout(Duration::from_secs(args.timeout_secs));
    let predictor = HttpPredictor::new(config)?;

    let health = predictor.health()?;
    println!("health: {}", health.status);
    let ready = predictor.ready()?;
    println!(
        "ready: {}{}",
        ready.ready,
        if ready.detail.is_empty() {
            String::new()
        } else {
            format!(" ({})", ready.detail)
        }
    );
    let models = predictor.models()?;
    if let Some(version) = models.model_version.as_deref() {
        println!("model version: {version}");
    }
    for (name, status) in &models.models {
        let label = name
            .parse::<ModelType>()
            .map(ModelType::label)
            .unwrap_or(name.as_str());
        match status.error.as_deref() {
            Some(error) if !status.ready => println!("  {label}: unavailable ({error})"),
            _ if status.ready => println!("  {label}: ready"),
            _ => println!("  {label}: unavailable"),
        }
    }
    let report = serde_json::json!({
        "healthy": health.is_ok(),
        "ready": ready.ready,
        "available": models.available(),
    });
    println!("{report}");
    Ok(if health.is_ok() && ready.ready { 0 } else { EXIT_FAILED })
}
