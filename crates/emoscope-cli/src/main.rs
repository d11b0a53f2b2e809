use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use emoscope_app::app::FinishedAnalysis;
use emoscope_app::{
    AnalysisOutcome, AnalysisSource, App, Config, ModelLoader, ResultImage, ResultsView, Screen, Severity, Surface,
    Toast,
};
use emoscope_hw::{CameraManager, StreamInfo, V4l2Backend};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};

const CAPTURE_ATTEMPTS: usize = 10;

#[derive(Parser)]
#[command(name = "emoscope", about = "Detect the dominant facial expression in a photo or camera frame")]
struct Cli {
    /// V4L2 device to capture from (overrides EMOSCOPE_CAMERA_DEVICE)
    #[arg(long, global = true)]
    device: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an image file
    Analyze {
        path: PathBuf,
        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Capture one camera frame and analyze it
    Capture {
        /// Also write the captured frame as JPEG
        #[arg(long)]
        save: Option<PathBuf>,
        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Line-driven session: camera, snap, upload <PATH>, home, quit
    Interactive,
    /// List V4L2 capture devices
    Devices,
    /// Fetch and verify the model bundles, then report their status
    Models,
}

/// Renders screens and notifications as terminal text.
struct TerminalSurface {
    quiet: bool,
}

impl Surface for TerminalSurface {
    fn show_screen(&mut self, screen: Screen) {
        if self.quiet {
            return;
        }
        match screen {
            Screen::Welcome => println!("[welcome] commands: camera, upload <PATH>, quit"),
            Screen::Camera => println!("[camera] commands: snap, home"),
            Screen::Loading => println!("[loading] analyzing..."),
            Screen::Results => println!("[results] commands: camera, upload <PATH>, home"),
        }
    }

    fn attach_preview(&mut self, stream: &StreamInfo) {
        if !self.quiet {
            println!("  preview: {} {}x{}", stream.device, stream.width, stream.height);
        }
    }

    fn show_results(&mut self, view: &ResultsView) {
        if !self.quiet {
            print_results(view);
        }
    }

    fn show_toast(&mut self, toast: &Toast) {
        match toast.severity {
            Severity::Info => eprintln!("note: {}", toast.message),
            Severity::Error => eprintln!("error: {}", toast.message),
        }
    }

    fn hide_toast(&mut self) {}
}

fn print_results(view: &ResultsView) {
    println!("Analysis #{}", view.session_count);
    match &view.image {
        ResultImage::File { path } => println!("  image: {}", path.display()),
        ResultImage::Snapshot { width, height, .. } => println!("  image: camera snapshot {width}x{height}"),
    }
    println!("  {} {}", view.icon, view.label);
    if !view.tip.is_empty() {
        println!("  {}", view.tip);
    }
    for bar in &view.chart {
        let icon = bar.icon.as_deref().unwrap_or(" ");
        println!(
            "  {icon} {:<10} {:>3}% {}",
            bar.label,
            bar.percent,
            "#".repeat(usize::from(bar.percent / 4))
        );
    }
}

async fn build_app(config: &Config, quiet: bool) -> App<TerminalSurface> {
    let backend = V4l2Backend::new(config.camera_device.clone(), config.warmup_frames);
    let camera = CameraManager::new(Box::new(backend), config.capture, config.capture_policy());
    let mut app = App::new(config, camera, TerminalSurface { quiet });
    app.start(&ModelLoader::new(config)).await;
    app
}

fn finish(outcome: AnalysisOutcome, json: bool) -> Result<ResultsView> {
    let view = match outcome {
        AnalysisOutcome::Rendered(view) => *view,
        AnalysisOutcome::ModelsNotReady => bail!("models are not loaded"),
        AnalysisOutcome::FrameNotReady => bail!("no camera frame was available"),
        AnalysisOutcome::NoFace => bail!("no face detected"),
        AnalysisOutcome::Failed => bail!("analysis failed"),
        AnalysisOutcome::Superseded => bail!("analysis was superseded"),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    }
    Ok(view)
}

async fn analyze(config: &Config, path: &Path, json: bool) -> Result<()> {
    let mut app = build_app(config, json).await;
    let Some(source) = app.open_upload(path).await else {
        bail!("could not read {}", path.display());
    };
    finish(app.analyze(source).await, json)?;
    Ok(())
}

async fn capture(config: &Config, save: Option<&Path>, json: bool) -> Result<()> {
    let mut app = build_app(config, json).await;
    if !app.open_camera().await {
        bail!("camera unavailable");
    }

    let mut outcome = app.analyze(AnalysisSource::Live).await;
    for _ in 1..CAPTURE_ATTEMPTS {
        if outcome != AnalysisOutcome::FrameNotReady {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        outcome = app.analyze(AnalysisSource::Live).await;
    }
    app.stop_camera().await;

    let view = finish(outcome, json)?;
    if let (Some(path), ResultImage::Snapshot { jpeg, .. }) = (save, &view.image) {
        tokio::fs::write(path, jpeg).await?;
        tracing::info!(path = %path.display(), "snapshot saved");
    }
    Ok(())
}

type InFlight = Pin<Box<dyn Future<Output = FinishedAnalysis>>>;

async fn interactive(config: &Config) -> Result<()> {
    let mut app = build_app(config, false).await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight: Option<InFlight> = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(250));

    loop {
        let wait = async {
            match in_flight.as_mut() {
                Some(fut) => fut.await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            finished = wait => {
                in_flight = None;
                app.complete_analysis(finished);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let (command, arg) = match line.trim().split_once(' ') {
                    Some((c, a)) => (c, a.trim()),
                    None => (line.trim(), ""),
                };
                match command {
                    "" => {}
                    "camera" => {
                        app.open_camera().await;
                    }
                    "snap" => {
                        if let Ok(pending) = app.begin_analysis(AnalysisSource::Live).await {
                            in_flight = Some(Box::pin(pending.wait()));
                        }
                    }
                    "upload" if !arg.is_empty() => {
                        if let Some(source) = app.open_upload(Path::new(arg)).await {
                            if let Ok(pending) = app.begin_analysis(source).await {
                                in_flight = Some(Box::pin(pending.wait()));
                            }
                        }
                    }
                    "home" => {
                        app.stop_camera().await;
                        app.show_screen(Screen::Welcome);
                    }
                    "quit" | "exit" => break,
                    other => eprintln!("unknown command: {other}"),
                }
            }
            _ = ticker.tick() => app.tick(Instant::now()),
        }
    }

    app.stop_camera().await;
    Ok(())
}

fn devices() {
    let devices = emoscope_hw::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }
    for dev in devices {
        println!("{}  {} (driver: {}, bus: {})", dev.path, dev.name, dev.driver, dev.bus);
    }
}

async fn models(config: &Config) -> Result<()> {
    let loader = ModelLoader::new(config);
    println!("source: {:?}", loader.source());
    println!("cache:  {}", config.model_dir.display());
    let fetched = loader.fetch().await;
    for (bundle, present) in loader.status() {
        let state = if present { "present" } else { "missing" };
        println!("  {:<22} {:<24} {state}", bundle.name, bundle.filename);
    }
    fetched?;
    println!("bundles available");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(device) = cli.device {
        config.camera_device = device;
    }

    match cli.command {
        Commands::Analyze { path, json } => analyze(&config, &path, json).await?,
        Commands::Capture { save, json } => capture(&config, save.as_deref(), json).await?,
        Commands::Interactive => interactive(&config).await?,
        Commands::Devices => devices(),
        Commands::Models => models(&config).await?,
    }

    Ok(())
}
