use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::time::uptime, EnvFilter};

use splash_sequencer::{
    clip::{ClipDescriptor, ConfDirSource},
    config::Config,
    engine::{ClipSequencer, SequenceOutcome},
    error::SplashError,
    hooks::ReadyFile,
    pipeline::{Bus, LaunchPipeline},
    surface::{DisplaySurface, LazyRenderTarget},
};

#[derive(Parser)]
#[command(
    name = "splash-sequencer",
    version,
    about = "Play boot splash clips back-to-back",
    long_about = "Splash-Sequencer plays an ordered list of audio/video clips through one shared output pipeline. Every clip is bounded by a watchdog, so the splash always ends."
)]
struct Cli {
    /// Audio file pipeline template (%s is the file path)
    #[arg(short, long)]
    audio: Option<String>,

    /// Video file pipeline template (%s is the file path)
    #[arg(short, long)]
    video: Option<String>,

    /// Muted tone pipeline template
    #[arg(short, long)]
    silence: Option<String>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of clip files
    #[arg(long)]
    clips_dir: Option<PathBuf>,

    /// Base directory for relative media paths
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Play VIDEO AUDIO DURATION instead of the clip directory (repeatable; "" for none, "s" for silence)
    #[arg(long, num_args = 3, allow_negative_numbers = true, value_names = ["VIDEO", "AUDIO", "DURATION"], action = clap::ArgAction::Append)]
    play: Vec<String>,

    /// Per-clip watchdog ceiling in milliseconds
    #[arg(long)]
    watchdog_ms: Option<u64>,

    /// File written once the first clip is ready
    #[arg(long)]
    ready_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn apply_to(&self, config: &mut Config) {
        if let Some(template) = &self.audio {
            config.templates.audio = template.clone();
        }
        if let Some(template) = &self.video {
            config.templates.video = template.clone();
        }
        if let Some(template) = &self.silence {
            config.templates.silence = template.clone();
        }
        if let Some(dir) = &self.clips_dir {
            config.clips.conf_dir = dir.clone();
        }
        if let Some(dir) = &self.media_dir {
            config.clips.media_dir = dir.clone();
        }
        if let Some(ms) = self.watchdog_ms {
            config.timing.watchdog_ms = ms;
        }
    }

    /// Clips given as `--play` triples, if any
    fn inline_clips(&self) -> Result<Option<Vec<ClipDescriptor>>> {
        if self.play.is_empty() {
            return Ok(None);
        }

        let mut clips = Vec::with_capacity(self.play.len() / 3);
        for triple in self.play.chunks(3) {
            let [video, audio, duration] = triple else {
                bail!("--play takes VIDEO AUDIO DURATION");
            };
            let duration_ms: i64 = duration
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid clip duration: {}", duration))?;
            clips.push(ClipDescriptor::from_fields(
                video,
                audio,
                duration_ms.max(0) as u64,
            ));
        }
        Ok(Some(clips))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(uptime())
        .init();

    info!("Starting Splash-Sequencer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    cli.apply_to(&mut config);
    config.validate()?;
    let inline_clips = cli.inline_clips()?;

    let surface = match DisplaySurface::open(config.render.display.as_deref()) {
        Ok(surface) => surface,
        Err(e) => {
            let e = SplashError::from(e);
            error!("{}", e.user_message());
            return Err(e.into());
        }
    };
    let target = LazyRenderTarget::new(Box::new(surface));

    let bus = Bus::new();
    let pipeline = LaunchPipeline::new(config.templates.clone(), bus.sender());
    let mut sequencer = ClipSequencer::new(pipeline, bus, &config.timing, target)
        .with_cover_color(config.render.cover_color);
    if let Some(path) = &cli.ready_file {
        sequencer = sequencer.with_ready_hook(ReadyFile::new(path));
    }

    let outcome = match inline_clips {
        Some(clips) => {
            info!("Playing {} clip(s) from the command line", clips.len());
            sequencer.run(clips.into_iter()).await
        }
        None => {
            info!("Reading clips from {:?}", config.clips.conf_dir);
            let clips = ConfDirSource::open(&config.clips.conf_dir, &config.clips.media_dir);
            sequencer.run(clips).await
        }
    };

    match outcome {
        SequenceOutcome::Completed { clips } => {
            if clips == 0 {
                warn!("No clips were played");
            }
            info!("Splash complete after {} clip(s)", clips);
            Ok(())
        }
        SequenceOutcome::FatalLiveness {
            clip_index,
            subgraph,
        } => {
            error!(
                "Clip {} ({}) exceeded the {} ms watchdog; aborting",
                clip_index + 1,
                subgraph,
                config.timing.watchdog_ms
            );
            std::process::abort();
        }
    }
}
