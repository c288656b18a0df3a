mod inspect;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use depthfx_core::{
    resolve_quality, select_sampler, BackendPreference, DepthKeyframeSet, QualityOverride,
    RenderConfig, ResolvedConfig,
};
use depthfx_render::{
    detect_backend, effect_by_name, GpuContext, ManualScheduler, MediaSource, OffscreenPresenter,
    Renderer, RendererEvent, StillImageSource, WgpuProbe,
};

#[derive(Parser)]
#[command(
    name = "depthfx",
    version,
    about = "depthfx: depth-driven parallax and rack-focus rendering"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an image with a depth keyframe set to a PNG sequence
    Render {
        /// Source image
        #[arg()]
        image: PathBuf,

        /// Binary depth keyframe file
        #[arg()]
        depth: PathBuf,

        /// Metadata JSON (default: the depth file with a .json extension)
        #[arg(long)]
        meta: Option<PathBuf>,

        /// Output directory for frame_NNNNN.png files
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Effect: rack-focus or parallax
        #[arg(short, long, default_value = "rack-focus")]
        effect: String,

        /// Output frame rate
        #[arg(long, default_value_t = 30.0)]
        fps: f64,

        /// Seconds to render (default: the keyframe duration)
        #[arg(long)]
        duration: Option<f64>,

        /// Output size as WIDTHxHEIGHT (default: the image size)
        #[arg(long)]
        size: Option<String>,

        /// TOML render configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Sweep the focal depth from this value...
        #[arg(long)]
        focus_from: Option<f32>,

        /// ...to this value over the render
        #[arg(long)]
        focus_to: Option<f32>,

        /// Pointer orbit radius for the parallax effect, 0 to 1
        #[arg(long, default_value_t = 1.0)]
        orbit: f32,
    },

    /// Print keyframe metadata and per-frame statistics
    Inspect {
        /// Binary depth keyframe file
        #[arg()]
        depth: PathBuf,

        /// Metadata JSON (default: the depth file with a .json extension)
        #[arg(long)]
        meta: Option<PathBuf>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Negotiate a GPU backend and show the resolved quality tier
    Info {
        /// Backend preference: modern, legacy or auto
        #[arg(long)]
        backend: Option<String>,

        /// TOML render configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Render {
            image,
            depth,
            meta,
            output,
            effect,
            fps,
            duration,
            size,
            config,
            focus_from,
            focus_to,
            orbit,
        } => {
            let options = RenderOptions {
                image,
                meta: meta.unwrap_or_else(|| default_meta_path(&depth)),
                depth,
                output,
                effect,
                fps: positive_value("--fps", fps)?,
                duration: duration
                    .map(|d| positive_value("--duration", d))
                    .transpose()?,
                size: size.as_deref().map(parse_size).transpose()?,
                focus: focus_from.zip(focus_to),
                orbit,
            };
            cmd_render(options, load_config(config.as_deref())?).await
        }
        Commands::Inspect { depth, meta, json } => {
            let meta = meta.unwrap_or_else(|| default_meta_path(&depth));
            cmd_inspect(&depth, &meta, json)
        }
        Commands::Info { backend, config } => {
            let mut resolved = load_config(config.as_deref())?;
            if let Some(backend) = backend {
                resolved.backend = parse_backend(&backend)?;
            }
            cmd_info(resolved).await
        }
    }
}

struct RenderOptions {
    image: PathBuf,
    depth: PathBuf,
    meta: PathBuf,
    output: PathBuf,
    effect: String,
    fps: f64,
    duration: Option<f64>,
    size: Option<(u32, u32)>,
    focus: Option<(f32, f32)>,
    orbit: f32,
}

fn default_meta_path(depth: &Path) -> PathBuf {
    depth.with_extension("json")
}

fn load_config(path: Option<&Path>) -> Result<ResolvedConfig> {
    let overrides = match path {
        Some(path) => RenderConfig::load_from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => RenderConfig::default(),
    };
    ResolvedConfig::resolve(&overrides).context("invalid render configuration")
}

fn parse_size(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .with_context(|| format!("size must look like 1280x720, got '{s}'"))?;
    let width: u32 = w.trim().parse().with_context(|| format!("invalid width in '{s}'"))?;
    let height: u32 = h.trim().parse().with_context(|| format!("invalid height in '{s}'"))?;
    if width == 0 || height == 0 {
        anyhow::bail!("size must be non-zero, got '{s}'");
    }
    Ok((width, height))
}

fn positive_value(flag: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        anyhow::bail!("{flag} must be a positive number, got {value}");
    }
    Ok(value)
}

fn parse_backend(s: &str) -> Result<BackendPreference> {
    match s.to_ascii_lowercase().as_str() {
        "modern" => Ok(BackendPreference::Modern),
        "legacy" => Ok(BackendPreference::Legacy),
        "auto" => Ok(BackendPreference::Auto),
        other => anyhow::bail!("unknown backend '{other}', expected modern, legacy or auto"),
    }
}

async fn create_gpu(config: &ResolvedConfig) -> Result<GpuContext> {
    let probe = WgpuProbe::new();
    let backend = detect_backend(config.backend, &probe, config.backend_timeout())
        .await
        .context("GPU backend negotiation failed")?;
    GpuContext::new(backend)
        .await
        .context("failed to create GPU context")
}

async fn cmd_render(options: RenderOptions, config: ResolvedConfig) -> Result<()> {
    let start = Instant::now();

    let keyframes = DepthKeyframeSet::load(&options.depth, &options.meta)
        .with_context(|| format!("failed to load depth keyframes: {}", options.depth.display()))?;
    let duration = options.duration.unwrap_or_else(|| keyframes.duration());
    let media = StillImageSource::open(&options.image)
        .with_context(|| format!("failed to load image: {}", options.image.display()))?
        .with_duration(duration);
    let (width, height) = options.size.unwrap_or_else(|| media.size());

    let effect = effect_by_name(&options.effect)
        .with_context(|| format!("unknown effect '{}'", options.effect))?;

    let gpu = create_gpu(&config).await?;
    let mut renderer = Renderer::new(config.clone(), effect).with_event_sink(|event: RendererEvent| {
        match event {
            RendererEvent::Ready { width, height, duration } => {
                tracing::info!(width, height, ?duration, "Media ready");
            }
            RendererEvent::Error { message } => tracing::error!(%message, "Renderer error"),
            RendererEvent::FrameAdvanced { .. } => {}
        }
    });
    renderer.resize(width as f32, height as f32, 1.0)?;
    renderer.initialize(
        gpu,
        Box::new(OffscreenPresenter::new()),
        Box::new(media),
        keyframes.width(),
        keyframes.height(),
    )?;

    let sampler_options = renderer
        .sampler_options()
        .context("renderer did not initialize")?;
    // Offline frames need depth for exactly their own timestamp, which only
    // the in-process sampler guarantees.
    let sampler = select_sampler(keyframes, sampler_options, false).await?;

    let scheduler = ManualScheduler::new();
    renderer.start(sampler, Box::new(scheduler.clone()))?;

    if let Some((from, to)) = options.focus {
        let span = duration.max(f64::EPSILON);
        renderer.set_focus_callback(move |t| {
            let progress = (t / span).clamp(0.0, 1.0) as f32;
            from + (to - from) * progress
        });
    }

    std::fs::create_dir_all(&options.output)
        .with_context(|| format!("failed to create output directory: {}", options.output.display()))?;

    let frame_count = (duration * options.fps).ceil().max(1.0) as u64;
    let orbit = options.orbit.clamp(0.0, 1.0);
    for index in 0..frame_count {
        if scheduler.take_pending().is_none() {
            anyhow::bail!("renderer stopped requesting frames at frame {index}");
        }
        let t = index as f64 / options.fps;
        let phase = std::f64::consts::TAU * t / duration.max(f64::EPSILON);
        renderer.set_pointer(orbit * phase.cos() as f32, orbit * phase.sin() as f32);
        renderer.seek(t);
        renderer.frame()?;

        let pixels = renderer.capture()?;
        let viewport = renderer.viewport().context("renderer lost its GPU resources")?;
        let frame = image::RgbaImage::from_raw(viewport.width, viewport.height, pixels)
            .context("read-back buffer does not match the viewport")?;
        let path = options.output.join(format!("frame_{index:05}.png"));
        frame
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    renderer.dispose();

    println!(
        "Rendered {} frames ({}) to {} in {:.2}s",
        frame_count,
        options.effect,
        options.output.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn cmd_inspect(depth: &Path, meta: &Path, json: bool) -> Result<()> {
    let keyframes = DepthKeyframeSet::load(depth, meta)
        .with_context(|| format!("failed to load depth keyframes: {}", depth.display()))?;
    let report = inspect::inspect(&keyframes);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Depth keyframes: {}", depth.display());
    println!("   Frames:     {}", report.meta.frame_count);
    println!("   Size:       {}x{}", report.meta.width, report.meta.height);
    println!("   Rate:       {} fps (source {} fps)", report.meta.fps, report.meta.source_fps);
    println!("   Duration:   {:.3}s", report.duration);
    println!();
    for frame in &report.frames {
        println!(
            "   #{:<4} min {:>3}  max {:>3}  mean {:>7.2}",
            frame.index, frame.min, frame.max, frame.mean
        );
    }
    Ok(())
}

async fn cmd_info(config: ResolvedConfig) -> Result<()> {
    let gpu = create_gpu(&config).await?;
    let info = gpu.adapter.get_info();
    let quality = resolve_quality(&gpu.capability_signals(1.0), config.quality);

    println!("depthfx {}", env!("CARGO_PKG_VERSION"));
    println!("   Backend:    {} ({:?})", gpu.backend.kind, info.backend);
    println!("   Adapter:    {} ({:?})", info.name, info.device_type);
    println!("   Max texture: {}", gpu.max_texture_dimension());
    println!(
        "   Quality:    {}{}",
        quality.tier,
        if matches!(config.quality, QualityOverride::Auto) { " (auto)" } else { "" }
    );
    println!("   Samples:    {}", quality.sample_count);
    println!("   Divisor:    {}", quality.working_resolution_divisor);
    println!("   Depth max:  {}", quality.depth_max_dimension);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size("64X32").unwrap(), (64, 32));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x10").is_err());
    }

    #[test]
    fn test_render_rates_must_be_positive() {
        assert_eq!(positive_value("--fps", 24.0).unwrap(), 24.0);
        for bad in [0.0, -30.0, f64::NAN, f64::INFINITY] {
            let err = positive_value("--fps", bad).unwrap_err();
            assert!(err.to_string().contains("--fps"), "{bad}");
        }
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend("Legacy").unwrap(), BackendPreference::Legacy);
        assert!(parse_backend("metal").is_err());
    }

    #[test]
    fn test_default_meta_path() {
        assert_eq!(
            default_meta_path(Path::new("clip/depth.bin")),
            PathBuf::from("clip/depth.json")
        );
    }
}
