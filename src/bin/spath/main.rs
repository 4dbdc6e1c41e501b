//! spath CLI - render the demo scene headlessly and write a PNG.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spath::app::{build_renderers, AppState};
use spath::scene::{demo_scene, Bitmap};
use spath::settings::{BackendKind, Settings};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const BUILD_DATE: &str = env!("SPATH_BUILD_DATE");
const BUILD_TIME: &str = env!("SPATH_BUILD_TIME");

/// Default filter directive per verbosity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    fn directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug)]
struct Options {
    verbosity: Verbosity,
    config: Option<PathBuf>,
    save_config: Option<PathBuf>,
    output: Option<PathBuf>,
    width: Option<usize>,
    height: Option<usize>,
    samples: Option<u32>,
    backends: Option<Vec<BackendKind>>,
    flat: bool,
    keys: String,
}

enum Command {
    Render(Box<Options>),
    Help,
    Version,
}

fn main() {
    let command = match parse_args(env::args().skip(1)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e:#}");
            eprintln!("Run 'spath --help' for usage.");
            std::process::exit(2);
        }
    };

    let opts = match command {
        Command::Help => {
            print_help();
            return;
        }
        Command::Version => {
            println!("spath {VERSION} (built {BUILD_DATE} {BUILD_TIME})");
            return;
        }
        Command::Render(opts) => opts,
    };

    init_logging(opts.verbosity);

    if let Err(e) = run(*opts) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins when set; otherwise the verbosity flag picks the level.
fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    let mut opts = Options {
        verbosity: Verbosity::Info,
        config: None,
        save_config: None,
        output: None,
        width: None,
        height: None,
        samples: None,
        backends: None,
        flat: false,
        keys: String::new(),
    };

    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().with_context(|| format!("{name} needs a value"));
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-V" | "--version" => return Ok(Command::Version),
            "-v" | "--verbose" => opts.verbosity = Verbosity::Debug,
            "-vv" | "--trace" => opts.verbosity = Verbosity::Trace,
            "-q" | "--quiet" => opts.verbosity = Verbosity::Quiet,
            "-c" | "--config" => opts.config = Some(value(arg.as_str())?.into()),
            "--save-config" => opts.save_config = Some(value(arg.as_str())?.into()),
            "-o" | "--output" => opts.output = Some(value(arg.as_str())?.into()),
            "-W" | "--width" => opts.width = Some(value(arg.as_str())?.parse().context("invalid width")?),
            "-H" | "--height" => opts.height = Some(value(arg.as_str())?.parse().context("invalid height")?),
            "-s" | "--samples" => opts.samples = Some(value(arg.as_str())?.parse().context("invalid sample count")?),
            "-b" | "--backend" => {
                let list = value(arg.as_str())?;
                let kinds = list
                    .split(',')
                    .map(|s| s.trim().parse::<BackendKind>())
                    .collect::<Result<Vec<_>, _>>()?;
                opts.backends = Some(kinds);
            }
            "-k" | "--keys" => opts.keys.push_str(&value(arg.as_str())?),
            "--flat" => opts.flat = true,
            other => bail!("unknown argument '{other}'"),
        }
    }

    Ok(Command::Render(Box::new(opts)))
}

fn run(opts: Options) -> anyhow::Result<()> {
    let mut settings = match &opts.config {
        Some(path) => Settings::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Settings::default(),
    };

    // Flags override the settings file
    if let Some(w) = opts.width {
        settings.width = w;
    }
    if let Some(h) = opts.height {
        settings.height = h;
    }
    if let Some(s) = opts.samples {
        settings.samples = s.max(1);
    }
    if let Some(b) = opts.backends.clone() {
        settings.backends = b;
    }
    if let Some(o) = opts.output.clone() {
        settings.output = o;
    }
    if opts.flat {
        settings.path_tracing = false;
    }

    if let Some(path) = &opts.save_config {
        settings.save(path).with_context(|| format!("saving {}", path.display()))?;
        info!("settings written to {}", path.display());
    }

    info!(
        "spath {} - {}x{}, {} samples, backends: {}",
        VERSION,
        settings.width,
        settings.height,
        settings.samples,
        settings
            .backends
            .iter()
            .map(|b| b.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let renderers = build_renderers(&settings).context("backend construction failed")?;
    let mut app = AppState::new(renderers, &settings)?;

    if !opts.keys.is_empty() {
        app.play_keys(&opts.keys);
        if !app.is_running() {
            info!("quit key in script, nothing rendered");
            return Ok(());
        }
    }

    let scene = demo_scene();
    let mut bitmap = Bitmap::default();
    info!("rendering with {}", app.active().describe());
    app.frame(&scene, &mut bitmap)?;

    bitmap.save_png(&settings.output)?;
    info!("wrote {}", settings.output.display());
    Ok(())
}

fn print_help() {
    println!("spath - Monte-Carlo path tracer");
    println!();
    println!("USAGE:");
    println!("    spath [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <file>       Load settings from JSON");
    println!("        --save-config <file>  Write the effective settings to JSON");
    println!("    -o, --output <file>       Output PNG (default render.png)");
    println!("    -W, --width <px>          Image width");
    println!("    -H, --height <px>         Image height");
    println!("    -s, --samples <n>         Samples per pixel");
    println!("    -b, --backend <list>      Comma-separated: cpu, cpu-flat, wgpu, vulkan");
    println!("    -k, --keys <script>       Replay key presses before rendering");
    println!("        --flat                Albedo-only shading");
    println!("    -v, --verbose             Show debug output");
    println!("    -vv, --trace              Show trace output (very verbose)");
    println!("    -q, --quiet               Errors only");
    println!("    -V, --version             Print version and build date");
    println!("    -h, --help                Show this help");
    println!();
    println!("KEYS:");
    println!("    w/s  forward/back   a/d  left/right   f/g  focal +/-");
    println!("    r    next backend   +/-  samples x2 / 2   p  toggle path tracing");
    println!("    q    quit");
    println!();
    println!("EXAMPLES:");
    println!("    spath -W 320 -H 240 -s 64           # CPU render to render.png");
    println!("    spath -b wgpu,cpu -k r -o cpu.png   # switch to the second backend");
    println!("    spath -k wwwff --flat               # move in, zoom, flat shading");
    println!("    RUST_LOG=spath=trace spath          # filter logs by module");
}
