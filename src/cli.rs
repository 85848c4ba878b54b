use crate::error::NovaError;
use crate::options::{ExtractionMode, LearningMode, Options};
use crate::stream::TurnParser;
use clap::{Parser, ValueEnum};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Prose,
    JsonBlocks,
    JsonDocument,
    Tags,
}

impl From<ModeArg> for ExtractionMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Prose => ExtractionMode::Prose,
            ModeArg::JsonBlocks => ExtractionMode::JsonBlocks,
            ModeArg::JsonDocument => ExtractionMode::JsonDocument,
            ModeArg::Tags => ExtractionMode::Tags,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LearningArg {
    Socratic,
    Direct,
    Review,
    FinalAnswer,
}

impl From<LearningArg> for LearningMode {
    fn from(m: LearningArg) -> Self {
        match m {
            LearningArg::Socratic => LearningMode::SolveSocratic,
            LearningArg::Direct => LearningMode::SolveDirect,
            LearningArg::Review => LearningMode::Review,
            LearningArg::FinalAnswer => LearningMode::SolveFinalAnswer,
        }
    }
}

/// Replay a recorded model response through the streaming parser.
#[derive(Parser, Debug)]
#[command(name = "nova-replay", version, about, long_about = None)]
pub struct Args {
    /// Recorded response. Reads stdin when omitted.
    pub input: Option<PathBuf>,

    /// Write output to FILE instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Options as JSON (same field names as the library `Options`).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Extraction strategy. Overrides --learning-mode and the config file.
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Pick the strategy the tutor uses for a learning mode.
    #[arg(long, value_enum)]
    pub learning_mode: Option<LearningArg>,

    /// Bytes per simulated chunk. Chunks may split characters, tags and delimiters.
    #[arg(long, default_value_t = 16)]
    pub chunk_size: usize,

    /// Block separator for json-blocks mode.
    #[arg(long)]
    pub delimiter: Option<String>,

    /// Do not prefer fenced code blocks as JSON candidates.
    #[arg(long)]
    pub no_fence: bool,

    /// Disable the regex sanitizer.
    #[arg(long)]
    pub no_sanitize: bool,

    /// Pretty-print the final model.
    #[arg(long)]
    pub pretty: bool,

    /// Print every intermediate snapshot as one JSON line, then the final model.
    #[arg(long)]
    pub snapshots: bool,

    /// Print the recovery log to stderr.
    #[arg(long)]
    pub log: bool,

    /// Increase tracing verbosity (-v, -vv). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Resolve parser options: config file, then learning mode, then flags.
    pub fn options(&self) -> Result<Options, NovaError> {
        let mut opts = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                serde_json::from_str::<Options>(&text)
                    .map_err(|e| NovaError::Config(format!("{}: {}", path.display(), e)))?
            }
            None => Options::default(),
        };
        if let Some(lm) = self.learning_mode {
            opts.mode = LearningMode::from(lm).extraction_mode();
        }
        if let Some(m) = self.mode {
            opts.mode = m.into();
        }
        if let Some(d) = &self.delimiter {
            if d.is_empty() {
                return Err(NovaError::Config("delimiter must not be empty".to_string()));
            }
            opts.delimiter = d.clone();
        }
        if self.no_fence {
            opts.fenced_code_blocks = false;
        }
        if self.no_sanitize {
            opts.sanitize = false;
        }
        if self.log {
            opts.logging = true;
        }
        Ok(opts)
    }
}

pub fn setup_logging(verbose_level: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let filter_str = match verbose_level {
            0 => "warn",
            1 => "info,nova_stream=debug",
            _ => "debug,nova_stream=trace",
        };
        tracing_subscriber::EnvFilter::new(filter_str)
    };
    // stdout carries the model JSON
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Feed `input` through a parser in `chunk_size`-byte pieces and write the
/// result to `out`.
pub fn replay<W: Write>(args: &Args, opts: Options, input: &[u8], out: &mut W) -> Result<(), Box<dyn std::error::Error>> {
    let mut parser = TurnParser::new(opts)?;
    for chunk in input.chunks(args.chunk_size.max(1)) {
        let effects = parser.push_bytes(chunk)?;
        for effect in effects {
            tracing::info!(?effect, "side effect");
        }
        if args.snapshots {
            serde_json::to_writer(&mut *out, parser.model())?;
            out.write_all(b"\n")?;
        }
    }
    parser.finish();
    if args.pretty {
        serde_json::to_writer_pretty(&mut *out, parser.model())?;
    } else {
        serde_json::to_writer(&mut *out, parser.model())?;
    }
    out.write_all(b"\n")?;
    if args.log {
        for entry in parser.log() {
            match &entry.rule {
                Some(rule) => eprintln!(
                    "block {} @{}: {} [{}] {:?}",
                    entry.block, entry.position, entry.message, rule, entry.context
                ),
                None => eprintln!(
                    "block {} @{}: {} {:?}",
                    entry.block, entry.position, entry.message, entry.context
                ),
            }
        }
    }
    Ok(())
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_logging(args.verbose);
    let opts = args.options()?;

    let mut input = Vec::new();
    match &args.input {
        Some(path) => {
            File::open(path)?.read_to_end(&mut input)?;
        }
        None => {
            io::stdin().read_to_end(&mut input)?;
        }
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    replay(&args, opts, &input, &mut out)?;
    out.flush()?;
    Ok(())
}
