use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use voxbridge::config::Config;
use voxbridge::protocol::{SampleFormat, Settings, StatusRecord};
use voxbridge::rendezvous::{names, Channel, RendezvousStore};
use voxbridge::sink::TextSink;
use voxbridge::stt::{WhisperEngine, WhisperEngineConfig};
use voxbridge::{consumer, defaults, producer};

#[derive(Parser, Debug)]
#[command(name = "voxbridge", version, about = "On-device streaming speech-to-text bridge")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the rendezvous root directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the model-hosting consumer until interrupted
    Consumer {
        /// Override the model file path
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Drive one producer session from a raw PCM file (16kHz mono s16le)
    Send {
        /// Raw PCM input file
        file: PathBuf,
        /// Chunk size in milliseconds
        #[arg(long, default_value_t = 200)]
        chunk_ms: u32,
    },
    /// Print the consumer's latest status record
    Status,
}

/// Sink that types transcripts onto stdout; the demo stand-in for a real
/// text-insertion surface.
struct StdoutSink;

impl TextSink for StdoutSink {
    fn insert(&self, text: &str) -> voxbridge::error::Result<()> {
        println!("{text}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).context("loading configuration")?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    if let Some(root) = &cli.root {
        config.rendezvous.root = root.clone();
    }
    Ok(config)
}

fn open_store(config: &Config) -> anyhow::Result<RendezvousStore> {
    std::fs::create_dir_all(&config.rendezvous.root)
        .with_context(|| format!("creating {}", config.rendezvous.root.display()))?;
    Ok(RendezvousStore::open(&config.rendezvous.root)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;

    match cli.command {
        Commands::Consumer { model } => runtime.block_on(run_consumer(config, model)),
        Commands::Send { file, chunk_ms } => runtime.block_on(run_send(config, file, chunk_ms)),
        Commands::Status => run_status(config),
    }
}

async fn run_consumer(mut config: Config, model: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(model) = model {
        config.model.path = model;
    }
    let store = open_store(&config)?;

    let engine = match WhisperEngine::new(WhisperEngineConfig {
        model_path: config.model.path.clone(),
        language: config.model.language.clone(),
        threads: config.model.threads,
        use_gpu: config.model.use_gpu,
    }) {
        Ok(engine) => engine,
        Err(e) => {
            // Leave the non-recoverable error for the producer to surface,
            // then refuse to serve sessions.
            consumer::publish_model_load_failure(&store, &e);
            return Err(e).context("loading acoustic model");
        }
    };

    let handle = consumer::start(
        store,
        Box::new(engine),
        consumer::ConsumerOptions {
            memory_limit_mb: config.consumer.memory_limit_mb,
            audit_log_path: config.audit_log_path(),
        },
    )?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    eprintln!("\nShutting down...");
    handle.shutdown().await;
    Ok(())
}

async fn run_send(config: Config, file: PathBuf, chunk_ms: u32) -> anyhow::Result<()> {
    let pcm = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
    let store = open_store(&config)?;
    let mut handle = producer::start(
        store,
        Arc::new(StdoutSink),
        Duration::from_secs(config.producer.timeout_secs),
    )?;

    let settings = Settings {
        chunk_size_ms: chunk_ms.clamp(50, 1000),
        ..Settings::default()
    };
    handle.session.publish_settings(&settings)?;

    if !handle.session.consumer_available() {
        eprintln!("warning: no fresh consumer status; is `voxbridge consumer` running?");
    }

    let session_id = handle.session.begin()?;
    eprintln!("session {session_id}");

    let bytes_per_chunk =
        (settings.chunk_size_ms as usize * defaults::SAMPLE_RATE as usize * 2) / 1000;
    let chunk_secs = settings.chunk_size_ms as f64 / 1000.0;
    for chunk in pcm.chunks(bytes_per_chunk) {
        let duration = chunk.len() as f64 / (defaults::SAMPLE_RATE as f64 * 2.0);
        handle
            .session
            .submit_chunk(chunk.to_vec(), SampleFormat::Pcm16, duration, false)?;
        if handle.session.should_throttle() {
            tokio::time::sleep(Duration::from_millis(settings.chunk_size_ms as u64)).await;
        }
        // Pace publication like a live capture.
        tokio::time::sleep(Duration::from_secs_f64(chunk_secs)).await;

        // Show partials as they stream in.
        while let Ok(event) = handle.events.try_recv() {
            if let producer::ProducerEvent::Partial { text, .. } = &event {
                eprint!("\r… {text}");
            }
            handle.session.on_event(&event);
        }
    }
    handle.session.end()?;

    let outcome = loop {
        let Some(event) = handle.events.recv().await else {
            anyhow::bail!("monitor lane ended unexpectedly");
        };
        handle.session.on_event(&event);
        match event {
            producer::ProducerEvent::Partial { text, .. } => eprint!("\r… {text}"),
            other => break other,
        }
    };
    eprintln!();

    let result = match outcome {
        producer::ProducerEvent::Final { .. } => Ok(()),
        producer::ProducerEvent::TimedOut { .. } => {
            Err(anyhow::anyhow!("timeout - try again"))
        }
        producer::ProducerEvent::Error { description, .. } => {
            Err(anyhow::anyhow!("transcription failed: {description}"))
        }
        producer::ProducerEvent::Partial { .. } => unreachable!(),
    };
    handle.shutdown().await;
    result
}

fn run_status(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let bytes = store
        .read(Channel::Control, names::STATUS)
        .context("no status record; is the consumer running?")?;
    let status = StatusRecord::from_json(std::str::from_utf8(&bytes)?)?;

    let fresh = status.is_fresh(chrono::Utc::now(), defaults::STATUS_STALE_AFTER);
    println!("consumer:        {}", if fresh { "available" } else { "stale" });
    println!("model loaded:    {}", status.model_loaded);
    println!("model variant:   {}", status.model_variant);
    println!("processing:      {}", status.processing);
    println!(
        "current session: {}",
        status.current_session.as_deref().unwrap_or("-")
    );
    println!("memory:          {} MB", status.memory_mb);
    println!("dropped chunks:  {}", status.dropped_chunks);
    println!("last update:     {}", status.last_update.to_rfc3339());
    Ok(())
}
