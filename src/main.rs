use anyhow::{Context, Result};
use clap::{Args, Parser};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info};

use therapist_eval::{
    chat,
    config::Secrets,
    constants,
    llm_interaction::{LlmClient, LlmSettings},
    session::ParticipantId,
    storage::{GcsBucket, LocalDirSink, UploadSink},
    styles::{self, STYLES},
    therapist::{ReplyMode, Therapist},
    web_server::{self, AppState},
};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the evaluation web server.
    Start {
        #[arg(long, env = "PORT", default_value_t = 8501, help = "Port for the web server.")]
        port: u16,
        #[arg(long, env = "TEMPLATES_DIR", default_value = "templates", help = "Directory of page templates.")]
        templates_dir: PathBuf,
        #[arg(long, env = "STATIC_DIR", default_value = "static", help = "Directory of static assets.")]
        static_dir: PathBuf,
        #[command(flatten)]
        settings: Settings,
    },
    /// Chat with the therapist in the terminal.
    Chat {
        #[arg(long, help = "Participant ID used in the uploaded file name.")]
        participant: String,
        #[command(flatten)]
        settings: Settings,
    },
    /// List the communication style presets.
    Styles,
}

/// Settings shared by every command that talks to the model.
#[derive(Args, Debug)]
struct Settings {
    #[arg(long, env = "STYLE_ID", default_value_t = 0, value_parser = styles::parse_style_index, help = "Index of the communication style preset.")]
    style: usize,
    #[arg(long, env = "MIN_TURNS", default_value_t = constants::DEFAULT_MIN_TURNS, help = "Completed turns before the transcript is saved.")]
    min_turns: usize,
    #[arg(long, value_enum, env = "REPLY_MODE", default_value_t = ReplyMode::Adapted, help = "Show the style-adapted or the unadapted reply.")]
    reply_mode: ReplyMode,
    #[arg(long, env = "CHAT_MODEL", default_value = constants::CHAT_MODEL)]
    model: String,
    #[arg(long, env = "TEMPERATURE", default_value_t = constants::DEFAULT_TEMPERATURE)]
    temperature: f32,
    #[arg(long, env = "OPENAI_BASE_URL", default_value = constants::OPENAI_BASE_URL)]
    base_url: String,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, help = "API key; falls back to the secrets file.")]
    api_key: Option<String>,
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = constants::DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,
    #[arg(long, env = "SECRETS_PATH", default_value = ".streamlit/secrets.toml", help = "TOML file holding the API key and storage credentials.")]
    secrets: PathBuf,
    #[arg(long, env = "GCS_BUCKET", default_value = constants::GCS_BUCKET)]
    bucket: String,
    #[arg(long, env = "OUTPUT_DIR", help = "Write CSV files to this directory instead of the bucket.")]
    output_dir: Option<PathBuf>,
}

impl Settings {
    fn therapist(&self, secrets: &Secrets) -> Result<Therapist> {
        let api_key = self
            .api_key
            .clone()
            .or_else(|| secrets.openai_api_key.clone())
            .context("No API key: set OPENAI_API_KEY or add it to the secrets file")?;
        let llm = LlmClient::new(LlmSettings {
            base_url: self.base_url.clone(),
            api_key,
            model: self.model.clone(),
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs),
        })?;
        let style = styles::by_index(self.style)
            .with_context(|| format!("No style preset at index {}", self.style))?;
        info!(
            "Using model {} with style '{}' ({:?} replies)",
            llm.model(),
            style.name,
            self.reply_mode
        );
        Ok(Therapist::new(llm, style, self.reply_mode))
    }

    fn sink(&self, secrets: &Secrets) -> Result<Arc<dyn UploadSink>> {
        let sink: Arc<dyn UploadSink> = match (&self.output_dir, &secrets.gcs) {
            (Some(dir), _) => Arc::new(LocalDirSink::new(dir)),
            (None, Some(account)) => {
                let http = reqwest::Client::builder()
                    .timeout(Duration::from_secs(self.timeout_secs))
                    .build()
                    .context("Failed to build HTTP client for storage")?;
                Arc::new(GcsBucket::new(http, self.bucket.clone(), account.clone()))
            }
            (None, None) => anyhow::bail!(
                "No upload target: add a [gcs] section to {} or pass --output-dir",
                self.secrets.display()
            ),
        };
        info!("Uploads go to {}", sink.describe());
        Ok(sink)
    }
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,therapist_eval=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            port,
            templates_dir,
            static_dir,
            settings,
        } => {
            info!("Starting evaluation server on port {}...", port);
            let secrets = Secrets::load(&settings.secrets)?;
            let therapist = settings.therapist(&secrets)?;
            let sink = settings.sink(&secrets)?;
            let state = AppState::new(therapist, sink, settings.min_turns, templates_dir);

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, state, static_dir).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down...");
                    web_server_handle.abort();
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }
            info!("Shutdown complete.");
        }
        Commands::Chat {
            participant,
            settings,
        } => {
            let participant = ParticipantId::parse(&participant)?;
            let secrets = Secrets::load(&settings.secrets)?;
            let therapist = settings.therapist(&secrets)?;
            let sink = settings.sink(&secrets)?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            chat::run_terminal_chat(
                &therapist,
                sink.as_ref(),
                &participant,
                settings.min_turns,
                stdin,
                std::io::stdout(),
            )
            .await
            .context("Chat session failed")?;
        }
        Commands::Styles => {
            for (index, style) in STYLES.iter().enumerate() {
                println!("{}: {}\n   {}\n", index, style.name, style.definition);
            }
        }
    }

    Ok(())
}
