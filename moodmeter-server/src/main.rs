use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod context;
mod report;
mod server;

#[derive(Parser, Debug, Clone)]
#[command(name = "moodmeter")]
#[command(author, version, about = "MoodMeter - chat sentiment ingestion, classification and trends")]
pub struct Args {
    /// Mode: "server" (ingest JSON lines from stdin) or "report" (print aggregates)
    #[arg(long, default_value = "server")]
    pub mode: String,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://postgres@localhost:5432/moodmeter")]
    pub database_url: String,

    #[arg(long, env = "MOODMETER_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    /// Message store: "postgres" or "memory"
    #[arg(long, env = "MOODMETER_STORE", default_value = "postgres")]
    pub store: String,

    /// Sentiment model: "lexicon" or "http"
    #[arg(long, env = "MOODMETER_CLASSIFIER", default_value = "lexicon")]
    pub classifier: String,

    /// Inference endpoint for the "http" classifier.
    #[arg(long, env = "MOODMETER_MODEL_ENDPOINT")]
    pub model_endpoint: Option<String>,

    #[arg(long, env = "MOODMETER_MODEL_ID", default_value = "cardiffnlp/twitter-xlm-roberta-base-sentiment")]
    pub model_id: String,

    #[arg(long, env = "MOODMETER_MODEL_API_TOKEN", hide_env_values = true)]
    pub model_api_token: Option<String>,

    #[arg(long, env = "MOODMETER_MAX_INPUT_TOKENS", default_value_t = 512)]
    pub max_input_tokens: usize,

    #[arg(long, env = "MOODMETER_CLASSIFY_TIMEOUT_SECS", default_value_t = 30)]
    pub classify_timeout_secs: u64,

    #[arg(long, env = "MOODMETER_BATCH_SIZE", default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, env = "MOODMETER_MAX_BATCH_WAIT_MS", default_value_t = 200)]
    pub max_batch_wait_ms: u64,

    #[arg(long, env = "MOODMETER_POLL_INTERVAL_SECS", default_value_t = 5)]
    pub poll_interval_secs: u64,

    #[arg(long, env = "MOODMETER_RETRY_CEILING", default_value_t = 5)]
    pub retry_ceiling: u32,

    /// Confidence above which a single negative message raises an alert.
    #[arg(long, env = "MOODMETER_NEGATIVE_MESSAGE_THRESHOLD", default_value_t = 0.65)]
    pub negative_message_threshold: f64,

    #[arg(long, default_value = "false")]
    pub no_negative_message_alerts: bool,

    #[arg(long, env = "MOODMETER_BACKLOG_WARN_THRESHOLD", default_value_t = 1000)]
    pub backlog_warn_threshold: i64,

    #[arg(long, env = "MOODMETER_SPIKE_THRESHOLD", default_value_t = 0.5)]
    pub spike_threshold: f64,

    #[arg(long, env = "MOODMETER_SPIKE_MIN_MESSAGES", default_value_t = 5)]
    pub spike_min_messages: u64,

    #[arg(long, env = "MOODMETER_SPIKE_WINDOW_SECS", default_value_t = 3600)]
    pub spike_window_secs: u64,

    #[arg(long, env = "MOODMETER_SPIKE_CHECK_INTERVAL_SECS", default_value_t = 60)]
    pub spike_check_interval_secs: u64,

    /// URL that receives every alert as a JSON POST.
    #[arg(long, env = "MOODMETER_ALERT_WEBHOOK")]
    pub alert_webhook: Option<String>,

    /// In server mode, stop once stdin is exhausted and the backlog is drained.
    #[arg(long, default_value = "false")]
    pub exit_on_eof: bool,

    /// Report mode: chat to report on.
    #[arg(long)]
    pub chat_id: Option<i64>,

    /// Report mode: how far back to look.
    #[arg(long, default_value_t = 24)]
    pub since_hours: i64,

    /// Report mode: "hour", "day" or "week".
    #[arg(long, default_value = "hour")]
    pub granularity: String,
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("moodmeter=info".parse()?);
    let sub = fmt().with_env_filter(filter).with_writer(std::io::stderr).finish();
    tracing::subscriber::set_global_default(sub)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;
    let args = Args::parse();
    info!(
        "MoodMeter starting. mode={}, store={}, classifier={}",
        args.mode, args.store, args.classifier
    );

    match args.mode.as_str() {
        "server" => {
            if let Err(e) = server::run_server(args).await {
                error!("Server error: {:?}", e);
                return Err(e.into());
            }
        }
        "report" => report::run_report(args).await?,
        other => {
            error!("Invalid mode '{}'. Use --mode=server or --mode=report.", other);
            anyhow::bail!("invalid mode '{}'", other);
        }
    }
    info!("Main finished. Goodbye!");
    Ok(())
}
