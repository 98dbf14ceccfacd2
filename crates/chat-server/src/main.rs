use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chat_runtime::{
    FileSessionLog, LogRecord, MockEngine, SessionController, SessionLog, TeeSessionLog,
    TracingSessionLog, MAX_LENGTH,
};
use chat_server::{run_server, AppState, ServerConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Conversational generation server.
#[derive(Parser)]
#[command(name = "chat-server")]
struct Cli {
    /// Address to listen on.
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short = 'P', long, default_value_t = 5178)]
    port: u16,

    /// Weight quantization level in bits: 4, 8 or 16.
    #[arg(short, long, default_value_t = 4, value_parser = parse_quantize)]
    quantize: u8,

    /// Generation sessions allowed to run at once.
    #[arg(long, default_value_t = 1)]
    max_sessions: usize,

    /// Append session records to this file.
    #[arg(long, default_value = "chatlog.log")]
    log_file: PathBuf,

    /// Do not write a session log file.
    #[arg(long)]
    no_log_file: bool,
}

fn parse_quantize(raw: &str) -> Result<u8, String> {
    match raw.parse::<u8>() {
        Ok(bits @ (4 | 8 | 16)) => Ok(bits),
        _ => Err(format!("expected 4, 8 or 16, got {raw}")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig {
        model_name: format!("mock-chat-int{}", cli.quantize),
        host: cli.host,
        port: cli.port,
        quantize: cli.quantize,
        max_length: MAX_LENGTH,
        max_concurrent_sessions: cli.max_sessions,
        log_file: (!cli.no_log_file).then_some(cli.log_file),
    };

    let mut log = TeeSessionLog::new().with(Arc::new(TracingSessionLog));
    if let Some(path) = &config.log_file {
        log = log.with(Arc::new(FileSessionLog::open(path, "ChatGLM")?));
    }
    let log = Arc::new(log);
    log.record(&LogRecord::System(format!(
        "Configs = {}",
        serde_json::to_string(&config)?
    )));

    // Loading real weights is left to a backend crate; the mock keeps the
    // HTTP surface usable without one.
    let engine = Arc::new(MockEngine::new());
    let controller = SessionController::new(engine)
        .with_max_sessions(config.max_concurrent_sessions)
        .with_log(log);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting server on {}", addr);

    let state = AppState {
        controller: Arc::new(controller),
        config,
    };
    run_server(state, addr).await?;
    Ok(())
}
