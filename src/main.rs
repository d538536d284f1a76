use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ai_interviewer::config::{InterviewerConfig, LlmConfig, ServerConfig};
use ai_interviewer::interview::{
    AppState, Conductor, InMemorySessionStore, SessionStore, interview_routes, spawn_sweep_task,
};
use ai_interviewer::llm::{CompletionProxy, create_provider};
use ai_interviewer::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let server_config = ServerConfig::from_env()?;

    // Keep the appender guard alive for the life of the process.
    let _log_guard = init_tracing(&server_config);

    let llm_config = LlmConfig::from_env().context("OPENAI_API_KEY must be set")?;

    eprintln!("AI Interviewer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.chat_model);
    eprintln!("   API: http://0.0.0.0:{}/api", server_config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&server_config.db_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open database at {}",
                    server_config.db_path.display()
                )
            })?,
    );
    eprintln!("   Database: {}", server_config.db_path.display());

    // ── Completion proxy ────────────────────────────────────────────────
    let llm = create_provider(&llm_config).context("Failed to create LLM provider")?;
    let proxy = Arc::new(
        CompletionProxy::new(llm).with_limits(llm_config.temperature, llm_config.max_tokens),
    );

    // ── Sessions ────────────────────────────────────────────────────────
    let sessions: Arc<dyn SessionStore> = InMemorySessionStore::with_ttl(server_config.session_ttl);
    let _sweep_handle = spawn_sweep_task(Arc::clone(&sessions), server_config.sweep_interval);

    let conductor = Arc::new(Conductor::new(
        Arc::clone(&db),
        sessions,
        proxy,
        InterviewerConfig::default(),
    ));

    let app = interview_routes(AppState { db, conductor });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", server_config.port))?;
    tracing::info!(port = server_config.port, "Interview API server started");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Log to stderr, plus a daily rolling file when a log directory is set.
fn init_tracing(config: &ServerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ai-interviewer.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter()).with(stderr).init();
            None
        }
    }
}
