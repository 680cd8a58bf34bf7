use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mealworm_monitor::analysis::command::CommandAnalyzer;
use mealworm_monitor::analysis::worker::{spawn_worker, AnalysisQueue};
use mealworm_monitor::client::analysis::AnalysisPage;
use mealworm_monitor::client::session::delete_video;
use mealworm_monitor::client::{ApiClient, Page, Session, TerminalUi};
use mealworm_monitor::config::{CliArgs, Command, ServeArgs, ServerConfig};
use mealworm_monitor::db::VideoDb;
use mealworm_monitor::model::VideoStatus;
use mealworm_monitor::server;
use mealworm_monitor::settings::{load_settings, settings_path};
use mealworm_monitor::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    match args.command {
        Command::Serve(serve) => {
            let _guard = init_server_tracing(&serve);
            run_server(serve).await
        }
        command => {
            init_client_tracing();
            run_client(args.server, command).await
        }
    }
}

/// Console output plus an optional daily-rolling file. The returned guard
/// flushes the file writer and must live until exit.
fn init_server_tracing(args: &ServeArgs) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mealworm_monitor=info,tower_http=info".into());

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mealworm-monitor.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    guard
}

/// Diagnostics go to stderr so rendered pages stay clean.
fn init_client_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mealworm_monitor=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    info!("Starting mealworm-monitor v{}", env!("CARGO_PKG_VERSION"));
    let config = ServerConfig::from_args(args);
    info!("Data dir: {:?}", config.data_dir);

    tokio::fs::create_dir_all(config.uploads_dir()).await?;
    tokio::fs::create_dir_all(config.keyframes_dir()).await?;

    let db = Arc::new(VideoDb::open(&config.database_path())?);
    let reset = db.reset_interrupted()?;
    if reset > 0 {
        warn!("Reset {} interrupted analyses to uploaded", reset);
    }

    let queue = match &config.analyzer_cmd {
        Some(program) => {
            info!("Analyzer: {:?} {:?}", program, config.analyzer_args);
            let analyzer = CommandAnalyzer::new(
                program.clone(),
                config.analyzer_args.clone(),
                Duration::from_secs(config.analysis_timeout_secs),
            );
            let (queue, _worker) =
                spawn_worker(db.clone(), Arc::new(analyzer), config.keyframes_dir());
            requeue_pending(db.clone(), queue.clone());
            queue
        }
        None => {
            warn!("No --analyzer-cmd configured; uploads will stay queued");
            AnalysisQueue::disabled()
        }
    };

    let port = config.port;
    let state = Arc::new(AppState::new(config, db, queue));
    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down");
    Ok(())
}

/// Re-enqueue everything still waiting from a previous run, oldest first.
fn requeue_pending(db: Arc<VideoDb>, queue: AnalysisQueue) {
    tokio::spawn(async move {
        let ids = match db.ids_with_status(&VideoStatus::Uploaded) {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to list pending videos: {:#}", e);
                return;
            }
        };
        if !ids.is_empty() {
            info!("Re-queueing {} pending videos", ids.len());
        }
        for id in ids {
            if let Err(e) = queue.enqueue_wait(&id).await {
                error!("Failed to re-queue {}: {}", id, e);
                return;
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

async fn run_client(server_flag: Option<String>, command: Command) -> anyhow::Result<()> {
    let path = settings_path();
    let settings = load_settings(&path);
    let api = ApiClient::new(&settings.server_url(server_flag.as_deref()))?;

    let (start, once, upload) = match command {
        Command::Serve(_) => anyhow::bail!("serve is not a client command"),
        Command::Dashboard { once } => (Page::Dashboard, once, None),
        Command::Upload {
            file,
            farm_id,
            once,
        } => (Page::Upload, once, Some((file, farm_id))),
        Command::Show { video_id, once } => {
            let Some(page) = AnalysisPage::resolve(video_id.as_deref()) else {
                return Ok(());
            };
            (Page::Analysis(page.video_id().to_string()), once, None)
        }
        Command::Delete { video_id, yes } => {
            let mut ui = TerminalUi::new();
            if !delete_video(&api, &mut ui, &video_id, yes).await {
                std::process::exit(1);
            }
            return Ok(());
        }
    };

    let mut session = Session::new(api, TerminalUi::new(), settings)
        .persist_to(path)
        .once(once);
    if let Some((file, farm_id)) = upload {
        session = session.with_upload(file, farm_id);
    }
    session.run(start).await;
    Ok(())
}
