use anyhow::Result;
use bireal::cli::{Cli, Commands};
use bireal::{evaluate, train};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;

// Dropping the guard flushes the file writer.
static LOG_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

fn flush_file_log() {
    if let Ok(mut guard) = LOG_GUARD.lock() {
        guard.take();
    }
}

fn main() -> ExitCode {
    // 1. Setup File Logging
    let file_appender = tracing_appender::rolling::never("log", "log.txt");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if let Ok(mut slot) = LOG_GUARD.lock() {
        *slot = Some(guard);
    }

    // 2. Setup Console Logging
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    // 3. Combine Subscribers
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer()) // Stdout
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        ) // File
        .init();

    // 4. Setup Panic Hook (the process aborts right after, so flush here)
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(target: "panic", "💥 bireal panicked at {}: {}", location, msg);
        eprintln!("💥 bireal panicked at {}: {}", location, msg);
        flush_file_log();
    }));

    let cli = Cli::parse();
    tracing::info!("🚀 bireal v{}", env!("CARGO_PKG_VERSION"));
    let code = match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    };
    flush_file_log();
    code
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Train(args) => train::run(args),
        Commands::Evaluate(args) => evaluate::run(args),
    }
}
