use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use procwatch_launcher::spawner::command_line;
use procwatch_monitor::supervisor::Supervisor;
use procwatch_shared::logging::{self, LogLevel};
use procwatch_shared::{generate_run_id, Config};

#[derive(Parser)]
#[command(name = "procwatch")]
#[command(about = "Supervise declaratively configured app processes")]
struct Cli {
    /// Path to the app manifest (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log file path for supervisor output
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Supervise only the named app
    #[arg(long)]
    app: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 設定の読み込み（指定が無ければ候補パスから自動検出）
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => match Config::load_auto()? {
            Some((config, path)) => {
                if cli.verbose {
                    println!("📋 Using config: {}", path.display());
                }
                config
            }
            None => bail!("no config file found; pass one with --config"),
        },
    };

    config.apply_env_overrides();
    let verbose = cli.verbose || config.logging.verbose;

    // ログレベルと出力先の設定
    if verbose {
        logging::set_log_level(LogLevel::Debug);
    } else {
        logging::set_log_level(LogLevel::from(config.logging.level.as_str()));
    }

    if let Some(path) = cli.log_file.or_else(|| config.logging.log_file.clone()) {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        let file = std::sync::Mutex::new(file);
        logging::set_log_output(move |line| {
            use std::io::Write;
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{line}");
            }
        });
    }

    // アプリ記述子の検証（欠陥のある記述子は警告して除外）
    let report = config.load_apps()?;
    for (name, error) in &report.rejected {
        eprintln!("⚠️  Skipped invalid app '{name}': {error}");
    }

    let mut apps = report.apps;
    if let Some(app_name) = &cli.app {
        apps.retain(|app| app.name == *app_name);
        if apps.is_empty() {
            bail!("app '{app_name}' not found in config");
        }
    }

    if apps.is_empty() {
        bail!("no valid apps in config");
    }

    println!("🔧 procwatch starting ({}, {} apps)", generate_run_id(), apps.len());
    for app in &apps {
        println!("  • {}: {}", app.name, command_line(app));
    }

    let mut supervisor = Supervisor::new(apps, config.supervisor.clone());
    supervisor.start().await?;
    supervisor.run().await?;

    println!("👋 procwatch finished");
    Ok(())
}
