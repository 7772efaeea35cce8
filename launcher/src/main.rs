use anyhow::{bail, Context, Result};
use clap::{Arg, Command};

use procwatch_launcher::spawner::{command_line, run_foreground};
use procwatch_shared::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("procwatch-launcher")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run one app from a procwatch manifest in the foreground")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the app manifest (TOML or JSON)")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose output")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("app")
                .help("Name of the app to launch")
                .required(true),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let app_name = matches
        .get_one::<String>("app")
        .context("app name argument is required")?;

    // 設定の読み込み（指定が無ければ候補パスから自動検出）
    let config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path)?,
        None => match Config::load_auto()? {
            Some((config, path)) => {
                if verbose {
                    println!("📋 Using config: {}", path.display());
                }
                config
            }
            None => bail!("no config file found; pass one with --config"),
        },
    };

    let report = config.load_apps()?;
    for (name, error) in &report.rejected {
        eprintln!("⚠️  Skipped invalid app '{name}': {error}");
    }

    let app = report
        .apps
        .iter()
        .find(|app| app.name == *app_name)
        .with_context(|| format!("app '{app_name}' not found in config"))?;

    if verbose {
        println!("🔧 procwatch-launcher starting...");
        println!("📝 Command: {}", command_line(app));
    }

    let status = run_foreground(app).await?;

    if verbose {
        println!("👋 {} finished: {status}", app.name);
    }

    // 子プロセスの終了コードをそのまま伝搬
    std::process::exit(status.code().unwrap_or(1));
}
