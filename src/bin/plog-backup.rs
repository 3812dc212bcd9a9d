use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use plog::{
    backup::{
        default_backup_file_name, export_snapshot, import_snapshot, read_snapshot_file,
        resolve_backup_path, write_snapshot,
    },
    init_db, AppConfig,
};

#[derive(Parser)]
#[command(name = "plog-backup")]
#[command(about = "Export or import plog snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write every post and tag to a JSON file in the backup directory
    Export {
        /// File name, defaults to plog_backup_<timestamp>.json
        file: Option<String>,
    },
    /// Merge a JSON snapshot into the store; posts with existing slugs are skipped
    Import {
        /// Snapshot file, looked up in the backup directory first
        file: PathBuf,
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env()?;
    let pool = init_db(&config.database_url).await?;

    match cli.command {
        Command::Export { file } => {
            let snapshot = export_snapshot(&pool).await?;
            let file_name = file.unwrap_or_else(default_backup_file_name);
            let path = write_snapshot(&snapshot, &config.backup_dir, &file_name)?;
            println!("Exported to {}", path.display());
            println!("  posts: {}", snapshot.posts.len());
            println!("  tags:  {}", snapshot.tags.len());
        }
        Command::Import { file, force } => {
            let path = resolve_backup_path(&config.backup_dir, &file);
            if !path.exists() {
                bail!(
                    "{} does not exist (snapshots can also be placed in {})",
                    path.display(),
                    config.backup_dir.display()
                );
            }
            let snapshot = read_snapshot_file(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            println!("Snapshot {}", path.display());
            println!("  version:     {}", snapshot.version);
            println!("  exported at: {}", snapshot.exported_at);
            println!("  posts: {}", snapshot.posts.len());
            println!("  tags:  {}", snapshot.tags.len());

            if !force && !confirm("Import this snapshot? [y/N] ")? {
                println!("Import cancelled");
                return Ok(());
            }

            let report = import_snapshot(&pool, &snapshot).await?;
            println!(
                "Imported {} records ({} posts, {} tags); skipped {} posts and {} tags",
                report.created(),
                report.created_posts,
                report.created_tags,
                report.skipped_posts,
                report.skipped_tags
            );
            if report.irregular_slugs > 0 {
                println!(
                    "Warning: {} imported slug(s) would be refused by the write form, see the log",
                    report.irregular_slugs
                );
            }
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
