use anyhow::Context;
use chrono::Utc;
use civic_simplify_core::{
    hash_file, load_schemes, CoreConfig, EligibilityScorer, FormExplainer, Transcriber, UserProfile,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "civic-simplify", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory holding temp/, cache/, knowledge/ and models/.
    #[arg(long, env = "STORAGE_DIR", default_value = "storage")]
    storage_dir: String,

    /// Log filter, e.g. `info` or `civic_simplify_core=debug`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log: String,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, summarize and explain a document.
    Simplify {
        /// PDF, image or text file.
        #[arg(long)]
        file: PathBuf,
        /// Language code for the answer (en, hi, mr, ...).
        #[arg(long, default_value = "en")]
        language: String,
        /// Name shown in the result; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Ask a question about a document.
    Ask {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "en")]
        language: String,
    },
    /// Score government schemes against a citizen profile.
    Eligibility {
        /// JSON file with the profile (camelCase keys).
        #[arg(long)]
        profile: PathBuf,
        /// Scheme list; defaults to <storage>/knowledge/schemes.json.
        #[arg(long)]
        schemes: Option<PathBuf>,
    },
    /// Explain the fields of a scanned form.
    ExplainForm {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "en")]
        language: String,
    },
    /// Transcribe a voice question.
    Transcribe {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "en")]
        language: String,
    },
    /// Print the result-cache key for a file.
    CacheKey {
        #[arg(long)]
        file: PathBuf,
    },
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let storage_dir = cli.storage_dir.clone();
    let config = CoreConfig::from_lookup(|key| match key {
        "STORAGE_DIR" => Some(storage_dir.clone()),
        _ => std::env::var(key).ok(),
    });
    let orchestrator = Arc::new(config.build_orchestrator());

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        storage = %config.storage_dir.display(),
        backends = orchestrator.has_backends(),
        "civic-simplify boot"
    );
    if !orchestrator.has_backends() {
        warn!("no generation backend configured, answers will be produced offline");
    }

    match cli.command {
        Command::Simplify { file, language, name } => {
            let coordinator = config.build_coordinator(orchestrator);
            let name = name.unwrap_or_else(|| display_name(&file));
            let result = coordinator
                .simplify(&file, &name, &language)
                .await
                .with_context(|| format!("failed to simplify {}", file.display()))?;
            print_json(&result)?;
        }
        Command::Ask {
            file,
            question,
            language,
        } => {
            let coordinator = config.build_coordinator(orchestrator);
            let answer = coordinator
                .ask_document(&file, &question, &language)
                .await
                .with_context(|| format!("failed to answer from {}", file.display()))?;
            print_json(&json!({ "question": question, "answer": answer, "language": language }))?;
        }
        Command::Eligibility { profile, schemes } => {
            let raw = std::fs::read_to_string(&profile)
                .with_context(|| format!("cannot read profile {}", profile.display()))?;
            let profile: UserProfile =
                serde_json::from_str(&raw).context("profile is not valid JSON")?;
            let schemes_path =
                schemes.unwrap_or_else(|| config.knowledge_dir().join("schemes.json"));

            let scorer = EligibilityScorer::new(orchestrator, load_schemes(&schemes_path));
            print_json(&scorer.check(&profile).await)?;
        }
        Command::ExplainForm { file, language } => {
            let explanation = FormExplainer::new(orchestrator)
                .explain(&file, &language)
                .await
                .with_context(|| format!("cannot read form {}", file.display()))?;
            print_json(&explanation)?;
        }
        Command::Transcribe { file, language } => {
            let transcript = Transcriber::new(orchestrator)
                .transcribe(&file, &language)
                .await
                .with_context(|| format!("cannot read audio {}", file.display()))?;
            if transcript.is_none() {
                warn!("transcription needs a networked backend");
            }
            print_json(&transcript)?;
        }
        Command::CacheKey { file } => {
            let key = hash_file(&file).with_context(|| format!("cannot hash {}", file.display()))?;
            print_json(&json!({ "file": file.display().to_string(), "key": key }))?;
        }
    }

    Ok(())
}
