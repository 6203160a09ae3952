//! tfgrpo - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tfgrpo::{
    cli::{Args, Commands, EpisodeScript},
    config::{Config, Credentials},
    doctor::Doctor,
    integration::ExperienceService,
    memory::{Experience, ExperienceStore},
    models::OpenRouterClient,
    rag::{Retriever, SearchParams},
    telemetry::{self, LogFormat, TelemetryStats},
    ScoredExperience,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_logging(args.verbosity().log_level(), LogFormat::from_env());

    let (config, config_path) = load_config(&args)?;

    // Fail before touching any episode if the key is missing.
    let credentials = if args.needs_credential() {
        Some(Credentials::from_env()?)
    } else {
        None
    };

    match &args.command {
        Commands::Pull { query, limit } => pull(&config, query, *limit)?,
        Commands::List { limit } => list(&config, *limit)?,
        Commands::Show { id } => show(&config, id)?,
        Commands::Delete { id } => delete(&config, id).await?,
        Commands::Record { file } => {
            let credentials = credentials.context("record requires a model credential")?;
            record(&config, file, credentials).await?
        }
        Commands::Doctor => run_doctor(config).await,
        Commands::Config => show_config(&config, &config_path)?,
    }

    Ok(())
}

/// Load the config file and apply command-line overrides
fn load_config(args: &Args) -> Result<(Config, PathBuf)> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    if let Some(library) = &args.library {
        config.library.path = library.clone();
    }
    if let Some(model) = &args.model {
        config.model.model = model.clone();
    }
    config.validate()?;

    Ok((config, path))
}

fn open_store(config: &Config) -> Result<Arc<ExperienceStore>> {
    let store = ExperienceStore::open(config.library.path.clone())?;
    Ok(Arc::new(store))
}

fn pull(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let retriever = Retriever::with_params(
        open_store(config)?,
        SearchParams {
            limit: config.retrieval.default_limit,
        },
    );
    let hits = retriever.pull(query, limit)?;

    if hits.is_empty() {
        println!("No experiences match '{}'.", query);
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        print_hit(rank + 1, hit);
    }
    Ok(())
}

fn list(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let recent = store.recent(limit);

    println!(
        "{} ({} of {})",
        "Experiences".bold(),
        recent.len(),
        store.len()
    );
    for experience in &recent {
        println!(
            "  {}  {}  {}",
            experience.id.cyan(),
            experience.updated_at.format("%Y-%m-%d %H:%M"),
            experience.pattern
        );
    }
    Ok(())
}

fn show(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config)?;
    let experience = store
        .get(id)
        .ok_or_else(|| tfgrpo::GrpoError::experience_not_found(id))?;
    print_experience(&experience);
    Ok(())
}

async fn delete(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config)?;
    store.delete(id).await?;
    println!("{} {}", "Deleted".green(), id);
    Ok(())
}

async fn record(config: &Config, file: &Path, credentials: Credentials) -> Result<()> {
    let script = EpisodeScript::load(file)?;

    let model = Arc::new(OpenRouterClient::new(&config.model, credentials)?);
    let service = ExperienceService::open(config, model)?;

    println!("{} {}", "Task:".bold(), script.task);
    println!("{} {}", "Model:".bold(), service.model_name());

    let result = script.replay(&service).await;
    service.shutdown().await?;

    let (episode_id, outcome) = result?;
    let experience_id = outcome.experience_id.as_deref().unwrap_or("-");
    println!(
        "{} {} -> {} {}",
        "Episode".bold(),
        episode_id,
        outcome.action.to_string().green(),
        experience_id.cyan()
    );
    if let Some(experience) = outcome.experience_id.as_deref().and_then(|id| service.store().get(id)) {
        print_experience(&experience);
    }

    print_stats(&service.stats());
    Ok(())
}

async fn run_doctor(config: Config) {
    let doctor = Doctor::new(config);
    let checks = doctor.run_diagnostics().await;
    Doctor::display_results(&checks);

    if !Doctor::overall_status(&checks) {
        std::process::exit(1);
    }
}

fn show_config(config: &Config, path: &Path) -> Result<()> {
    println!("{} {}\n", "Configuration:".bold(), path.display());
    println!("{}", toml::to_string_pretty(config).context("Failed to render configuration")?);

    let credential = match Credentials::from_env() {
        Ok(_) => "set".green(),
        Err(_) => "missing".yellow(),
    };
    println!("{} {}", tfgrpo::config::API_KEY_ENV, credential);
    Ok(())
}

fn print_hit(rank: usize, hit: &ScoredExperience) {
    let keywords: Vec<&str> = hit.keywords.iter().map(String::as_str).collect();
    println!(
        "{}. {} {}",
        rank,
        hit.id.cyan(),
        format!("(score {:.2})", hit.score).dimmed()
    );
    println!("   {} {}", "pattern:".bold(), hit.pattern);
    println!("   {} {}", "insight:".bold(), hit.insight);
    println!("   {} {}", "keywords:".bold(), keywords.join(", "));
}

fn print_experience(experience: &Experience) {
    let keywords: Vec<&str> = experience.keywords.iter().map(String::as_str).collect();
    println!("{}", experience.id.cyan().bold());
    println!("  pattern:  {}", experience.pattern);
    println!("  insight:  {}", experience.insight);
    println!("  keywords: {}", keywords.join(", "));
    println!("  source:   {}", experience.source_episode_id);
    println!("  created:  {}", experience.created_at.to_rfc3339());
    println!("  updated:  {}", experience.updated_at.to_rfc3339());
}

fn print_stats(stats: &TelemetryStats) {
    println!("\n{}", "Session".bold());
    println!(
        "  attempts: {} ({} failed)  retries: {}  commits: {}  rollbacks: {}",
        stats.attempts_logged,
        stats.attempts_failed,
        stats.retry_attempts,
        stats.library_commits,
        stats.library_rollbacks
    );
}
