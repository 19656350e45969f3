//! CLI command implementations.

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};

use codepair::config::Config;
use codepair::execution::{Dispatcher, ExecutionOutcome, Language};
use codepair::models::Session;
use codepair::session::SessionService;

use super::args::{Cli, Commands};

/// Code the demo session writes into the shared buffer before running it.
const DEMO_CODE: &str = "const names = ['Ada', 'Grace'];\nnames.forEach((name) => console.log(`Hello, ${name}!`));\nreturn names.length;\n";

// === Command Execution ===

pub async fn execute(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            file,
            language,
            json,
        } => run_file(&config, &file, language.as_deref(), json).await,
        Commands::Languages => {
            list_languages();
            Ok(())
        }
        Commands::Preload => preload(&config).await,
        Commands::Demo { title, host, guest } => {
            demo(&config, &title, &host, guest.as_deref()).await
        }
    }
}

async fn run_file(config: &Config, file: &Path, language: Option<&str>, json: bool) -> Result<()> {
    let code = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let language = match language {
        Some(language) => language.to_string(),
        None => infer_language(file)?.as_str().to_string(),
    };

    let dispatcher = Dispatcher::from_config(config);
    if let Some(hint) = dispatcher.loading_hint(&language) {
        eprintln!("{hint}");
    }

    let outcome = dispatcher.execute(&code, &language).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if !outcome.output.is_empty() {
        println!("{}", outcome.output);
    }

    match outcome.error {
        Some(e) => bail!(e),
        None => Ok(()),
    }
}

fn infer_language(file: &Path) -> Result<Language> {
    let Some(ext) = file.extension().and_then(|e| e.to_str()) else {
        bail!(
            "Cannot infer the language of {} (no extension); pass --language",
            file.display()
        );
    };
    Language::from_extension(ext)
        .with_context(|| format!("Unknown file extension '.{ext}'; pass --language"))
}

fn list_languages() {
    println!("{:<12} {:<12} {:<8}", "ID", "NAME", "RUNNABLE");
    println!("{}", "-".repeat(34));
    for language in Language::ALL {
        println!(
            "{:<12} {:<12} {:<8}",
            language.as_str(),
            language.display_name(),
            if language.is_runnable() { "yes" } else { "no" },
        );
    }
}

async fn preload(config: &Config) -> Result<()> {
    let dispatcher = Dispatcher::from_config(config);
    let started = Instant::now();
    dispatcher
        .preload_runtime()
        .await
        .context("Failed to load the Python runtime")?;
    println!(
        "Python runtime {} in {} ms",
        dispatcher.runtime_phase(),
        started.elapsed().as_millis()
    );
    Ok(())
}

async fn demo(config: &Config, title: &str, host: &str, guest: Option<&str>) -> Result<()> {
    let service = SessionService::new();
    let dispatcher = Dispatcher::from_config(config);

    let session = service.create_session(title, host).await?;
    println!("Created session {} \"{}\"", session.id, session.title);
    print_snapshot(&session);

    let subscription = service.subscribe(&session.id, print_snapshot);

    let participant = service
        .join_session(&session.id, guest.unwrap_or("Guest"))
        .await?
        .context("Session vanished before the guest could join")?;
    println!("{} joined as {}", participant.name, participant.id);

    service.update_code(&session.id, DEMO_CODE).await;

    let current = service
        .get_session(&session.id)
        .await
        .context("Session vanished before the code could run")?;
    println!("Running shared {} code:", current.language);
    print_outcome(&dispatcher.execute(&current.code, &current.language).await);

    service.leave_session(&session.id, &participant.id).await;
    subscription.unsubscribe();
    Ok(())
}

fn print_snapshot(session: &Session) {
    let names: Vec<String> = session
        .participants
        .iter()
        .map(|p| {
            if p.is_host {
                format!("{} (host)", p.name)
            } else {
                p.name.clone()
            }
        })
        .collect();
    println!(
        "  [{}] {} | {} line(s) of {} | {}",
        session.id,
        session.title,
        session.code.lines().count(),
        session.language,
        names.join(", "),
    );
}

fn print_outcome(outcome: &ExecutionOutcome) {
    for line in outcome.output.lines() {
        println!("  {line}");
    }
    if let Some(e) = &outcome.error {
        println!("  error ({}): {e}", e.kind());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_language() {
        assert_eq!(
            infer_language(Path::new("solution.ts")).unwrap(),
            Language::TypeScript
        );
        assert_eq!(
            infer_language(Path::new("dir/main.py")).unwrap(),
            Language::Python
        );
        assert!(infer_language(Path::new("Makefile")).is_err());
        assert!(infer_language(Path::new("notes.txt")).is_err());
    }
}
