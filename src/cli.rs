//! Interactive line-oriented REPL over any `MemoryApi`. Works unmodified
//! against both `MemoryService` (local) and `MemoryRouter` (mesh-routed),
//! since both satisfy the same trait.

use crate::memory::MemoryApi;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP_TEXT: &str = r#"
Agentic Memory System CLI
=========================
Commands:
  ?<query>    Ask a question (uses remember)
              Example: ?what are my meeting preferences?

  /status     Show current graph contents (observations, claims, entities)
  /clear      Clear all data from the graph
  /quit       Exit the CLI
  /help       Show this help message

Anything else is recorded as an observation.
  Example: I prefer morning meetings
"#;

async fn print_status(memory: &dyn MemoryApi) {
    let observations = memory.get_recent_observations(50).await.unwrap_or_default();
    let statements = memory.get_recent_statements(50).await.unwrap_or_default();
    let contradictions = memory.get_unresolved_contradictions().await.unwrap_or_default();
    let concepts = memory.get_concepts().await.unwrap_or_default();

    println!("\n--- Graph Status ---\n");

    println!("Concepts ({}):", concepts.len());
    for c in &concepts {
        let kind_str = if c.kind.is_empty() { String::new() } else { format!(" [{}]", c.kind) };
        let label = if c.name.is_empty() { c.id.chars().take(8).collect() } else { c.name.clone() };
        println!("  - {label}{kind_str}");
    }

    println!("\nObservations ({}):", observations.len());
    for o in &observations {
        println!("  [{}] {}", o.created_at.format("%Y-%m-%dT%H:%M:%S"), o.raw_content);
    }

    println!("\nStatements ({}):", statements.len());
    for s in &statements {
        let neg = if s.negated { "NOT " } else { "" };
        println!(
            "  {} {neg}{} {} (confidence: {}, source: {})",
            s.subject_name, s.predicate, s.object_name, s.confidence, s.source
        );
    }

    if contradictions.is_empty() {
        println!("\nNo unresolved contradictions.");
    } else {
        println!("\nUnresolved Contradictions ({}):", contradictions.len());
        for (s1, s2) in &contradictions {
            println!("  {} {}: '{}' vs '{}'", s1.subject_name, s1.predicate, s1.object_name, s2.object_name);
        }
    }

    println!("\n--- End Status ---\n");
}

/// Run the interactive CLI loop until stdin closes, `/quit`, or Ctrl-C.
pub async fn run_cli(memory: Arc<dyn MemoryApi>, source: &str) {
    println!("{HELP_TEXT}");
    println!("Ready. Type observations or ?queries:\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            result = lines.next_line() => match result {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("cli read error: {e}");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nGoodbye.");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" => {
                println!("Goodbye.");
                break;
            }
            "/help" => println!("{HELP_TEXT}"),
            "/status" => print_status(memory.as_ref()).await,
            "/clear" => match memory.clear().await {
                Ok(()) => println!("Graph cleared.\n"),
                Err(e) => println!("Error: {e}\n"),
            },
            _ if line.starts_with('?') => {
                let query = line[1..].trim();
                if query.is_empty() {
                    println!("Usage: ?<your question>");
                    continue;
                }
                println!("Thinking...");
                match memory.remember(query.to_string()).await {
                    Ok(response) => println!("\n{response}\n"),
                    Err(e) => println!("Error: {e}\n"),
                }
            }
            text => {
                println!("Recording observation...");
                match memory.observe(text.to_string(), source.to_string()).await {
                    Ok(obs_id) => println!("Recorded. (id: {}...)\n", obs_id.chars().take(8).collect::<String>()),
                    Err(e) => println!("Error: {e}\n"),
                }
            }
        }
    }
}
