use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tabi_agents::{build_pipeline, CacheReport, Capabilities, Pipeline, PipelineSettings};
use tabi_core::{ChatInput, GeoPoint, LangCode};
use tabi_observability::{init_tracing, AppMetrics, MetricsSnapshot};
use tabi_storage::{CompanyDirectory, Store};

#[derive(Debug, Parser)]
#[command(name = "tabi")]
#[command(about = "Multilingual ryokan concierge CLI")]
struct Cli {
    /// FAQ corpus directory.
    #[arg(long, env = "TABI_FAQ_DIR")]
    faq_dir: Option<PathBuf>,

    /// Company database; in-memory when unset.
    #[arg(long, env = "TABI_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive guest chat for one company.
    Chat {
        #[arg(long, default_value = "demo-company")]
        company: String,
        #[arg(long)]
        location: Option<String>,
        /// "lat,lng"
        #[arg(long)]
        gps: Option<String>,
    },
    Detect {
        text: String,
    },
    Translate {
        text: String,
        #[arg(long, default_value = "ja")]
        to: String,
        #[arg(long)]
        from: Option<String>,
    },
    Classify {
        text: String,
        #[arg(long, default_value_t = 0.0)]
        faq_confidence: f32,
    },
    Locate {
        #[arg(long, default_value = "demo-company")]
        company: String,
        #[arg(long)]
        input: Option<String>,
        #[arg(long)]
        gps: Option<String>,
    },
    /// Capabilities, cache and counter snapshot.
    Stats,
}

#[derive(Serialize)]
struct StatsReport<'a> {
    capabilities: &'a Capabilities,
    caches: CacheReport,
    metrics: MetricsSnapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("tabi_cli");
    let cli = Cli::parse();

    let mut settings = PipelineSettings::from_env();
    if let Some(dir) = cli.faq_dir.clone() {
        settings.faq_dir = Some(dir);
    }

    let directory = load_directory(cli.database_url.as_deref()).await?;

    // the pipeline talks to services through blocking clients
    tokio::task::spawn_blocking(move || {
        let pipeline = build_pipeline(&settings, Arc::new(directory), AppMetrics::shared())?;
        run(pipeline, cli.command)
    })
    .await
    .context("cli worker panicked")?
}

async fn load_directory(database_url: Option<&str>) -> Result<CompanyDirectory> {
    let store = match database_url {
        Some(url) => Store::sqlite(url).await?,
        None => Store::memory(),
    };

    let directory = CompanyDirectory::new();
    directory.hydrate(&store).await?;
    Ok(directory)
}

fn run(pipeline: Pipeline, command: Command) -> Result<()> {
    let orchestrator = pipeline.orchestrator.clone();

    match command {
        Command::Chat {
            company,
            location,
            gps,
        } => {
            let gps = parse_gps(gps.as_deref())?;
            run_chat(&pipeline, company, location, gps)?;
        }
        Command::Detect { text } => {
            let result = orchestrator.detector().detect(&text);
            print_json(&serde_json::json!({
                "language": result.language,
                "confidence": result.confidence,
                "method": result.method_label(),
            }))?;
        }
        Command::Translate { text, to, from } => {
            let target = parse_language(&to)?;
            let source = from.as_deref().map(parse_language).transpose()?;
            let outcome = orchestrator.translator().translate_with(
                &tabi_core::TurnContext::new(),
                &text,
                target,
                source,
            );
            print_json(&outcome)?;
        }
        Command::Classify {
            text,
            faq_confidence,
        } => {
            let classification = orchestrator.classifier().classify(&text);
            let route = classification.route(faq_confidence).as_str();
            print_json(&serde_json::json!({
                "classification": classification,
                "route": route,
            }))?;
        }
        Command::Locate {
            company,
            input,
            gps,
        } => {
            let gps = parse_gps(gps.as_deref())?;
            let candidate = orchestrator
                .resolver()
                .resolve(input.as_deref(), gps, &company);
            print_json(&candidate)?;
        }
        Command::Stats => {
            print_json(&StatsReport {
                capabilities: &pipeline.capabilities,
                caches: orchestrator.cache_report(),
                metrics: orchestrator.metrics().snapshot(),
            })?;
        }
    }

    Ok(())
}

fn run_chat(
    pipeline: &Pipeline,
    company_id: String,
    manual_location: Option<String>,
    gps_coords: Option<GeoPoint>,
) -> Result<()> {
    let session_id = format!("cli-{}", uuid::Uuid::new_v4());

    println!("tabi concierge chat ({company_id}). type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        let outcome = pipeline.orchestrator.handle(ChatInput {
            text: message.to_string(),
            company_id: company_id.clone(),
            session_id: Some(session_id.clone()),
            session_previous_language: None,
            manual_location: manual_location.clone(),
            gps_coords,
        });
        let envelope = &outcome.envelope;

        println!("\n{}\n", envelope.answer);
        if !envelope.specialized_links.is_empty() {
            for link in &envelope.specialized_links {
                println!("- {}: {}", link.name, link.url);
            }
            println!();
        }
        println!(
            "[{} {:.2} | {:?} | confidence {:.2}{}]",
            envelope.detected_language,
            outcome.detection.confidence,
            envelope.response_type,
            envelope.confidence,
            if envelope.needs_human_escalation {
                " | staff notified"
            } else {
                ""
            }
        );
        if !outcome.degradations.is_empty() {
            println!("degraded: {:?}", outcome.degradations);
        }
        println!();
    }

    Ok(())
}

fn parse_language(value: &str) -> Result<LangCode> {
    LangCode::parse(value).ok_or_else(|| anyhow!("unsupported language: {value}"))
}

fn parse_gps(value: Option<&str>) -> Result<Option<GeoPoint>> {
    value
        .map(|raw| GeoPoint::parse(raw).ok_or_else(|| anyhow!("invalid --gps value: {raw}")))
        .transpose()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
