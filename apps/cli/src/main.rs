use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use transportvoice_ai_gateway::prelude::*;

/**
 * \brief Operator console for the TransportVoice AI gateway.
 */
#[derive(Parser, Debug)]
#[command(name = "tvai", version, about = "TransportVoice AI provider console")]
struct Cli {
    /** \brief Registry database; overrides TRANSPORTVOICE_DB. */
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /** \brief Manage configured providers. */
    #[command(subcommand)]
    Provider(ProviderCommand),

    /** \brief Check text for harmful content. */
    Moderate {
        #[command(flatten)]
        target: Target,
        /** \brief Texts to moderate; several are checked concurrently. */
        #[arg(required = true)]
        texts: Vec<String>,
    },

    Sentiment {
        #[command(flatten)]
        target: Target,
        text: String,
    },

    /** \brief Summarize comments, one per argument. */
    Summarize {
        #[command(flatten)]
        target: Target,
        #[arg(required = true)]
        comments: Vec<String>,
    },

    Translate {
        #[command(flatten)]
        target: Target,
        #[arg(long = "to")]
        target_language: String,
        text: String,
    },

    Categorize {
        #[command(flatten)]
        target: Target,
        /** \brief Candidate categories, comma separated. */
        #[arg(long, value_delimiter = ',', required = true)]
        categories: Vec<String>,
        text: String,
    },

    /** \brief Turn the usage trail in logs/ on or off. */
    Telemetry {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
}

#[derive(Subcommand, Debug)]
enum ProviderCommand {
    Add {
        #[arg(long)]
        name: String,
        /** \brief openai, anthropic, huggingface or custom. */
        #[arg(long)]
        vendor: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long, default_value_t = false)]
        default: bool,
        #[arg(long, default_value_t = false)]
        visible: bool,
    },
    List,
    Show {
        id: i64,
    },
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        default: Option<bool>,
        #[arg(long)]
        visible: Option<bool>,
    },
    Remove {
        id: i64,
    },
    /** \brief Show or hide a provider for end-user features. */
    Visibility {
        id: i64,
        #[arg(action = clap::ArgAction::Set)]
        visible: bool,
    },
    Default {
        id: i64,
    },
    /** \brief Provider currently answering end-user requests. */
    Active,
    /** \brief Providers offered to end users. */
    Visible,
    /** \brief Send a probe request and report latency. */
    Test {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct Target {
    /** \brief Provider id; defaults to the active frontend provider. */
    #[arg(long)]
    provider: Option<i64>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("encode output failed")?;
    println!("{}", out);
    Ok(())
}

async fn resolve_provider(registry: &ProviderRegistry, target: &Target) -> Result<i64> {
    match target.provider {
        Some(id) => Ok(id),
        None => Ok(registry
            .get_active_frontend_provider()
            .await
            .context("no --provider given and no active provider")?
            .id),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = GatewayConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    let registry = ProviderRegistry::open(&config.db_path)
        .with_context(|| format!("open registry {} failed", config.db_path.display()))?;
    telemetry::set_enabled(registry.telemetry_enabled().await.unwrap_or(false));
    let dispatcher = CapabilityDispatcher::new(registry.clone(), config)
        .context("build http client failed")?;

    match cli.command {
        Commands::Provider(cmd) => run_provider(&registry, &dispatcher, cmd).await?,
        Commands::Moderate { target, texts } => {
            let id = resolve_provider(&registry, &target).await?;
            if let [text] = texts.as_slice() {
                print_json(&dispatcher.moderate_content(text, id).await?)?;
            } else {
                let results: Vec<_> = dispatcher
                    .moderate_batch(&texts, id)
                    .await
                    .into_iter()
                    .map(|r| match r {
                        Ok(v) => serde_json::to_value(v).unwrap_or_default(),
                        Err(e) => serde_json::json!({ "error": e.to_string(), "status": e.status().as_u16() }),
                    })
                    .collect();
                print_json(&results)?;
            }
        }
        Commands::Sentiment { target, text } => {
            let id = resolve_provider(&registry, &target).await?;
            print_json(&dispatcher.analyze_sentiment(&text, id).await?)?;
        }
        Commands::Summarize { target, comments } => {
            let id = resolve_provider(&registry, &target).await?;
            print_json(&dispatcher.summarize_comments(&comments, id).await?)?;
        }
        Commands::Translate {
            target,
            target_language,
            text,
        } => {
            let id = resolve_provider(&registry, &target).await?;
            print_json(&dispatcher.translate_text(&text, &target_language, id).await?)?;
        }
        Commands::Categorize {
            target,
            categories,
            text,
        } => {
            let id = resolve_provider(&registry, &target).await?;
            print_json(&dispatcher.categorize_comment(&text, &categories, id).await?)?;
        }
        Commands::Telemetry { state } => {
            let enabled = state == "on";
            registry
                .set_telemetry_enabled(enabled)
                .await
                .context("save telemetry flag failed")?;
            telemetry::set_enabled(enabled);
            telemetry::log_event("cli", &format!("telemetry switched {}", state));
            println!("telemetry {}", state);
        }
    }

    Ok(())
}

async fn run_provider(
    registry: &ProviderRegistry,
    dispatcher: &CapabilityDispatcher,
    cmd: ProviderCommand,
) -> Result<()> {
    match cmd {
        ProviderCommand::Add {
            name,
            vendor,
            model,
            api_key,
            base_url,
            default,
            visible,
        } => {
            let created = registry
                .create_provider(NewProvider {
                    name,
                    vendor,
                    model,
                    api_key,
                    base_url,
                    is_default: default,
                    is_visible_to_frontend: visible,
                })
                .await
                .context("add provider failed")?;
            print_json(&created)?;
        }
        ProviderCommand::List => print_json(&registry.get_all_providers().await?)?,
        ProviderCommand::Show { id } => print_json(&registry.get_provider_config(id).await?)?,
        ProviderCommand::Update {
            id,
            name,
            model,
            api_key,
            base_url,
            default,
            visible,
        } => {
            let updated = registry
                .update_provider(
                    id,
                    ProviderUpdate {
                        name,
                        model,
                        api_key,
                        base_url,
                        is_default: default,
                        is_visible_to_frontend: visible,
                    },
                )
                .await
                .context("update provider failed")?;
            print_json(&updated)?;
        }
        ProviderCommand::Remove { id } => {
            registry.delete_provider(id).await?;
            println!("removed provider {}", id);
        }
        ProviderCommand::Visibility { id, visible } => {
            print_json(&registry.update_frontend_visibility(id, visible).await?)?
        }
        ProviderCommand::Default { id } => {
            print_json(&registry.set_default_provider(id).await?)?
        }
        ProviderCommand::Active => print_json(&registry.get_active_frontend_provider().await?)?,
        ProviderCommand::Visible => {
            print_json(&registry.get_frontend_visible_providers().await?)?
        }
        ProviderCommand::Test { id } => print_json(&dispatcher.test_provider(id).await?)?,
    }
    Ok(())
}
