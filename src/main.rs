use anyhow::Context;
use craftrag::agent::{AdvancedRagAgent, AgentState, RagQuery, RagResponse};
use craftrag::cli::{Cli, Commands, ConfigAction};
use craftrag::config::Config;
use craftrag::documents::{ContentType, DocumentStore, InMemoryDocumentStore};
use craftrag::embedding::{EmbeddingGenerator, HashingEmbedder};
use craftrag::error::{CraftRagError, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Query {
            query,
            session,
            content_types,
            project_context,
            corpus,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_query(
                config,
                &query,
                session,
                content_types,
                project_context,
                corpus,
                json,
            )?;
        }
        Commands::Chat {
            session,
            project_context,
            corpus,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_chat(config, session, project_context, corpus)?;
        }
        Commands::Status { corpus, json } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_status(config, corpus, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "craftrag=debug" } else { "craftrag=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| CraftRagError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn cmd_query(
    config: Config,
    query: &str,
    session: String,
    content_types: Vec<ContentType>,
    project_context: Option<String>,
    corpus: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let agent = build_agent(config, corpus)?;

    let mut request = RagQuery::new(query)
        .with_session(session)
        .with_content_types(content_types);
    if let Some(project_context) = project_context {
        request = request.with_project_context(project_context);
    }

    let response = runtime()?.block_on(agent.query(request));

    if json {
        let text = serde_json::to_string_pretty(&response).map_err(|e| CraftRagError::Json {
            source: e,
            context: "Failed to serialize response".to_string(),
        })?;
        println!("{}", text);
    } else {
        print_response(&response);
    }

    Ok(())
}

fn cmd_chat(
    config: Config,
    session: Option<String>,
    project_context: Option<String>,
    corpus: Option<PathBuf>,
) -> Result<()> {
    let agent = build_agent(config, corpus)?;
    let session = session.unwrap_or_else(|| format!("chat-{}", uuid::Uuid::new_v4()));
    let rt = runtime()?;

    println!("craftrag chat (session {})", session);
    println!("Commands: /context, /clear, /quit");

    let stdin = std::io::stdin();
    loop {
        print!("\n> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        let read = stdin.lock().read_line(&mut line).map_err(|e| CraftRagError::Io {
            source: e,
            context: "Failed to read from stdin".to_string(),
        })?;
        if read == 0 {
            break;
        }

        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                agent.clear_session_context(&session);
                println!("Session context cleared");
            }
            "/context" => match agent.get_session_context(&session) {
                Some(context) => {
                    println!("Queries: {}", context.total_queries);
                    println!("Complexity: {}", context.complexity_level.as_str());
                    println!("Topics: {}", context.favorite_topics(5).join(", "));
                }
                None => println!("No context yet"),
            },
            question => {
                let mut request = RagQuery::new(question).with_session(session.clone());
                if let Some(project_context) = &project_context {
                    request = request.with_project_context(project_context.clone());
                }
                let response = rt.block_on(agent.query(request));
                print_response(&response);
            }
        }
    }

    Ok(())
}

fn cmd_status(config: Config, corpus: Option<PathBuf>, json: bool) -> Result<()> {
    let agent = build_agent(config, corpus)?;
    let status = agent.get_agent_status();

    if json {
        let text = serde_json::to_string_pretty(&status).map_err(|e| CraftRagError::Json {
            source: e,
            context: "Failed to serialize status".to_string(),
        })?;
        println!("{}", text);
        return Ok(());
    }

    println!("craftrag Status");
    println!("===============");
    println!("\nVersion: {}", status.version);
    println!("Documents: {}", status.documents_in_store);
    println!(
        "Search: {} ({})",
        status.search_mode, status.ranking_strategy
    );
    println!(
        "Expansion: {} [{}]",
        if status.expansion_enabled { "enabled" } else { "disabled" },
        status.expansion_strategies.join(", ")
    );
    println!(
        "Re-ranking: {} [{}]",
        if status.reranking_enabled { "enabled" } else { "disabled" },
        status.rerankers.join(", ")
    );
    println!(
        "Embeddings: {} ({} dims)",
        status.embedding_model, status.embedding_dimension
    );
    println!("Capabilities: {}", status.capabilities.join(", "));

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let text = toml::to_string_pretty(&config)?;
            println!("{}", text);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CraftRagError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'craftrag config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}

fn build_agent(config: Config, corpus: Option<PathBuf>) -> Result<AdvancedRagAgent> {
    let store: Arc<dyn DocumentStore> = match corpus.or_else(|| config.documents.corpus_path.clone()) {
        Some(path) => {
            let store = InMemoryDocumentStore::from_corpus_file(&path)
                .with_context(|| format!("Failed to load corpus {}", path.display()))?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("No corpus configured; pass --corpus or set documents.corpus_path");
            Arc::new(InMemoryDocumentStore::new())
        }
    };
    let embedder = build_embedder(&config)?;
    let state = Arc::new(AgentState::new(config.session.clone()));

    AdvancedRagAgent::new(config, state, store, embedder)
}

fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingGenerator>> {
    match config.embedding.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.embedding.dimension))),
        #[cfg(feature = "fastembed")]
        "fastembed" => {
            let provider = craftrag::embedding::FastEmbedProvider::new(&config.embedding.model)
                .map_err(|e| CraftRagError::Config(format!("Failed to load embedding model: {}", e)))?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "fastembed"))]
        "fastembed" => Err(CraftRagError::Config(
            "embedding.provider = \"fastembed\" requires building with --features fastembed"
                .to_string(),
        )),
        other => Err(CraftRagError::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

fn print_response(response: &RagResponse) {
    println!("\n{}\n", response.answer);

    if !response.sources.is_empty() {
        println!("Sources:");
        for source in &response.sources {
            println!(
                "  {}. {} [{}] score {:.3}",
                source.rank,
                source.document.source_path,
                source.document.content_type,
                source.final_score
            );
        }
    }

    println!(
        "\nConfidence: {:.2} | {} ms",
        response.confidence, response.processing_time_ms
    );
    if let Some(error) = &response.metadata.error {
        println!("Error: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_corpus_names_the_file() {
        let path = PathBuf::from("/nonexistent/craftrag/corpus.toml");
        match build_agent(Config::default(), Some(path)) {
            Err(CraftRagError::Other(e)) => {
                let message = format!("{:#}", e);
                assert!(message.contains("Failed to load corpus /nonexistent/craftrag/corpus.toml"));
                assert!(message.contains("Failed to read corpus file"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("missing corpus must not load"),
        }
    }
}
