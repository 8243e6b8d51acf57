//! CLI command definitions and parsing
use crate::documents::ContentType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "craftrag",
    version,
    author = "neur0map",
    about = "Hybrid retrieval over Minecraft mod conversion knowledge",
    long_about = "craftrag answers questions about porting Java Edition mods to Bedrock. Queries are \
                  expanded with domain and session vocabulary, matched against a document corpus with \
                  hybrid lexical and vector search, re-ranked with session signals, and answered from \
                  the best sources."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/craftrag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "keyword", "fast", "rrf")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question
    Query {
        /// Question text
        query: String,

        /// Session to attach the query to
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Restrict retrieval to these content types (comma separated)
        #[arg(short = 't', long = "content-type", value_delimiter = ',')]
        content_types: Vec<ContentType>,

        /// Project context, e.g. "Forge 1.20.1"
        #[arg(long)]
        project_context: Option<String>,

        /// TOML corpus to search (overrides documents.corpus_path)
        #[arg(long, value_name = "FILE")]
        corpus: Option<PathBuf>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session reading questions from stdin
    Chat {
        /// Session id (defaults to a fresh one)
        #[arg(short, long)]
        session: Option<String>,

        /// Project context, e.g. "Fabric 1.21"
        #[arg(long)]
        project_context: Option<String>,

        /// TOML corpus to search (overrides documents.corpus_path)
        #[arg(long, value_name = "FILE")]
        corpus: Option<PathBuf>,
    },

    /// Show agent configuration, corpus size and capabilities
    Status {
        /// TOML corpus to load (overrides documents.corpus_path)
        #[arg(long, value_name = "FILE")]
        corpus: Option<PathBuf>,

        /// Print status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_args() {
        let cli = Cli::try_parse_from([
            "craftrag",
            "--verbose",
            "query",
            "how to add a block",
            "--content-type",
            "documentation,code",
            "--project-context",
            "Forge 1.20.1",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Query {
                query,
                session,
                content_types,
                project_context,
                json,
                ..
            } => {
                assert_eq!(query, "how to add a block");
                assert_eq!(session, "default");
                assert_eq!(
                    content_types,
                    vec![ContentType::Documentation, ContentType::Code]
                );
                assert_eq!(project_context.as_deref(), Some("Forge 1.20.1"));
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_content_type() {
        assert!(Cli::try_parse_from(["craftrag", "query", "x", "-t", "spreadsheet"]).is_err());
    }
}
