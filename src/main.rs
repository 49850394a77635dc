//! stellar: terminal chat client for Ollama and Cohere.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use stellar::chat::OllamaClient;
use stellar::config::{ChatProvider, Config};
use stellar::message::ConversationId;
use stellar::report::{self, ExportFormat};
use stellar::store::ConversationStore;
use stellar::ui::{self, theme, App};

#[derive(Parser, Debug)]
#[command(name = "stellar", version, about = "Chat with Ollama or Cohere from the terminal")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Chat provider
    #[arg(short, long, global = true, value_enum, ignore_case = true)]
    provider: Option<ChatProvider>,

    /// Model name for the selected provider
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Disable spoken replies
    #[arg(long, global = true)]
    no_voice: bool,

    /// Conversation database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the interactive menu (default)
    Chat,
    /// List recent conversations
    List {
        /// How many to show
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// List models installed on the Ollama host
    Models,
    /// Print a conversation as Markdown or JSON
    Export {
        id: i64,
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Markdown)]
        format: ExportFormat,
    },
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(provider) = self.provider {
            config.chat.provider = provider;
        }
        if let Some(model) = &self.model {
            match config.chat.provider {
                ChatProvider::Ollama => config.chat.model.clone_from(model),
                ChatProvider::Cohere => config.cohere.model.clone_from(model),
            }
        }
        if self.no_voice {
            config.voice.enabled = false;
        }
        if let Some(db) = &self.db {
            config.storage.path = Some(db.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // The chat owns stdout; logs go to stderr and stay quiet unless asked.
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper_util=info,reqwest=info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.as_deref());
    args.apply(&mut config);
    debug!("Chat config: {:?}", config.chat);

    match args.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(config).await,
        Command::List { limit } => {
            let store = ConversationStore::open(config.storage.database_path())?;
            ui::print_recent(&store, limit.unwrap_or(config.display.recent_limit))?;
            Ok(())
        }
        Command::Models => list_models(&config).await,
        Command::Export { id, format } => {
            let store = ConversationStore::open(config.storage.database_path())?;
            println!("{}", report::export(&store, ConversationId(id), format)?);
            Ok(())
        }
    }
}

async fn run_chat(config: Config) -> anyhow::Result<()> {
    let app = App::from_config(config)?;
    info!("stellar starting with {}", app.chat.name());

    let interrupt = app.interrupt.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !interrupt.trigger() {
                theme::restore_terminal();
                eprintln!();
                std::process::exit(130);
            }
        }
    });

    let result = ui::main_menu(&app).await;
    theme::restore_terminal();
    result?;
    Ok(())
}

async fn list_models(config: &Config) -> anyhow::Result<()> {
    let client = OllamaClient::new(&config.chat)?;
    if !client.is_running().await {
        theme::error(&format!("Ollama is not reachable at {}", config.chat.host));
        std::process::exit(1);
    }

    let models = client.list_models().await?;
    if models.is_empty() {
        theme::info("No models installed");
        return Ok(());
    }
    for model in models {
        let size_gb = model.size as f64 / 1_000_000_000.0;
        let details = model
            .details
            .map(|d| format!("{} {}", d.parameter_size, d.quantization_level))
            .unwrap_or_default();
        let marker = if model.name == client.model() { "●" } else { " " };
        println!("{marker} {:<32} {size_gb:>6.1} GB  {}", model.name, theme::dim(&details));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_flag_is_typed_and_case_insensitive() {
        let args =
            Args::try_parse_from(["stellar", "--provider", "Cohere", "-m", "command-r"]).unwrap();
        assert_eq!(args.provider, Some(ChatProvider::Cohere));

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.chat.provider, ChatProvider::Cohere);
        assert_eq!(config.cohere.model, "command-r");
    }

    #[test]
    fn unknown_provider_is_rejected_by_the_parser() {
        assert!(Args::try_parse_from(["stellar", "--provider", "openai"]).is_err());
    }
}
