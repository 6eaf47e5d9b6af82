#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use linguabot::chat::ChatTurn;
use linguabot::config::Config;
use linguabot::gateway::{self, AppState};
use linguabot::prompts::PromptCatalog;
use linguabot::sessions::{self, retention, SessionToken, HISTORY_VIEW_PAIR_LIMIT};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// `linguabot` - conversation practice backend for language courses.
#[derive(Parser, Debug)]
#[command(name = "linguabot")]
#[command(version)]
#[command(about = "Language-learning chatbot backend.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (defaults to LINGUABOT_CONFIG_DIR, then ~/.linguabot)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway used by the chatbot frontend
    #[command(long_about = "\
Start the HTTP gateway used by the chatbot frontend.

Bind address defaults to the values in your config file \
(gateway.host / gateway.port).

Examples:
  linguabot gateway                  # use config defaults
  linguabot gateway -p 8080          # listen on port 8080
  linguabot gateway --host 127.0.0.1 # loopback only")]
    Gateway {
        /// Port to listen on (use 0 for random available port); defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Run a single chat turn from the terminal
    #[command(long_about = "\
Run a single chat turn from the terminal.

Uses the same transcript store, prompt catalog and model selection \
as the gateway. Omit --token to start a new conversation; the token \
is printed so the next turn can continue it.

Examples:
  linguabot chat --chatbot Barista -m \"Hola, un café por favor\"
  linguabot chat --token 3f2a... --chatbot Barista --language Spanish -m \"¿Cuánto es?\"")]
    Chat {
        /// Session token to continue (a fresh one is minted when absent)
        #[arg(long)]
        token: Option<String>,

        /// Chatbot title from the prompt catalog
        #[arg(long)]
        chatbot: String,

        /// Conversation language; selects the advanced model for complex languages
        #[arg(long, default_value = "English")]
        language: String,

        /// Student message
        #[arg(short, long)]
        message: String,
    },

    /// Print the recent exchanges of a conversation
    History {
        /// Session token
        token: String,

        /// Maximum number of complete pairs to show
        #[arg(long, default_value_t = HISTORY_VIEW_PAIR_LIMIT)]
        limit: usize,
    },

    /// Delete a conversation transcript
    Clear {
        /// Session token
        token: String,
    },

    /// Delete transcripts older than the retention period
    Cleanup {
        /// Retention in days; defaults to config transcript.retention_days
        #[arg(long)]
        days: Option<u32>,
    },

    /// Show resolved configuration
    Status,

    /// Manage configuration
    #[command(long_about = "\
Manage linguabot configuration.

Use 'schema' to dump the full JSON Schema for the config file, which \
documents every available key, type, and default value.

Examples:
  linguabot config schema              # print JSON Schema to stdout
  linguabot config schema > schema.json")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `linguabot`.

Examples:
  source <(linguabot completions bash)
  linguabot completions zsh > ~/.zfunc/_linguabot")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    // reqwest and lettre both pull rustls; pick the process-wide provider up front.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.as_os_str().is_empty() {
            bail!("--config-dir cannot be empty");
        }
    }

    // Completions and schema stay stdout-only: no config load, no logging.
    match &cli.command {
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout().lock();
            return write_shell_completion(*shell, &mut stdout);
        }
        Commands::Config {
            config_command: ConfigCommands::Schema,
        } => {
            let schema = schemars::schema_for!(Config);
            println!(
                "{}",
                serde_json::to_string_pretty(&schema).context("failed to serialize JSON Schema")?
            );
            return Ok(());
        }
        _ => {}
    }

    // Respects RUST_LOG, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::load_or_init(cli.config_dir.as_deref()).await?;

    match cli.command {
        Commands::Completions { .. } | Commands::Config { .. } => Ok(()),

        Commands::Gateway { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            if port == 0 {
                info!("Starting linguabot gateway on {host} (random port)");
            } else {
                info!("Starting linguabot gateway on {host}:{port}");
            }
            gateway::run_gateway(&host, port, config).await
        }

        Commands::Chat {
            token,
            chatbot,
            language,
            message,
        } => run_chat(&config, token.as_deref(), &chatbot, language, message).await,

        Commands::History { token, limit } => {
            let token = SessionToken::parse(&token)?;
            let store = sessions::create_transcript_store(&config.transcript_dir());
            let raw = store.read_raw(&token).await?;
            let pairs = sessions::build_conversation_pairs(&raw, limit);
            if pairs.is_empty() {
                println!("No conversation history for this token.");
            }
            for pair in pairs {
                println!("You: {}", pair.user);
                println!("Bot: {}", pair.assistant);
                println!();
            }
            Ok(())
        }

        Commands::Clear { token } => {
            let token = SessionToken::parse(&token)?;
            let store = sessions::create_transcript_store(&config.transcript_dir());
            let _guard = store.lock(&token).await;
            store.clear(&token).await?;
            println!("Conversation history cleared");
            Ok(())
        }

        Commands::Cleanup { days } => {
            let days = days.unwrap_or(config.transcript.retention_days);
            let dir = config.transcript_dir();
            let removed = retention::sweep_older_than(&dir, retention::days(days)).await?;
            println!(
                "Removed {removed} transcript(s) older than {days} days from {}",
                dir.display()
            );
            Ok(())
        }

        Commands::Status => {
            print_status(&config).await;
            Ok(())
        }
    }
}

async fn run_chat(
    config: &Config,
    token: Option<&str>,
    chatbot: &str,
    language: String,
    message: String,
) -> Result<()> {
    let state = AppState::from_config(config)?;
    let Some(prompt) = state.prompts.get(chatbot).await else {
        bail!(
            "Chatbot '{chatbot}' not found in {}",
            state.prompts.path().display()
        );
    };

    tokio::fs::create_dir_all(config.transcript_dir())
        .await
        .context("Failed to create transcript directory")?;

    let turn = ChatTurn::new(token, message, prompt.prompt_text(), Some(language))?;
    let reply = state.chat.respond(turn).await?;

    println!("{}", reply.response);
    println!();
    println!("token:   {}", reply.token.as_str());
    println!("model:   {}", reply.model);
    println!("pairs:   {}", reply.conversation_length);
    if !reply.persisted {
        println!("warning: this exchange was not saved to the transcript");
    }
    Ok(())
}

async fn print_status(config: &Config) {
    let catalog = PromptCatalog::new(config.prompts_path());
    let chatbots = catalog.load().await.len();

    println!("linguabot status");
    println!();
    println!("Version:        {}", env!("CARGO_PKG_VERSION"));
    println!("Config:         {}", config.config_path.display());
    println!();
    println!("Provider:       {}", config.provider.name);
    println!(
        "  API key:      {}",
        if config.provider.api_key.is_some() {
            "set"
        } else {
            "missing"
        }
    );
    println!("  Base model:   {}", config.provider.base_model);
    println!("  Advanced:     {}", config.provider.advanced_model);
    println!(
        "  Complex langs: {}",
        if config.provider.complex_languages.is_empty() {
            "(none)".to_string()
        } else {
            config.provider.complex_languages.join(", ")
        }
    );
    println!();
    println!("Transcripts:    {}", config.transcript_dir().display());
    println!("  Window:       {} exchanges", config.transcript.context_window);
    println!("  Retention:    {} days", config.transcript.retention_days);
    println!(
        "Prompts:        {} ({chatbots} chatbots)",
        config.prompts_path().display()
    );
    println!(
        "Gateway:        {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!(
        "SMTP:           {}",
        config.smtp.server.as_deref().unwrap_or("(disabled)")
    );
    println!("Observability:  {}", config.observability.backend);
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name, writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name, writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name, writer),
        CompletionShell::PowerShell => generate(shells::PowerShell, &mut cmd, bin_name, writer),
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_requires_chatbot_and_message() {
        assert!(Cli::try_parse_from(["linguabot", "chat", "-m", "hola"]).is_err());
        let cli = Cli::try_parse_from(["linguabot", "chat", "--chatbot", "Barista", "-m", "hola"])
            .expect("chat invocation should parse");
        match cli.command {
            Commands::Chat {
                token, language, ..
            } => {
                assert!(token.is_none());
                assert_eq!(language, "English");
            }
            other => panic!("expected chat command, got {other:?}"),
        }
    }

    #[test]
    fn history_limit_defaults_to_view_size() {
        let cli = Cli::try_parse_from(["linguabot", "history", "abc"]).unwrap();
        match cli.command {
            Commands::History { limit, .. } => assert_eq!(limit, HISTORY_VIEW_PAIR_LIMIT),
            other => panic!("expected history command, got {other:?}"),
        }
    }

    #[test]
    fn global_config_dir_flag_parses_after_subcommand() {
        let cli = Cli::try_parse_from(["linguabot", "status", "--config-dir", "/tmp/lb"]).unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/lb")));
    }

    #[test]
    fn completions_cli_parses_supported_shells() {
        for shell in ["bash", "fish", "zsh", "powershell", "elvish"] {
            let cli = Cli::try_parse_from(["linguabot", "completions", shell])
                .expect("completions invocation should parse");
            match cli.command {
                Commands::Completions { .. } => {}
                other => panic!("expected completions command, got {other:?}"),
            }
        }
    }

    #[test]
    fn completion_generation_mentions_binary_name() {
        let mut output = Vec::new();
        write_shell_completion(CompletionShell::Bash, &mut output)
            .expect("completion generation should succeed");
        let script = String::from_utf8(output).expect("completion output should be valid utf-8");
        assert!(script.contains("linguabot"));
    }
}
