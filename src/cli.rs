use std::io::{self, IsTerminal, Write};

use anyhow::{Context, Result, bail};
use chrono::DateTime;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{debug, info};

use crate::config::Config;
use crate::defaults::{DefaultSettings, DefaultsStore};
use crate::error::ProviderError;
use crate::loader::Loader;
use crate::model::{CompletionOptions, Message, ModelInfo};
use crate::prompts::{Preset, resolve_system_prompt};
use crate::providers::{Provider, ProviderIdentity, ProviderKind, build_provider};
use crate::repl::run_repl;
use crate::session::{Conversation, Session};

const MISSING_PROMPT: &str = "please provide a prompt or use -i for interactive mode";
const COLUMN_GAP: usize = 3;

#[derive(Debug, Parser)]
#[command(name = "ai-cli")]
#[command(about = "Chat with local Ollama and OpenAI-compatible model servers")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub chat: ChatArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Chat with an Ollama server
    Ollama(ChatArgs),
    /// Chat with an OpenAI-compatible server (LocalAI, vLLM, llama.cpp)
    #[command(name = "openai", alias = "localai")]
    OpenAi(ChatArgs),
    /// List supported providers
    Providers,
    /// Manage the default provider
    Default {
        #[command(subcommand)]
        command: DefaultCommands,
    },
    /// Print the version
    Version,
}

#[derive(Debug, Subcommand)]
pub enum DefaultCommands {
    /// Set the provider used when no provider command is given
    Set {
        /// Provider identifier: ollama, openai or localai
        provider: String,
        /// Provider API URL
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Show the current default provider
    Show,
    /// Clear the default provider
    Clear,
}

#[derive(Debug, Clone, Args)]
pub struct ChatArgs {
    /// Prompt to send, words are joined with spaces
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,

    /// Start an interactive chat session
    #[arg(short, long)]
    pub interactive: bool,

    /// Model to use (default depends on the provider)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sampling temperature
    #[arg(short, long, default_value_t = 0.7)]
    pub temperature: f32,

    /// System prompt, overrides --preset
    #[arg(short, long)]
    pub system: Option<String>,

    /// Built-in system prompt
    #[arg(short, long, value_enum, default_value_t = Preset::Default)]
    pub preset: Preset,

    /// Maximum messages kept in interactive history (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    pub max_history: usize,

    /// List the models served by the provider
    #[arg(short, long)]
    pub list_models: bool,

    /// Provider API URL
    #[arg(short, long)]
    pub url: Option<String>,

    /// Print the reply as it arrives
    #[arg(long)]
    pub stream: bool,
}

pub async fn dispatch(cli: Cli, cfg: &Config) -> Result<()> {
    match cli.command {
        None => {
            let (kind, persisted_url) = persisted_target(cfg)?;
            run_chat(cfg, kind, persisted_url.as_deref(), &cli.chat).await
        }
        Some(Commands::Ollama(args)) => run_chat(cfg, ProviderKind::Ollama, None, &args).await,
        Some(Commands::OpenAi(args)) => run_chat(cfg, ProviderKind::OpenAi, None, &args).await,
        Some(Commands::Providers) => {
            write_providers(&mut io::stdout().lock(), cfg).context("Failed to write to stdout")
        }
        Some(Commands::Default { command }) => run_default(cfg, command),
        Some(Commands::Version) => {
            println!("ai-cli {}", cfg.version);
            Ok(())
        }
    }
}

/// Provider and URL for the bare root command. Without a saved default the
/// root command talks to Ollama.
fn persisted_target(cfg: &Config) -> Result<(ProviderKind, Option<String>)> {
    let store = DefaultsStore::in_dir(&cfg.config_dir);
    let settings = store.load()?;
    if !settings.is_set() {
        return Ok((ProviderKind::Ollama, None));
    }

    let kind = settings.provider.parse::<ProviderKind>().with_context(|| {
        format!(
            "Invalid default provider in '{}', run `ai-cli default clear`",
            store.path().display()
        )
    })?;
    Ok((kind, settings.provider_url))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn resolve_identity(
    cfg: &Config,
    kind: ProviderKind,
    persisted_url: Option<&str>,
    flag_url: Option<&str>,
) -> ProviderIdentity {
    let base_url = non_blank(flag_url)
        .or_else(|| non_blank(persisted_url))
        .unwrap_or_else(|| cfg.base_url_for(kind));
    ProviderIdentity::new(kind, base_url.trim_end_matches('/'))
}

async fn run_chat(
    cfg: &Config,
    kind: ProviderKind,
    persisted_url: Option<&str>,
    args: &ChatArgs,
) -> Result<()> {
    let identity = resolve_identity(cfg, kind, persisted_url, args.url.as_deref());
    let boxed = build_provider(&identity, cfg.request_timeout_secs)
        .with_context(|| format!("Failed to initialize {} provider", kind.display_name()))?;
    let provider: &dyn Provider = boxed.as_ref();

    if args.list_models {
        return list_models(provider).await;
    }

    let model = non_blank(args.model.as_deref()).unwrap_or(identity.default_model.as_str());
    let options = CompletionOptions::new(model, args.temperature).streaming(args.stream);
    let system_prompt = resolve_system_prompt(args.system.as_deref(), args.preset);
    info!(
        provider = %kind,
        api_url = %identity.base_url,
        model = %options.model,
        interactive = args.interactive,
        "starting chat"
    );

    if args.interactive {
        let conversation = Conversation::new(Some(system_prompt), args.max_history);
        let mut session = Session::new(provider, options, conversation);
        let show_progress = io::stderr().is_terminal();
        return run_repl(
            &mut session,
            io::stdin().lock(),
            &mut io::stdout(),
            show_progress,
        )
        .await;
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        bail!(MISSING_PROMPT);
    }

    let messages = [Message::system(system_prompt), Message::user(prompt.trim())];
    single_prompt(provider, &messages, &options).await
}

/// Collects the whole reply, switching the loader message once the server
/// starts answering.
async fn buffered_reply(
    provider: &dyn Provider,
    messages: &[Message],
    options: &CompletionOptions,
    loader: Option<&Loader>,
) -> Result<String, ProviderError> {
    let mut reply = String::new();
    let mut answering = false;
    provider
        .stream_completion(messages, options, &mut |delta: &str| {
            if !answering {
                answering = true;
                if let Some(loader) = loader {
                    loader.set_message("Generating the answer");
                }
            }
            reply.push_str(delta);
        })
        .await?;
    Ok(reply)
}

async fn single_prompt(
    provider: &dyn Provider,
    messages: &[Message],
    options: &CompletionOptions,
) -> Result<()> {
    let mut stdout = io::stdout();

    if options.streaming {
        let mut write_err: Option<io::Error> = None;
        provider
            .stream_completion(messages, options, &mut |delta: &str| {
                if let Err(err) = write!(stdout, "{delta}").and_then(|()| stdout.flush()) {
                    write_err.get_or_insert(err);
                }
            })
            .await
            .with_context(|| format!("{} chat completion failed", provider.name()))?;
        if let Some(err) = write_err {
            return Err(err).context("Failed to write reply");
        }
        writeln!(stdout)?;
        return Ok(());
    }

    let loader = io::stderr()
        .is_terminal()
        .then(|| Loader::start("thinking"));
    let reply = buffered_reply(provider, messages, options, loader.as_ref()).await;
    if let Some(loader) = loader {
        loader.stop();
    }

    let reply = reply.with_context(|| format!("{} chat completion failed", provider.name()))?;
    debug!(reply_len = reply.len(), "completion finished");
    writeln!(stdout, "{}", reply.trim())?;
    Ok(())
}

async fn list_models(provider: &dyn Provider) -> Result<()> {
    let models = provider
        .list_models()
        .await
        .with_context(|| format!("Failed to list {} models", provider.name()))?;
    write_model_table(&mut io::stdout().lock(), &models).context("Failed to write to stdout")
}

fn run_default(cfg: &Config, command: DefaultCommands) -> Result<()> {
    let store = DefaultsStore::in_dir(&cfg.config_dir);

    match command {
        DefaultCommands::Set { provider, url } => {
            let provider = provider.trim().to_ascii_lowercase();
            provider
                .parse::<ProviderKind>()
                .with_context(|| format!("invalid provider: {provider}"))?;

            let settings = DefaultSettings {
                provider,
                provider_url: non_blank(url.as_deref())
                    .map(|url| url.trim_end_matches('/').to_string()),
            };
            store
                .save(&settings)
                .context("Failed to save default provider")?;

            println!("Default provider set to: {}", settings.provider);
            if let Some(url) = &settings.provider_url {
                println!("Provider URL: {url}");
            }
        }
        DefaultCommands::Show => {
            let settings = store.load().context("Failed to load default provider")?;
            if !settings.is_set() {
                println!("No default provider set");
                return Ok(());
            }

            println!("Default provider: {}", settings.provider);
            if let Some(url) = &settings.provider_url {
                println!("Provider URL: {url}");
            }
        }
        DefaultCommands::Clear => {
            store.clear().context("Failed to clear default provider")?;
            println!("Default provider cleared");
        }
    }
    Ok(())
}

fn write_providers<W: Write>(out: &mut W, cfg: &Config) -> io::Result<()> {
    writeln!(out, "Available providers:")?;
    for kind in ProviderKind::ALL {
        writeln!(out)?;
        writeln!(out, "{}", kind.display_name())?;
        writeln!(out, "Description: {}", kind.description())?;
        writeln!(out, "Default URL: {}", cfg.base_url_for(kind))?;
        writeln!(out, "Default model: {}", kind.default_model())?;
        match kind {
            ProviderKind::Ollama => writeln!(out, "Type: {kind}")?,
            ProviderKind::OpenAi => writeln!(out, "Type: {kind} (alias: localai)")?,
        }
    }
    Ok(())
}

fn write_model_table<W: Write>(out: &mut W, models: &[ModelInfo]) -> io::Result<()> {
    if models.is_empty() {
        return writeln!(
            out,
            "No models found. Load or pull a model on the server, then try again."
        );
    }

    let with_description = models.iter().any(|model| !model.description.is_empty());
    let mut header = vec!["NAME", "SIZE", "MODIFIED", "FAMILY"];
    if with_description {
        header.push("DESCRIPTION");
    }

    let rows: Vec<Vec<String>> = models
        .iter()
        .map(|model| {
            let mut row = vec![
                model.name.clone(),
                format_size(model.size),
                format_modified(&model.modified),
                or_dash(&model.family),
            ];
            if with_description {
                row.push(or_dash(&model.description));
            }
            row
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|title| title.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rules: Vec<String> = header.iter().map(|title| "-".repeat(title.len())).collect();
    write_row(out, &widths, &header)?;
    write_row(out, &widths, &rules)?;
    for row in &rows {
        write_row(out, &widths, row)?;
    }
    Ok(())
}

fn write_row<W: Write, S: AsRef<str>>(
    out: &mut W,
    widths: &[usize],
    cells: &[S],
) -> io::Result<()> {
    let mut line = String::new();
    for (idx, (cell, width)) in cells.iter().zip(widths).enumerate() {
        let cell = cell.as_ref();
        line.push_str(cell);
        if idx + 1 < cells.len() {
            let pad = width.saturating_sub(cell.chars().count()) + COLUMN_GAP;
            line.push_str(&" ".repeat(pad));
        }
    }
    writeln!(out, "{line}")
}

fn or_dash(value: &str) -> String {
    if value.trim().is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Binary units, one decimal place from KB up. Zero means unknown.
fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes == 0 {
        return "-".to_string();
    }
    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut rest = bytes / UNIT;
    while rest >= UNIT {
        div *= UNIT;
        exp += 1;
        rest /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {prefix}B", bytes as f64 / div as f64)
}

fn format_modified(raw: &str) -> String {
    if raw.trim().is_empty() {
        return "-".to_string();
    }
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(timestamp) => timestamp.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}
