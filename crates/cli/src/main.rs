use clap::{Parser, Subcommand};
use kiwi::channels::ConsoleChannel;
use kiwi::config::Responder;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kiwi")]
#[command(about = "Kiwi chat bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: KIWI_CONFIG_PATH or ~/.kiwi/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the bot on the console: each line you type is a direct message, replies are printed.
    Run {
        /// Config file path (default: KIWI_CONFIG_PATH or ~/.kiwi/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Answer with the canned echo responder instead of the LLM.
        #[arg(long)]
        echo: bool,

        /// Your display name, used in the model's system prompt.
        #[arg(long, value_name = "NAME", default_value = "you")]
        name: String,
    },

    /// Print the conversation history reconstructed from the log.
    History {
        /// Config file path (default: KIWI_CONFIG_PATH or ~/.kiwi/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Only this chat.
        #[arg(long, value_name = "CHAT_ID")]
        chat: Option<String>,

        /// Print raw JSON messages, one per line.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring unreadable .env: {}", e);
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("kiwi {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, echo, name }) => {
            if let Err(e) = run_console(config, echo, name).await {
                log::error!("run failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::History { config, chat, json }) => {
            if let Err(e) = run_history(config, chat, json).await {
                log::error!("history failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(kiwi::config::default_config_path);
    let dir = kiwi::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_console(
    config_path: Option<PathBuf>,
    echo: bool,
    name: String,
) -> anyhow::Result<()> {
    let (mut config, path) = kiwi::config::load_config(config_path)?;
    if echo {
        config.bot.responder = Responder::Echo;
    }
    log::info!("using config {}", path.display());
    println!("{} is listening. Type a message, /quit to leave.", config.bot.name);
    let console = Arc::new(ConsoleChannel::new(name));
    kiwi::bot::run_bot(config, console).await
}

async fn run_history(
    config_path: Option<PathBuf>,
    chat: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let (config, _) = kiwi::config::load_config(config_path)?;
    let log_path = kiwi::config::resolve_log_file(&config);
    let messages = kiwi::log_store::load_all(&log_path).await?;
    let history = kiwi::log_store::group_by_chat(messages);

    let mut chat_ids: Vec<&String> = history.keys().collect();
    chat_ids.sort();
    for chat_id in chat_ids {
        if chat.as_deref().is_some_and(|c| c != chat_id.as_str()) {
            continue;
        }
        let messages = &history[chat_id];
        if json {
            for m in messages {
                println!("{}", serde_json::to_string(m)?);
            }
            continue;
        }
        println!("== {} ({} message(s))", chat_id, messages.len());
        for m in messages {
            let who = if m.sender_id == config.bot.name {
                "bot"
            } else {
                m.sender_id.as_str()
            };
            println!("[{}] {}: {}", m.timestamp, who, m.text_or_placeholder());
        }
    }
    Ok(())
}
