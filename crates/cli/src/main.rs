use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use lib::bootstrap::Bootstrap;
use lib::cache::ChatCache;
use lib::connection::{ChatEvents, ConnectParams, ConnectionManager};
use lib::images::ImageTransfer;
use lib::message::{Message, Role};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "farmlink")]
#[command(about = "FarmLink CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    User,
    Agent,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Role::User,
            RoleArg::Agent => Role::Agent,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default config file.
    Init {
        /// Config file path (default: FARMLINK_CONFIG_PATH or ~/.farmlink/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Fetch chat history from the backend and seed the local cache.
    Sync {
        /// Config file path (default: FARMLINK_CONFIG_PATH or ~/.farmlink/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Role to fetch history as.
        #[arg(long, value_enum)]
        role: RoleArg,

        /// Refetch even when a cached history already exists.
        #[arg(long)]
        force: bool,
    },

    /// Chat over a live connection (interactive).
    Chat {
        /// Config file path (default: FARMLINK_CONFIG_PATH or ~/.farmlink/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Your user id.
        #[arg(long, value_name = "ID")]
        local_id: String,

        /// The id routed to on the other side (for agents: the user being chatted with).
        #[arg(long, value_name = "ID")]
        remote_id: String,

        /// Role to connect as.
        #[arg(long, value_enum)]
        role: RoleArg,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("farmlink {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sync {
            config,
            role,
            force,
        }) => {
            if let Err(e) = run_sync(config, role.into(), force).await {
                log::error!("sync failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat {
            config,
            local_id,
            remote_id,
            role,
        }) => {
            if let Err(e) = run_chat(config, local_id, remote_id, role.into()).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

/// Build the cache + image helper pair from config.
async fn open_cache(config: &lib::config::Config) -> (Arc<ChatCache>, Arc<ImageTransfer>) {
    let token = lib::config::resolve_api_token(config);
    let images = Arc::new(ImageTransfer::new(
        config.backend.api_base_url.clone(),
        token,
        lib::config::resolve_image_dir(config),
    ));
    let cache = Arc::new(
        ChatCache::load(lib::config::resolve_cache_file(config), images.clone()).await,
    );
    (cache, images)
}

async fn run_sync(
    config_path: Option<std::path::PathBuf>,
    role: Role,
    force: bool,
) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let token = lib::config::resolve_api_token(&config);
    let (cache, images) = open_cache(&config).await;
    let bootstrap = Bootstrap::new(
        config.backend.api_base_url.clone(),
        token,
        cache.clone(),
        images,
    );
    let updated = bootstrap.fetch_all_chats_and_cache(role, force).await;
    let count = cache.load_all().await.map(|i| i.len()).unwrap_or(0);
    if updated {
        println!("synced {} conversation(s)", count);
    } else {
        println!("cache unchanged ({} conversation(s))", count);
    }
    Ok(())
}

/// Prints inbound messages and, for agent flows, appends them to the cache.
struct TerminalEvents {
    cache: Arc<ChatCache>,
    conversation_id: String,
    role: Role,
}

#[async_trait]
impl ChatEvents for TerminalEvents {
    async fn on_open(&self) {
        println!("connected");
    }

    async fn on_message(&self, messages: Vec<Message>) {
        for message in messages {
            println!("< {}: {}", message.sender_name, message.text);
            if self.role == Role::Agent {
                if let Err(e) = self
                    .cache
                    .append_message(&self.conversation_id, message, self.role)
                    .await
                {
                    log::warn!("caching inbound message failed: {}", e);
                }
            }
        }
    }

    async fn on_error(&self, error: String) {
        eprintln!("connection error: {}", error);
    }

    async fn on_close(&self) {
        println!("disconnected");
    }
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    local_id: String,
    remote_id: String,
    role: Role,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, _) = lib::config::load_config(config_path)?;
    let (cache, _images) = open_cache(&config).await;
    let manager = ConnectionManager::from_config(&config);

    // A conversation is keyed by the user-side participant's id.
    let conversation_id = match role {
        Role::Agent => remote_id.clone(),
        Role::User => local_id.clone(),
    };
    let events = Arc::new(TerminalEvents {
        cache: cache.clone(),
        conversation_id: conversation_id.clone(),
        role,
    });
    manager
        .connect(
            ConnectParams {
                local_id: local_id.clone(),
                remote_id: remote_id.clone(),
                role,
            },
            events,
        )
        .await;

    let agent_key = match role {
        Role::Agent => Some(remote_id.clone()),
        Role::User => None,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if !manager.is_connected(agent_key.as_deref(), role).await {
            eprintln!("not connected");
            continue;
        }
        let message = Message::new(input, local_id.clone(), local_id.clone());
        let message = match cache.append_message(&conversation_id, message, role).await {
            Ok(m) => m,
            Err(e) => {
                log::warn!("caching outgoing message failed: {}", e);
                continue;
            }
        };
        manager.send_chat(&message, agent_key.as_deref()).await;
    }

    manager.disconnect(agent_key.as_deref()).await;
    Ok(())
}
