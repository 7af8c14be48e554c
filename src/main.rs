use std::path::{Path, PathBuf};
use std::sync::Arc;

use animaforge_client::storage::StorageError;
use animaforge_client::types::{
    AnimationQuery, AnimationStyle, CreateAnimation, Resolution, UpdateAnimation, UpdateProfile, Upload,
};
use animaforge_client::validate::RegisterForm;
use animaforge_client::{ApiError, AppContext, ClientConfig, FetchPolicy, FileStorage, Resources, TokenStorage};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("token storage unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("could not read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON output: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("not logged in; run `animaforge login` first")]
    NotLoggedIn,
}

#[derive(Parser, Debug)]
#[command(name = "animaforge", about = "AnimaForge gallery API CLI")]
struct Cli {
    /// Base API endpoint. Falls back to NEXT_PUBLIC_API_URL, then localhost.
    #[arg(long, env = "ANIMAFORGE_API_URL")]
    api_url: Option<String>,

    /// Token store file. Defaults to the user config directory.
    #[arg(long, env = "ANIMAFORGE_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "ANIMAFORGE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "ANIMAFORGE_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    Logout,
    Whoami,
    Animations(AnimationsCommand),
    Users(UsersCommand),
    Marketplace(MarketplaceCommand),
}

#[derive(Args, Debug)]
struct AnimationsCommand {
    #[command(subcommand)]
    command: AnimationsSubcommand,
}

#[derive(Subcommand, Debug)]
enum AnimationsSubcommand {
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        page: Option<u32>,
    },
    Get {
        id: String,
    },
    Create(CreateArgs),
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    Like {
        id: String,
    },
    Delete {
        id: String,
    },
    Download {
        id: String,
    },
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "anime")]
    style: AnimationStyle,
    #[arg(long, default_value_t = 5)]
    duration: u32,
    #[arg(long, default_value = "1080p")]
    resolution: Resolution,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long, help = "Reference file to upload with the prompt")]
    file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct UsersCommand {
    #[command(subcommand)]
    command: UsersSubcommand,
}

#[derive(Subcommand, Debug)]
enum UsersSubcommand {
    Profile {
        username: String,
    },
    Animations {
        username: String,
    },
    UpdateMe {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
    },
}

#[derive(Args, Debug)]
struct MarketplaceCommand {
    #[command(subcommand)]
    command: MarketplaceSubcommand,
}

#[derive(Subcommand, Debug)]
enum MarketplaceSubcommand {
    Featured {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Trending {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = &cli.api_url {
        config.api_url = ClientConfig::with_api_url(api_url)?.api_url;
    }
    let storage: Arc<dyn TokenStorage> = match cli.token_file {
        Some(path) => Arc::new(FileStorage::new(path)),
        None => Arc::new(FileStorage::in_config_dir()?),
    };

    let context = AppContext::start(config, storage).await?;
    let resources = context.resources();

    match cli.command {
        Command::Login { email, password } => {
            let user = resources.login(&email, &password).await?;
            print_json(&user)
        }
        Command::Register { username, email, password, confirm_password } => {
            let form = RegisterForm { username, email, password, confirm_password };
            let user = resources.register(&form).await?;
            print_json(&user)
        }
        Command::Logout => {
            resources.logout().await?;
            eprintln!("logged out");
            Ok(())
        }
        Command::Whoami => {
            let user = resources.current_user(FetchPolicy::Refresh).await?.ok_or(CliError::NotLoggedIn)?;
            print_json(&*user)
        }
        Command::Animations(animations) => run_animations(resources, animations).await,
        Command::Users(users) => run_users(resources, users).await,
        Command::Marketplace(marketplace) => {
            let page = match marketplace.command {
                MarketplaceSubcommand::Featured { page } => resources.featured(page, FetchPolicy::CacheFirst).await?,
                MarketplaceSubcommand::Trending { page } => resources.trending(page, FetchPolicy::CacheFirst).await?,
            };
            print_json(&*page)
        }
    }
}

async fn run_animations(resources: &Resources, animations: AnimationsCommand) -> Result<(), CliError> {
    match animations.command {
        AnimationsSubcommand::List { search, category, page } => {
            let query = AnimationQuery { search, category, page };
            let page = resources.animations(&query, FetchPolicy::CacheFirst).await?;
            print_json(&*page)
        }
        AnimationsSubcommand::Get { id } => {
            let animation = resources.animation(&id, FetchPolicy::CacheFirst).await?;
            print_json(&animation.as_deref())
        }
        AnimationsSubcommand::Create(args) => {
            let form = create_form(args)?;
            let animation = resources.create_animation(&form).await?;
            print_json(&animation)
        }
        AnimationsSubcommand::Update { id, title, description, category, tags } => {
            let update = UpdateAnimation { title, description, category, tags: (!tags.is_empty()).then_some(tags) };
            let animation = resources.update_animation(&id, &update).await?;
            print_json(&animation)
        }
        AnimationsSubcommand::Like { id } => {
            resources.like_animation(&id).await?;
            eprintln!("liked {id}");
            Ok(())
        }
        AnimationsSubcommand::Delete { id } => {
            resources.delete_animation(&id).await?;
            eprintln!("deleted {id}");
            Ok(())
        }
        AnimationsSubcommand::Download { id } => {
            let download = resources.download_animation(&id).await?;
            print_json(&download)
        }
    }
}

async fn run_users(resources: &Resources, users: UsersCommand) -> Result<(), CliError> {
    match users.command {
        UsersSubcommand::Profile { username } => {
            let user = resources.user_profile(&username, FetchPolicy::CacheFirst).await?;
            print_json(&user.as_deref())
        }
        UsersSubcommand::Animations { username } => {
            let page = resources.user_animations(&username, FetchPolicy::CacheFirst).await?;
            print_json(&page.as_deref())
        }
        UsersSubcommand::UpdateMe { username, email, bio, avatar } => {
            if resources.auth().token().is_none() {
                return Err(CliError::NotLoggedIn);
            }
            let user = resources.update_profile(&UpdateProfile { username, email, bio, avatar }).await?;
            print_json(&user)
        }
    }
}

fn create_form(args: CreateArgs) -> Result<CreateAnimation, CliError> {
    let mut form = CreateAnimation::new(args.prompt, args.style, args.duration, args.resolution);
    form.title = args.title;
    form.description = args.description;
    form.category = args.category;
    form.tags = args.tags;
    if let Some(path) = args.file {
        form.file = Some(read_upload(&path)?);
    }
    Ok(form)
}

fn read_upload(path: &Path) -> Result<Upload, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::ReadFile { path: path.to_owned(), source })?;
    let file_name = path.file_name().map_or_else(|| "upload".to_owned(), |name| name.to_string_lossy().into_owned());
    Ok(Upload { file_name, mime: mime_for(path).to_owned(), bytes })
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("gif") => "image/gif",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
