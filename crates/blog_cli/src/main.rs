mod logging;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::bail;
use blog_client::{Access, ApiError, BlogApi, Session, SessionEvent, TokenStore};
use blog_core::{paths, BlogForm, BlogPatch, ClientConfig, LoginCredentials, RegisterData, User};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::broadcast::error::TryRecvError;

#[derive(Parser)]
#[command(name = "blog-cli")]
#[command(about = "Command-line client for the blog API")]
#[command(version)]
struct Cli {
    /// API base URL, e.g. http://127.0.0.1:8000/api
    #[arg(long)]
    api_base: Option<String>,

    /// Directory holding tokens.json
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and log in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long)]
        password: String,
        /// Defaults to --password
        #[arg(long)]
        password_confirm: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// List published posts
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        search: Option<String>,
    },
    /// Show a single post
    Show { id: i64 },
    /// Write a new post
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// Save without publishing
        #[arg(long)]
        draft: bool,
    },
    /// Change one of your posts
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long, conflicts_with = "unpublish")]
        publish: bool,
        #[arg(long)]
        unpublish: bool,
    },
    /// Delete one of your posts
    Delete { id: i64 },
    /// List your own posts, drafts included
    Mine {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let session = match build_session(&cli).await {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{} {:#}", "❌".red(), err);
            return ExitCode::FAILURE;
        }
    };

    let mut events = session.events();
    let result = run(&session, cli.command).await;
    report_session_events(&mut events);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ApiError>() {
                Some(api_err) => render::api_error(api_err),
                None => eprintln!("{} {:#}", "❌".red(), err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn build_session(cli: &Cli) -> anyhow::Result<Session> {
    let mut config = ClientConfig::new();
    if let Some(api_base) = &cli.api_base {
        config.api_base = api_base.clone();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = Some(data_dir.clone());
    }

    let data_dir = paths::ensure_dir(&config.data_dir())?;
    let tokens = TokenStore::file(paths::tokens_path(&data_dir));
    log::debug!("Using {} with data dir {}", config.api_base, data_dir.display());

    Ok(Session::new(BlogApi::new(config, tokens)?).await?)
}

async fn run(session: &Session, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Login { email, password } => {
            let user = session
                .login(&LoginCredentials::new(email, password))
                .await?;
            println!("{}", format!("✅ Logged in as {}", user.username).green());
        }
        Commands::Register {
            email,
            username,
            first_name,
            last_name,
            password,
            password_confirm,
        } => {
            let data = RegisterData {
                email,
                username,
                first_name,
                last_name,
                password_confirm: password_confirm.unwrap_or_else(|| password.clone()),
                password,
            };
            let user = session.register(&data).await?;
            println!(
                "{}",
                format!("✅ Welcome, {}! You are logged in.", user.username).green()
            );
        }
        Commands::Logout => {
            session.logout().await?;
            println!("{}", "👋 Logged out".green());
        }
        Commands::Whoami => {
            let user = require_login(session).await?;
            render::user(&user);
        }
        Commands::List { page, search } => {
            let blogs = session.api().list_blogs(page, search.as_deref()).await?;
            render::page(page, &blogs);
        }
        Commands::Show { id } => {
            if let Err(err) = session.initialize().await {
                log::debug!("Continuing anonymously: {}", err);
            }
            let blog = session.api().get_blog(id).await?;
            render::blog(&blog, session.owns(&blog));
        }
        Commands::Create {
            title,
            content,
            draft,
        } => {
            require_login(session).await?;
            let mut form = BlogForm::new(title, content);
            if draft {
                form = form.draft();
            }
            let blog = session.api().create_blog(&form).await?;
            println!(
                "{}",
                format!("✅ Created #{} \"{}\"", blog.id, blog.title).green()
            );
        }
        Commands::Edit {
            id,
            title,
            content,
            publish,
            unpublish,
        } => {
            let patch = BlogPatch {
                title,
                content,
                is_published: match (publish, unpublish) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            };
            if patch.is_empty() {
                bail!("Nothing to change: pass --title, --content, --publish or --unpublish");
            }
            require_login(session).await?;
            let saved = session.api().update_blog(id, &patch).await?;
            render::saved(&saved);
        }
        Commands::Delete { id } => {
            require_login(session).await?;
            session.api().delete_blog(id).await?;
            println!("{}", format!("🗑️  Deleted #{id}").green());
        }
        Commands::Mine { page } => {
            require_login(session).await?;
            let blogs = session.api().my_blogs(page).await?;
            render::page(page, &blogs);
        }
    }
    Ok(())
}

/// Restore the stored session and apply the route guard.
async fn require_login(session: &Session) -> anyhow::Result<User> {
    if let Err(err) = session.initialize().await {
        log::warn!("Stored session could not be restored: {}", err);
    }
    match session.guard() {
        Access::Granted(user) => Ok(user),
        Access::Pending | Access::RedirectToLogin => Err(ApiError::LoginRequired.into()),
    }
}

fn report_session_events(events: &mut tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match events.try_recv() {
            Ok(SessionEvent::LoginRequired) => {
                eprintln!("{}", "⚠️  Your session has expired.".yellow());
            }
            Ok(event) => log::debug!("Session event: {:?}", event),
            Err(TryRecvError::Lagged(skipped)) => {
                log::debug!("Skipped {} session events", skipped);
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}
