use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::Level;

use tiny_session::config::SessionConfig;
use tiny_session::counter::CounterStore;
use tiny_session::posts::{NewPost, PostsClient, PostsError, PostsQuery, QueryConfig};
use tiny_session::provider::check_provider_setup;
use tiny_session::session::{AuthFailure, SessionManager, SignupOutcome, User};
use tiny_session::storage::{FileStorage, Storage, StorageError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Auth(#[from] AuthFailure),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Posts(#[from] PostsError),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "tiny-session", about = "Session, counter and posts demo CLI")]
struct Cli {
    /// Log at debug level instead of warn.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the auth mode and the signed-in user.
    Status,
    /// Report identity provider configuration.
    Doctor,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    Logout,
    Counter(CounterCommand),
    Posts(PostsCommand),
}

#[derive(Args, Debug)]
struct CounterCommand {
    #[command(subcommand)]
    command: CounterSubcommand,
}

#[derive(Subcommand, Debug)]
enum CounterSubcommand {
    Show,
    Inc,
    Dec,
    Reset,
    Set { count: i64 },
}

#[derive(Args, Debug)]
struct PostsCommand {
    #[command(subcommand)]
    command: PostsSubcommand,
}

#[derive(Subcommand, Debug)]
enum PostsSubcommand {
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Fetch one or more posts by id; id 0 is skipped.
    Get {
        #[arg(required = true)]
        ids: Vec<u64>,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        #[arg(long, default_value_t = 1)]
        user_id: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), CliError> {
    let config = SessionConfig::from_env();
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&config.storage_dir)?);

    match command {
        Command::Doctor => {
            run_doctor(&config, storage);
            Ok(())
        }
        Command::Counter(counter) => {
            run_counter(storage, counter.command);
            Ok(())
        }
        Command::Posts(posts) => run_posts(&config, posts.command).await,
        command => {
            let manager = SessionManager::with_storage(&config, storage);
            manager.resolve().await;
            run_session(&manager, command).await
        }
    }
}

async fn run_session(manager: &SessionManager, command: Command) -> Result<(), CliError> {
    match command {
        Command::Status => {
            println!("mode: {}", manager.mode());
            match manager.user() {
                Some(user) => print_user(&user),
                None => println!("not signed in"),
            }
        }
        Command::Login { email, password } => {
            let user = manager.login(&email, &password).await?;
            println!("signed in");
            print_user(&user);
        }
        Command::Signup { email, password, name } => match manager.signup(&email, &password, name.as_deref()).await? {
            SignupOutcome::Active(user) => {
                println!("account created and signed in");
                print_user(&user);
            }
            SignupOutcome::ConfirmationRequired { email } => {
                println!("account created; confirm {email} before signing in");
            }
        },
        Command::Logout => {
            manager.logout().await;
            println!("signed out");
        }
        Command::Doctor | Command::Counter(_) | Command::Posts(_) => {}
    }
    Ok(())
}

fn run_doctor(config: &SessionConfig, storage: Arc<dyn Storage>) {
    let report = check_provider_setup(config, storage);
    println!("mode: {}", config.mode);
    println!("provider url: {}", config.setup.url.as_deref().unwrap_or("(unset)"));
    println!("anon key: {}", if config.setup.has_anon_key { "set" } else { "(unset)" });
    println!("configured: {}", report.configured);
    println!("working: {}", report.working);
    println!("storage: {}", config.storage_dir.display());
}

fn run_counter(storage: Arc<dyn Storage>, command: CounterSubcommand) {
    let counter = CounterStore::load(storage);
    let count = match command {
        CounterSubcommand::Show => counter.count(),
        CounterSubcommand::Inc => counter.increment(),
        CounterSubcommand::Dec => counter.decrement(),
        CounterSubcommand::Reset => counter.reset(),
        CounterSubcommand::Set { count } => counter.set_count(count),
    };
    println!("{count}");
}

async fn run_posts(config: &SessionConfig, command: PostsSubcommand) -> Result<(), CliError> {
    let client = PostsClient::new(&config.posts)?;
    let query = PostsQuery::new(Arc::new(client), QueryConfig::from_posts(&config.posts));

    match command {
        PostsSubcommand::List { limit } => {
            let posts = query.posts().await?;
            let shown: Vec<_> = posts.into_iter().take(limit).collect();
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        PostsSubcommand::Get { ids } => {
            let results = futures::future::join_all(ids.iter().map(|&id| query.post(id))).await;
            for (id, result) in ids.iter().zip(results) {
                match result? {
                    Some(post) => println!("{}", serde_json::to_string_pretty(&post)?),
                    None => eprintln!("post {id}: skipped"),
                }
            }
        }
        PostsSubcommand::Create { title, body, user_id } => {
            let post = query.create_post(&NewPost { title, body, user_id }).await?;
            println!("{}", serde_json::to_string_pretty(&post)?);
        }
    }
    Ok(())
}

fn print_user(user: &User) {
    println!("id: {}", user.id);
    println!("email: {}", user.email);
    if let Some(name) = &user.display_name {
        println!("name: {name}");
    }
}
