// modsync - sync workshop mods and run dedicated game servers locally

use clap::{Parser, Subcommand};
use modsync_lib::commands::games::{self as game_commands, GamesState};
use modsync_lib::commands::server::{self as server_commands, CreateServerRequest, ServerState};
use modsync_lib::games::GameType;
use modsync_lib::launch::{ConsoleSink, LogEvent, OutputStream, TracingSink};
use modsync_lib::paths::AppPaths;
use serde::Serialize;
use std::future::Future;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modsync")]
#[command(version)]
#[command(about = "Sync Steam Workshop mods and run dedicated game servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Data directory (defaults to $MODSYNC_HOME or ~/ModSyncAnywhere)")]
    home: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a server instance")]
    Create {
        #[arg(help = "Display name of the server")]
        name: String,
        #[arg(long, default_value = "dayz", help = "Game profile id")]
        game: String,
        #[arg(long, help = "Bind address passed as -ip=")]
        ip: Option<String>,
        #[arg(long, help = "Game port passed as -port= (0 to omit)")]
        port: Option<u16>,
        #[arg(long, allow_hyphen_values = true, help = "Extra launch parameters")]
        params: Option<String>,
        #[arg(long)]
        max_players: Option<u32>,
        #[arg(long, help = "Do not capture the server console")]
        no_console: bool,
        #[arg(long, help = "Log in to SteamCMD anonymously when no credentials exist")]
        anonymous: bool,
        #[arg(long, help = "SteamCMD timeout in seconds (0 waits forever)")]
        download_timeout: Option<u64>,
    },

    #[command(about = "List server instances")]
    List,

    #[command(about = "Show the status of a server")]
    Status { server_id: String },

    #[command(about = "Download and install the server's mods without starting it")]
    Sync { server_id: String },

    #[command(about = "Sync mods, start the server and stay attached until it exits")]
    Start {
        server_id: String,
        #[arg(long, help = "Do not print the server console")]
        quiet: bool,
    },

    #[command(about = "Write the server config file from the game template")]
    Config {
        server_id: String,
        #[arg(long, help = "Replace an existing config file")]
        force: bool,
    },

    #[command(about = "Delete a server instance")]
    Delete {
        server_id: String,
        #[arg(long, help = "Also remove the server files")]
        data: bool,
    },

    #[command(about = "Manage game profiles")]
    Games {
        #[command(subcommand)]
        action: GamesAction,
    },
}

#[derive(Subcommand)]
enum GamesAction {
    #[command(about = "List available game profiles")]
    List,
    #[command(about = "Import a game profile from a JSON file")]
    Import { file: PathBuf },
    #[command(about = "Delete a custom game profile")]
    Delete { game_type: String },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let paths = match cli.home {
        Some(home) => AppPaths::new(home),
        None => AppPaths::from_env(),
    };
    tracing::debug!("Data directory: {:?}", paths.root());
    let games = GamesState::new(&paths);
    let servers = ServerState::new(paths);

    match cli.command {
        Commands::Create {
            name,
            game,
            ip,
            port,
            params,
            max_players,
            no_console,
            anonymous,
            download_timeout,
        } => {
            let request = CreateServerRequest {
                name,
                game_type: GameType::new(&game),
                ip,
                port,
                params,
                max_players,
                embed_console: no_console.then_some(false),
                allow_anonymous_login: anonymous.then_some(true),
                download_timeout_secs: download_timeout,
            };
            let response = server_commands::create_server(request, &servers, &games).await?;
            print_json(&response)
        }
        Commands::List => print_json(&server_commands::list_servers(&servers).await?),
        Commands::Status { server_id } => {
            print_json(&server_commands::get_server_status(&server_id, &servers).await?)
        }
        Commands::Sync { server_id } => {
            print_json(&server_commands::sync_mods(&server_id, &servers, &games).await?)
        }
        Commands::Start { server_id, quiet } => {
            let interrupted = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Ctrl-C handler unavailable: {}", e);
                    std::future::pending::<()>().await;
                }
            };
            start_attached(&server_id, ConsoleMode::detect(quiet), &servers, &games, interrupted)
                .await
                .map(|_| ())
        }
        Commands::Config { server_id, force } => {
            let written =
                server_commands::create_server_config(&server_id, force, &servers, &games).await?;
            println!("{:?}", written);
            Ok(())
        }
        Commands::Delete { server_id, data } => {
            print_json(&server_commands::delete_server(&server_id, data, &servers).await?)
        }
        Commands::Games { action } => match action {
            GamesAction::List => print_json(&game_commands::list_available_games(&games).await?),
            GamesAction::Import { file } => {
                let json = std::fs::read_to_string(&file)
                    .map_err(|e| format!("Failed to read {:?}: {}", file, e))?;
                print_json(&game_commands::import_game(&json, &games).await?)
            }
            GamesAction::Delete { game_type } => game_commands::delete_game(&game_type, &games).await,
        },
    }
}

/// Where the server console goes while attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleMode {
    Quiet,
    /// Raw lines on stdout/stderr
    Print,
    /// Through the log, keeping stdout for the JSON outcome
    Log,
}

impl ConsoleMode {
    fn detect(quiet: bool) -> Self {
        if quiet {
            ConsoleMode::Quiet
        } else if std::io::stdout().is_terminal() {
            ConsoleMode::Print
        } else {
            ConsoleMode::Log
        }
    }
}

/// Start the server and stay attached until it exits or `shutdown`
/// resolves, in which case it is killed. Returns the exit code.
async fn start_attached<F>(
    server_id: &str,
    mode: ConsoleMode,
    servers: &ServerState,
    games: &GamesState,
    shutdown: F,
) -> Result<Option<i32>, String>
where
    F: Future<Output = ()>,
{
    let (console, printer): (Option<Arc<dyn ConsoleSink>>, _) = match mode {
        ConsoleMode::Quiet => (None, None),
        ConsoleMode::Log => (Some(Arc::new(TracingSink)), None),
        ConsoleMode::Print => {
            let (tx, rx) = mpsc::unbounded_channel::<LogEvent>();
            (Some(Arc::new(tx)), Some(tokio::spawn(print_console(rx))))
        }
    };

    let outcome = server_commands::start_server(server_id, servers, games, console).await?;
    print_json(&outcome)?;

    let code = tokio::select! {
        code = server_commands::wait_for_exit(server_id, servers) => {
            let code = code?;
            tracing::info!("Server {} exited with code {:?}", server_id, code);
            code
        }
        _ = shutdown => {
            tracing::info!("Interrupted, stopping server {}", server_id);
            server_commands::stop_server(server_id, servers).await?;
            None
        }
    };

    // Ends once the console readers have dropped their senders
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    Ok(code)
}

async fn print_console(mut rx: mpsc::UnboundedReceiver<LogEvent>) {
    while let Some(event) = rx.recv().await {
        match event.stream {
            OutputStream::Stdout => println!("{}", event.line),
            OutputStream::Stderr => eprintln!("{}", event.line),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}
