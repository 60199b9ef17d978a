//! askdb CLI - ask questions about registered databases
//!
//! Usage:
//!   askdb serve [--host <host>] [--port <port>]
//!   askdb ask <db-id> "<question>" [--yes]
//!   askdb test-connection <db-id>
//!   askdb sync <db-id>
//!   askdb db add|list|remove
//!
//! Examples:
//!   askdb db add --name sales --engine sqlite --host ./sales.db
//!   askdb sync 1
//!   askdb ask 1 "How many orders were placed last month?"

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use askdb::config::{ConnectionConfig, Engine, Settings};
use askdb::connection::ConnectionProvider;
use askdb::llm::ProviderRegistry;
use askdb::metadata::{
    MetadataStore, MetadataStoreExt, NewDatabaseTarget, SqliteMetadataStore, TargetConnection,
};
use askdb::query::{
    AnalyzeRequest, QueryExecutionResult, QueryService, QueryWorkflowState, ViewingType,
};
use askdb::schema::SchemaSynchronizer;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "askdb - ask questions about your databases in plain language")]
#[command(version)]
struct Cli {
    /// Path to a config file (defaults to $ASKDB_CONFIG, ./askdb.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a question about a registered database
    Ask {
        /// Database id
        database_id: i64,

        /// The question, in plain language
        question: String,

        /// Skip confirmation and run the one-shot path
        #[arg(short, long)]
        yes: bool,
    },

    /// Check that a registered database is reachable
    TestConnection { database_id: i64 },

    /// Introspect a registered database and store its schema
    Sync { database_id: i64 },

    /// Manage registered databases
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Register a database
    Add(AddDatabase),

    /// List registered databases
    List {
        /// Include removed databases
        #[arg(long)]
        all: bool,
    },

    /// Remove a database (it is kept, flagged inactive)
    Remove { database_id: i64 },
}

#[derive(Args)]
struct AddDatabase {
    /// Display name
    #[arg(long)]
    name: String,

    /// Read engine, host, name, port and credentials from ASKDB_DB_* variables
    #[arg(long)]
    from_env: bool,

    /// sqlserver, mysql, oracle or sqlite
    #[arg(long, required_unless_present = "from_env")]
    engine: Option<String>,

    /// Server hostname (file path for SQLite)
    #[arg(long, required_unless_present = "from_env")]
    host: Option<String>,

    /// Database or service name
    #[arg(long, default_value = "")]
    database: String,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Use Windows trusted connection (SQL Server)
    #[arg(long)]
    trusted: bool,

    /// Explicit connection string, used instead of the discrete fields
    #[arg(long)]
    connection_string: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("askdb=info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match load_settings(cli.config.as_ref()) {
        Ok(settings) => run(cli.command, settings).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_settings(path: Option<&PathBuf>) -> CliResult<Settings> {
    Ok(match path {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    })
}

fn open_store(settings: &Settings) -> CliResult<Arc<SqliteMetadataStore>> {
    let path = settings.metadata.resolved_path()?;
    Ok(Arc::new(SqliteMetadataStore::open(path)?))
}

fn query_service(settings: &Settings, store: Arc<dyn MetadataStore>) -> CliResult<QueryService> {
    let llm = ProviderRegistry::with_defaults().build(&settings.llm)?;
    Ok(QueryService::from_settings(settings, store, llm)?)
}

async fn run(command: Commands, settings: Settings) -> CliResult<ExitCode> {
    let store = open_store(&settings)?;

    match command {
        Commands::Serve { host, port } => cmd_serve(settings, store, host, port).await,
        Commands::Ask {
            database_id,
            question,
            yes,
        } => {
            let service = query_service(&settings, store)?;
            cmd_ask(&service, database_id, question, yes).await
        }
        Commands::TestConnection { database_id } => {
            let target = store.require_active_target(database_id).await?;
            let result = ConnectionProvider::from_settings(&settings)
                .test_connection(&target)
                .await;
            println!("{}", result.message);
            if let Some(detail) = result.detail {
                println!("  {}", detail);
            }
            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Sync { database_id } => {
            let target = store.require_active_target(database_id).await?;
            let connections = ConnectionProvider::from_settings(&settings);
            let report = SchemaSynchronizer::new(store)
                .introspect_and_sync(&connections, &target)
                .await?;
            println!("Synced {}: {}", target.name, report);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Db { command } => cmd_db(store.as_ref(), command).await,
    }
}

#[cfg(feature = "server")]
async fn cmd_serve(
    mut settings: Settings,
    store: Arc<SqliteMetadataStore>,
    host: Option<String>,
    port: Option<u16>,
) -> CliResult<ExitCode> {
    use askdb::web::{serve, AppState};

    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let service = query_service(&settings, store.clone())?;
    let state = Arc::new(AppState::new(store, service));

    println!("askdb");
    println!("   URL: http://{}:{}", settings.server.host, settings.server.port);
    println!("   LLM: {}", settings.llm.provider);
    println!();
    println!("   Press Ctrl+C to stop");

    serve(state, &settings.server).await?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(feature = "server"))]
async fn cmd_serve(
    _settings: Settings,
    _store: Arc<SqliteMetadataStore>,
    _host: Option<String>,
    _port: Option<u16>,
) -> CliResult<ExitCode> {
    eprintln!("askdb was built without the `server` feature");
    Ok(ExitCode::FAILURE)
}

async fn cmd_db(store: &SqliteMetadataStore, command: DbCommands) -> CliResult<ExitCode> {
    match command {
        DbCommands::Add(args) => {
            let id = add_database(store, args).await?;
            println!("Registered database {}", id);
        }
        DbCommands::List { all } => {
            let targets = store.list_database_targets(all).await?;
            if targets.is_empty() {
                println!("No databases registered.");
            }
            for target in targets {
                let status = if target.is_active { "" } else { " (removed)" };
                println!(
                    "  {:>3}  {} [{}] {}{}",
                    target.id, target.name, target.engine_kind, target.connection.host, status
                );
            }
        }
        DbCommands::Remove { database_id } => {
            if store.deactivate_database_target(database_id).await? {
                println!("Removed database {}", database_id);
            } else {
                eprintln!("No database with id {}", database_id);
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn add_database(store: &SqliteMetadataStore, args: AddDatabase) -> CliResult<i64> {
    let (engine, connection) = if args.from_env {
        let config = ConnectionConfig::from_env()?;
        (config.engine, TargetConnection::from(config))
    } else {
        let engine: Engine = args.engine.as_deref().unwrap_or_default().parse()?;
        let connection = TargetConnection {
            host: args.host.unwrap_or_default(),
            port: args.port,
            database: args.database,
            trusted_connection: args.trusted,
            username: args.user,
            password: args.password,
            connection_string: args.connection_string,
        };
        (engine, connection)
    };

    let engine_type_id = store
        .engine_type_id(engine.display_name())
        .await?
        .ok_or_else(|| format!("engine type {} is not registered", engine.display_name()))?;

    Ok(store
        .add_database_target(NewDatabaseTarget {
            name: args.name,
            engine_type_id,
            connection,
        })
        .await?)
}

async fn cmd_ask(service: &QueryService, database_id: i64, question: String, yes: bool) -> CliResult<ExitCode> {
    let request = AnalyzeRequest::new(question, database_id);

    if yes {
        let combined = service.process(&request).await;
        println!("{}\n", combined.explanation);
        return Ok(print_execution(&combined.execution));
    }

    let analysis = service.analyze(&request).await;
    if !analysis.success {
        eprintln!("{}", analysis.failure.error_message.unwrap_or_default());
        return Ok(ExitCode::FAILURE);
    }

    println!("{}", analysis.explanation);
    println!("(confidence {:.0}%)", analysis.confidence_score * 100.0);
    if let Some(preview) = &analysis.preview_sql {
        println!("\nDraft SQL:\n{}", preview);
    }

    let mut state = QueryWorkflowState::from_analysis(&analysis)?;
    let mut resolutions = BTreeMap::new();
    for term in state.unresolved() {
        let options = &state.ambiguities[term];
        println!("\n\"{}\" could mean:", term);
        for (i, option) in options.iter().enumerate() {
            println!("  {}) {}", i + 1, option);
        }
        let answer = prompt("Choose a number, type your own meaning, or press Enter to skip: ")?;
        let choice = match answer.parse::<usize>() {
            Ok(n) if n >= 1 && n <= options.len() => options[n - 1].clone(),
            _ => answer,
        };
        if !choice.is_empty() {
            resolutions.insert(term.to_string(), choice);
        }
    }

    let correction = prompt("\nPress Enter to confirm this understanding, or type a correction: ")?;
    let understanding = if correction.is_empty() {
        state.explanation.clone()
    } else {
        correction
    };

    let generate = state.confirm(&understanding, resolutions)?;
    let generated = service.generate(&generate).await;
    if !generated.success {
        eprintln!("{}", generated.failure.error_message.unwrap_or_default());
        return Ok(ExitCode::FAILURE);
    }

    let execute = state.record_sql(&generated)?;
    println!("\nSQL:\n{}\n", execute.sql);
    let answer = prompt("Run it? [Y/n] ")?;
    if answer.eq_ignore_ascii_case("n") || answer.eq_ignore_ascii_case("no") {
        return Ok(ExitCode::SUCCESS);
    }

    let executed = service.execute(&execute).await;
    state.record_execution(&executed)?;
    Ok(print_execution(&executed))
}

fn prompt(message: &str) -> io::Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_execution(executed: &QueryExecutionResult) -> ExitCode {
    if !executed.success {
        eprintln!("{}", executed.failure.error_message.as_deref().unwrap_or("query failed"));
        if !executed.sql.is_empty() {
            eprintln!("\nSQL:\n{}", executed.sql);
        }
        return ExitCode::FAILURE;
    }

    match (executed.viewing_type, &executed.formatted_value, &executed.result) {
        (ViewingType::Number | ViewingType::Label, Some(value), _) => println!("{}", value),
        (_, _, Some(result)) => {
            println!("{}", result.columns.join(" | "));
            for row in &result.rows {
                let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                println!("{}", cells.join(" | "));
            }
            println!("({} rows)", result.row_count());
        }
        _ => {}
    }

    if let Some(explanation) = &executed.result_explanation {
        println!("\n{}", explanation);
    }
    ExitCode::SUCCESS
}
