use clap::{Parser, Subcommand};
use inkpost_backend::config::Config;
use inkpost_backend::models::db_operations::users_db_operations;
use inkpost_backend::models::Role;
use inkpost_backend::routes::admin::validate_new_user;
use inkpost_backend::setup::db_setup;
use rusqlite::Connection;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Create every table and index. Safe to re-run.
    Setup,
    /// Add missing columns and indexes to an existing database.
    Migrate,
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// Create an admin account. Missing values are prompted for.
    Create {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env(&cli.env_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup => setup_database(&config),
            DbAction::Migrate => migrate_database(&config),
        },
        Commands::Admin { action } => match action {
            AdminAction::Create { email, name, password } => {
                create_admin_user(&config, email.clone(), name.clone(), password.clone())
            }
            AdminAction::List => list_users(&config),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("❌ Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn open_existing(config: &Config) -> Result<Connection, String> {
    let db_path = config.database_file();
    if !db_path.exists() {
        return Err(format!(
            "Database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        ));
    }
    let conn = Connection::open(&db_path).map_err(|e| format!("Could not open database: {}", e))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(|e| e.to_string())?;
    Ok(conn)
}

fn setup_database(config: &Config) -> Result<(), String> {
    let db_path = config.database_file();
    println!("\nSetting up database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).map_err(|e| format!("Could not create database directory: {}", e))?;
    }

    let mut conn = Connection::open(&db_path).map_err(|e| format!("Could not create database file: {}", e))?;
    db_setup::setup_database(&mut conn).map_err(|e| format!("Setting up database failed: {}", e))?;
    println!("✅ Database setup completed successfully.");
    Ok(())
}

fn migrate_database(config: &Config) -> Result<(), String> {
    let mut conn = open_existing(config)?;
    println!("\nRunning migrations on '{}'...", config.database_file().display());
    let applied = db_setup::run_migrations(&mut conn).map_err(|e| format!("Migration failed: {}", e))?;
    if applied.is_empty() {
        println!("ℹ️ Schema is already up to date.");
    } else {
        println!("✅ Applied {} migration step(s).", applied.len());
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String, String> {
    print!("{}: ", label);
    io::stdout().flush().map_err(|e| e.to_string())?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).map_err(|e| e.to_string())?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn create_admin_user(
    config: &Config,
    email: Option<String>,
    name: Option<String>,
    password: Option<String>,
) -> Result<(), String> {
    let conn = open_existing(config)?;

    let email = match email {
        Some(email) => email,
        None => prompt("Email")?,
    };
    let name = match name {
        Some(name) => name,
        None => prompt("Name")?,
    };
    let password = match password {
        Some(password) => password,
        None => prompt("Password (min. 12 characters)")?,
    };

    let (email, name) = validate_new_user(&email, &name, &password).map_err(|e| e.to_string())?;
    let user = users_db_operations::create_user(&conn, &email, &name, &password, Role::Admin)
        .map_err(|e| e.to_string())?;
    println!("✅ Admin user '{}' created successfully (id {}).", user.email, user.id);
    Ok(())
}

fn list_users(config: &Config) -> Result<(), String> {
    let conn = open_existing(config)?;
    let users = users_db_operations::read_all_users(&conn).map_err(|e| e.to_string())?;

    println!("Listing users:");
    if users.is_empty() {
        println!("- (none)");
    }
    for user in users {
        let status = if user.is_active { "active" } else { "inactive" };
        println!("- [{}] {} <{}> ({}, {})", user.id, user.name, user.email, user.role.as_str(), status);
    }
    Ok(())
}
