//! CLI commands for Switchboard using clap.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, load_settings_or_default, Settings};
use crate::identity::{departments, users, NewUser, Role, User};
use crate::store::Database;
use crate::web::api::dashboard::collect_stats;
use crate::web::auth::hash_password;

/// Switchboard - customer-support messaging backend.
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version)]
#[command(about = "Switchboard - conversations, routing and transfers for support teams", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, env = "SWITCHBOARD_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(long, short, env = "SWITCHBOARD_PORT")]
        port: Option<u16>,

        /// SQLite database file
        #[arg(long, env = "SWITCHBOARD_DATABASE")]
        database: Option<PathBuf>,
    },

    /// Write default settings and create the database
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },

    /// Show database location and totals
    Status,

    /// Manage administrators
    #[command(subcommand)]
    Admin(AdminCommand),

    /// Manage departments
    #[command(subcommand)]
    Department(DepartmentCommand),
}

#[derive(Subcommand)]
pub enum AdminCommand {
    /// Create an administrator account
    Create {
        #[arg(long)]
        username: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// Prompted for when omitted
        #[arg(long, env = "SWITCHBOARD_ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DepartmentCommand {
    /// Create a department
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// List departments
    List,
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Serve { host, port, database } => {
                cmd_serve(host.clone(), *port, database.clone()).await
            }
            Command::Init { force } => cmd_init(*force),
            Command::Status => cmd_status(),
            Command::Admin(cmd) => cmd_admin(cmd),
            Command::Department(cmd) => cmd_department(cmd),
        }
    }
}

/// Apply command-line overrides on top of loaded settings.
fn apply_overrides(
    mut settings: Settings,
    host: Option<String>,
    port: Option<u16>,
    database: Option<PathBuf>,
) -> Settings {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
    if database.is_some() {
        settings.database.path = database;
    }
    settings
}

fn open_database(settings: &Settings) -> Result<Database> {
    let path = settings.database.resolved_path()?;
    Database::open(&path).with_context(|| format!("opening database at {}", path.display()))
}

// Command implementations

async fn cmd_serve(host: Option<String>, port: Option<u16>, database: Option<PathBuf>) -> Result<()> {
    let settings = apply_overrides(load_settings_or_default(), host, port, database);
    config::validate_settings(&settings)?;

    println!(
        "Starting Switchboard on {}:{}",
        settings.server.host, settings.server.port
    );
    println!("Press Ctrl+C to stop");

    crate::web::run_server(settings).await?;
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let settings_path = config::get_settings_path()?;
    let settings = if settings_path.exists() && !force {
        println!("Keeping existing settings at {}", settings_path.display());
        config::load_settings()?
    } else {
        let settings = Settings::default();
        config::save_settings(&settings)?;
        println!("Wrote default settings to {}", settings_path.display());
        settings
    };

    let db = open_database(&settings)?;
    let conn = db.connect()?;
    let department_id = departments::ensure_department(&conn, &settings.channel.default_department)?;
    println!("Database ready at {}", db.path().display());
    println!(
        "Default department: {} (id {})",
        settings.channel.default_department, department_id
    );
    Ok(())
}

fn cmd_status() -> Result<()> {
    let settings = load_settings_or_default();
    let db = open_database(&settings)?;
    let stats = collect_stats(&db.connect()?)?;

    println!("Database: {}", db.path().display());
    println!("Users: {}", stats.total_users);
    println!("Departments: {}", stats.total_departments);
    println!("Active conversations: {}", stats.active_conversations);
    println!("Transfers: {}", stats.total_transfers);
    Ok(())
}

fn cmd_admin(cmd: &AdminCommand) -> Result<()> {
    match cmd {
        AdminCommand::Create {
            username,
            name,
            email,
            password,
        } => {
            let password = match password {
                Some(p) => p.clone(),
                None => prompt("Password: ")?,
            };
            let db = open_database(&load_settings_or_default())?;
            let admin = create_admin(&db, username, name, email, &password)?;
            println!("Created admin '{}' (id {})", admin.username, admin.id);
        }
    }
    Ok(())
}

fn cmd_department(cmd: &DepartmentCommand) -> Result<()> {
    let db = open_database(&load_settings_or_default())?;
    let conn = db.connect()?;

    match cmd {
        DepartmentCommand::Create { name, description } => {
            let department = departments::create_department(&conn, name, description.as_deref())?;
            println!("Created department '{}' (id {})", department.name, department.id);
        }
        DepartmentCommand::List => {
            println!("Departments:");
            for department in departments::list_departments(&conn)? {
                let state = if department.is_active { "" } else { " [inactive]" };
                println!(
                    "  {}: {} ({} users){}",
                    department.id, department.name, department.user_count, state
                );
            }
        }
    }
    Ok(())
}

fn create_admin(db: &Database, username: &str, name: &str, email: &str, password: &str) -> Result<User> {
    if password.is_empty() {
        return Err(anyhow::anyhow!("Password is required"));
    }

    let conn = db.connect()?;
    let admin = users::create_user(
        &conn,
        &NewUser {
            username: username.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            role: Role::Admin,
            department_id: None,
        },
    )?;
    Ok(admin)
}

fn prompt(label: &str) -> Result<String> {
    use std::io::{self, BufRead, Write};

    let mut stdout = io::stdout();
    print!("{}", label);
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
