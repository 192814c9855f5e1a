//! `sensorsp-session` command-line client.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use tracing_subscriber::EnvFilter;

use sensorsp_session::{
    create_session_manager, Config, LoginCredentials, RegisterCredentials, SessionManager,
};

#[derive(Parser, Debug)]
#[command(name = "sensorsp-session", version, about = "Sign in to the sensor dashboard API")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current session
    Status,
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        username: Option<String>,
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Change the signed-in account's password
    ChangePassword,
    /// Permanently delete the signed-in account
    DeleteAccount {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sensorsp_session=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    let manager = create_session_manager(&config).await?;

    match cli.command {
        Command::Status => print_status(&manager),
        Command::Login { email } => {
            let email = prompt_or(email, "Email")?;
            let password = Password::new().with_prompt("Password").interact()?;
            manager.login(&LoginCredentials::new(email, password)).await?;
            print_status(&manager);
        }
        Command::Register { username, email } => {
            let username = prompt_or(username, "Username")?;
            let email = prompt_or(email, "Email")?;
            let password = Password::new()
                .with_prompt("Password")
                .with_confirmation("Confirm password", "Passwords do not match")
                .interact()?;
            manager
                .register(&RegisterCredentials::new(username, email, password))
                .await?;
            print_status(&manager);
        }
        Command::Logout => {
            manager.logout().await;
            println!("Signed out");
        }
        Command::ChangePassword => {
            require_signed_in(&manager)?;
            let current = Password::new().with_prompt("Current password").interact()?;
            let new = Password::new()
                .with_prompt("New password")
                .with_confirmation("Confirm new password", "Passwords do not match")
                .interact()?;
            let message = manager.change_password(&current, &new).await?;
            println!("{message}");
        }
        Command::DeleteAccount { yes } => {
            require_signed_in(&manager)?;
            let confirmed = yes
                || Confirm::new()
                    .with_prompt("Delete this account permanently?")
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("Aborted");
                return Ok(());
            }
            let message = manager.delete_account().await?;
            println!("{message}");
        }
    }
    Ok(())
}

fn prompt_or(value: Option<String>, prompt: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => Ok(Input::<String>::new().with_prompt(prompt).interact_text()?),
    }
}

fn require_signed_in(manager: &SessionManager) -> Result<()> {
    if !manager.is_authenticated() {
        bail!("Not signed in. Run `sensorsp-session login` first");
    }
    Ok(())
}

fn print_status(manager: &SessionManager) {
    match manager.user() {
        Some(user) => {
            println!("Signed in as {} <{}>", user.username, user.email);
            println!("  id:       {}", user.id);
            println!("  since:    {}", user.created_at);
            println!("  phase:    {:?}", manager.phase());
        }
        None => println!("Not signed in"),
    }
}
