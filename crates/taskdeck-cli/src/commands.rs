//! Runs a parsed `Command` against the API client.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use taskdeck_core::models::{PasswordChange, Registration, TaskId, TaskStatus};
use taskdeck_core::{ApiClient, Config};

use crate::cli::{self, Command};
use crate::output;

/// Maximum length for username input.
const MAX_USERNAME_LENGTH: usize = 150;

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_password(label: &str) -> Result<String> {
    rpassword::prompt_password(label).context("Failed to read password")
}

/// Ask for a new password twice; the server re-checks the confirmation.
fn prompt_new_password() -> Result<(String, String)> {
    let password = prompt_password("New password: ")?;
    let confirm = prompt_password("Confirm new password: ")?;
    if password != confirm {
        bail!("passwords do not match");
    }
    Ok((password, confirm))
}

fn require_login(client: &ApiClient) -> Result<()> {
    if !client.is_authenticated() {
        bail!("not logged in - run `taskdeck login` first");
    }
    Ok(())
}

async fn set_status(client: &ApiClient, id: TaskId, status: TaskStatus) -> Result<()> {
    require_login(client)?;
    let task = client.update_task_status(id, status).await?;
    println!("{}", output::task_line(&task));
    Ok(())
}

async fn bulk_status(client: &ApiClient, ids: &[TaskId], status: TaskStatus) -> Result<()> {
    require_login(client)?;
    let result = client.bulk_update_status(ids, status).await?;
    let verb = match status {
        TaskStatus::Done => "completed",
        TaskStatus::Archived => "archived",
        TaskStatus::Pending => "reopened",
    };
    println!("{} task(s) {}", result.updated_count, verb);
    Ok(())
}

pub async fn run(client: &ApiClient, config: &mut Config, command: Command) -> Result<()> {
    match command {
        Command::Login { username } => {
            let username = match username.or_else(|| config.last_username.clone()) {
                Some(name) => name,
                None => prompt_line("Username: ")?,
            };
            if username.is_empty() || username.len() > MAX_USERNAME_LENGTH {
                bail!("invalid username");
            }
            let password = prompt_password(&format!("Password for {}: ", username))?;
            let user = client.login(&username, &password).await?;

            config.last_username = Some(username);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            info!("Login successful");
            println!("Logged in as {}", output::user(&user));
        }

        Command::Logout => {
            client.logout().await;
            println!("Logged out.");
        }

        Command::Whoami => {
            require_login(client)?;
            let user = client.get_profile().await?;
            println!("{}", output::user(&user));
        }

        Command::Register {
            username,
            email,
            first_name,
            last_name,
        } => {
            let (password, password_confirm) = prompt_new_password()?;
            let registration = Registration {
                username,
                email,
                password,
                password_confirm,
                first_name,
                last_name,
            };
            let user = client.register(&registration).await?;
            println!("Registered {}. Run `taskdeck login` to sign in.", user.username);
        }

        Command::Passwd => {
            require_login(client)?;
            let old_password = prompt_password("Current password: ")?;
            let (new_password, new_password_confirm) = prompt_new_password()?;
            client
                .change_password(&PasswordChange {
                    old_password,
                    new_password,
                    new_password_confirm,
                })
                .await?;
            println!("Password changed.");
        }

        Command::Profile {
            email,
            first_name,
            last_name,
        } => {
            require_login(client)?;
            let user = match cli::profile_update(email, first_name, last_name) {
                Some(update) => client.update_profile(&update).await?,
                None => client.get_profile().await?,
            };
            println!("{}", output::user(&user));
        }

        Command::List(args) => {
            require_login(client)?;
            let page = client.list_tasks(&args.filters()).await?;
            println!("{}", output::task_page(&page));
        }

        Command::Show { id } => {
            require_login(client)?;
            let task = client.get_task(id).await?;
            println!("{}", output::task_detail(&task));
        }

        Command::Add(args) => {
            require_login(client)?;
            let task = client.create_task(&args.draft()).await?;
            println!("Created {}", output::task_line(&task));
        }

        Command::Edit(args) => {
            require_login(client)?;
            let task = client.update_task(args.id, &args.patch()).await?;
            println!("Updated {}", output::task_line(&task));
        }

        Command::Done { id } => set_status(client, id, TaskStatus::Done).await?,
        Command::Archive { id } => set_status(client, id, TaskStatus::Archived).await?,
        Command::Reopen { id } => set_status(client, id, TaskStatus::Pending).await?,

        Command::Rm { id } => {
            require_login(client)?;
            client.delete_task(id).await?;
            println!("Deleted task #{}", id);
        }

        Command::Stats => {
            require_login(client)?;
            let stats = client.task_stats().await?;
            println!("{}", output::stats(&stats));
        }

        Command::BulkDone { ids } => bulk_status(client, &ids, TaskStatus::Done).await?,
        Command::BulkArchive { ids } => bulk_status(client, &ids, TaskStatus::Archived).await?,

        Command::BulkRm { ids } => {
            require_login(client)?;
            let result = client.bulk_delete(&ids).await?;
            println!("{} task(s) deleted", result.deleted_count);
        }
    }
    Ok(())
}
