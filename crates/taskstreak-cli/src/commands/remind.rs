use chrono::{DateTime, Utc};
use clap::Subcommand;
use taskstreak_core::NewReminder;
use uuid::Uuid;

use super::{open_service, CmdResult};

#[derive(Subcommand)]
pub enum RemindAction {
    /// Schedule a reminder for one task
    Add {
        user: String,
        /// Index of the task the reminder belongs to
        #[arg(long)]
        task: usize,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: Option<String>,
        /// When to fire, RFC 3339 (e.g. 2024-06-11T20:00:00Z)
        #[arg(long)]
        at: DateTime<Utc>,
        /// Repeat at the same local time every day
        #[arg(long)]
        daily: bool,
    },
    /// List a user's reminders as JSON
    List { user: String },
    /// Remove a reminder by id
    Remove { user: String, id: Uuid },
}

pub async fn run(action: RemindAction) -> CmdResult {
    let (_, service) = open_service()?;

    match action {
        RemindAction::Add {
            user,
            task,
            title,
            body,
            at,
            daily,
        } => {
            let reminder = service
                .add_reminder(
                    &user,
                    NewReminder {
                        task_index: task,
                        title,
                        body,
                        time: at,
                        repeat_daily: daily,
                    },
                )
                .await?;
            println!("Reminder created: {}", reminder.id);
        }
        RemindAction::List { user } => {
            let reminders = service.reminders(&user).await?;
            println!("{}", serde_json::to_string_pretty(&reminders)?);
        }
        RemindAction::Remove { user, id } => {
            service.remove_reminder(&user, id).await?;
            println!("ok");
        }
    }
    Ok(())
}
