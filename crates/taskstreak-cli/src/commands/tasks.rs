use clap::Subcommand;
use taskstreak_core::{Event, Task, Transition};

use super::{open_service, CmdResult};

#[derive(Subcommand)]
pub enum TasksAction {
    /// Mark a task done
    Check { user: String, index: usize },
    /// Mark a task not done
    Uncheck { user: String, index: usize },
    /// Replace the whole checklist from a JSON array of {text, completed}
    Set {
        user: String,
        /// e.g. '[{"text":"Stretch","completed":true}]'
        json: String,
    },
}

pub async fn run(action: TasksAction) -> CmdResult {
    let (_, service) = open_service()?;

    let transition = match action {
        TasksAction::Check { user, index } => service.toggle_task(&user, index, true).await?,
        TasksAction::Uncheck { user, index } => service.toggle_task(&user, index, false).await?,
        TasksAction::Set { user, json } => {
            let tasks: Vec<Task> = serde_json::from_str(&json)?;
            service.update_tasks(&user, tasks).await?
        }
    };

    report(&transition);
    Ok(())
}

fn report(transition: &Transition) {
    let record = &transition.record;
    println!("{}/{} done, streak {}", record.completed_count(), record.tasks.len(), record.streak);
    for event in &transition.events {
        if matches!(event, Event::StreakIncremented { .. } | Event::StreakBroken { .. }) {
            println!("{}", event.describe());
        }
    }
}
