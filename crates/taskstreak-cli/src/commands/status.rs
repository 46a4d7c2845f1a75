use taskstreak_core::UserStatus;

use super::{open_service, CmdResult};

pub async fn run(user: &str, json: bool) -> CmdResult {
    let (_, service) = open_service()?;
    let status = service.status(user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

pub fn print_status(status: &UserStatus) {
    let record = &status.record;
    println!(
        "{}: {}/{} done, streak {} ({}% of goal) - {}",
        status.user, status.completed, status.total, record.streak, status.progress_percent, status.message
    );
    for (index, task) in record.tasks.iter().enumerate() {
        let mark = if task.completed { "x" } else { " " };
        println!("  [{mark}] {index}: {}", task.text);
    }
    match record.timezone {
        Some(tz) => println!("timezone: {tz}"),
        None => println!("timezone: not set (daily reset is paused)"),
    }
    if let Some(date) = record.last_reset {
        println!("last reset: {date}");
    }
}
