use super::{open_service, CmdResult};

pub async fn run(user: &str, zone: &str) -> CmdResult {
    let (_, service) = open_service()?;
    let transition = service.set_timezone(user, zone).await?;
    match (transition.record.timezone, transition.record.last_reset) {
        (Some(tz), Some(today)) => println!("{user}: timezone {tz}, today is {today}"),
        _ => println!("ok"),
    }
    Ok(())
}
