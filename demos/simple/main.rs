use std::time::Duration;

use serde_json::json;
use stashkv::{GetOptions, StashBuilder};

#[tokio::main]
async fn main() -> stashkv::Result<()> {
    let stash = StashBuilder::new().save_period(1).logger(|line| println!("{line}")).build().await?;

    let counters = stash.get("counters", GetOptions::default().with_default(json!({"runs": 0}))).await;
    let runs = counters.get_value("runs").and_then(|v| v.as_i64()).unwrap_or(0);
    counters.set("runs", runs + 1);
    println!("run #{}", runs + 1);

    // give the save pass a chance to run
    tokio::time::sleep(Duration::from_millis(1500)).await;
    println!("status: {:?}", stash.get_status("counters"));

    stash.deinit();
    Ok(())
}
