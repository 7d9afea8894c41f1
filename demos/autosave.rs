//! Console walk-through of the save service
//!
//! Run with `cargo run --example autosave`. Data goes to a temporary
//! directory, so every run starts fresh.

use savestate::{AppName, BackendKind, LifecycleEvent, SaveService, Settings, logging};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Profile {
    name: String,
    level: u32,
    unlocked: Vec<String>,
}

fn build(dir: &std::path::Path) -> SaveService {
    let settings = Settings {
        backend: BackendKind::File,
        auto_save_interval: 0.5,
        save_on_focus_lost: true,
        ..Settings::default()
    };
    SaveService::builder(AppName::new("com", "example", "autosave"))
        .with_data_dir(dir)
        .with_settings(settings)
        .with_observer(|err| eprintln!("save service reported: {err}"))
        .build()
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    logging::init_logging();

    let dir = tempfile::tempdir()?;
    let service = build(dir.path());
    service.initialize_async().await;
    println!("saving to {}", service.backend_location().unwrap_or_default());
    println!("save data present: {}", service.save_data_exists());

    let profile = Profile {
        name: "Ada".to_string(),
        level: 3,
        unlocked: vec!["forest".to_string(), "cave".to_string()],
    };
    service.save("profile", &profile);
    service.save("score", &42);

    // Let the timer flush once on its own.
    tokio::time::sleep(Duration::from_millis(700)).await;
    println!("last flush: {:?}", service.last_save_time());

    service.save("score", &43);
    let flushed = service.notify_async(LifecycleEvent::FocusLost).await;
    println!("focus loss flushed: {flushed}");
    service.dispose_async().await;

    let restarted = build(dir.path());
    restarted.initialize_async().await;
    let profile: Profile = restarted.load("profile", Profile::default());
    let score: u32 = restarted.load("score", 0);
    println!("restored {profile:?} with score {score}");
    println!("keys: {:?}", restarted.keys());

    restarted.delete_all_data();
    println!("save data present: {}", restarted.save_data_exists());
    restarted.dispose_async().await;
    Ok(())
}
