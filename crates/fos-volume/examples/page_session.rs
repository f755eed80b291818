//! Example: one page session driven through the JSON message boundary
//!
//! Run with `RUST_LOG=fos_volume=debug` to see routing decisions.

use std::sync::Arc;
use std::time::Duration;

use fos_dom::{Event, EventType};
use fos_media::{HTMLMediaElement, MediaDocument};
use fos_volume::{VolumeConfig, VolumeController};
use smol::{Executor, Timer};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fos_volume=info".into()))
        .init();

    println!("fOS Volume v{}", fos_volume::VERSION);

    let ex = Arc::new(Executor::new());
    let document = MediaDocument::new("https://video.example.com/watch?v=42")?;
    document.append_media(HTMLMediaElement::video("/media/feature.mp4"));
    document.append_media(HTMLMediaElement::video("https://ads.example.net/spot.mp4"));

    let config = VolumeConfig::from_json(r#"{"ceiling": 400}"#)?;
    let controller = VolumeController::attach(document.clone(), config, ex.clone())?;

    smol::block_on(ex.run(async {
        let send = |request: &'static str| {
            let controller = &controller;
            async move {
                let reply = controller.handle_json(request).await?;
                println!("{request} -> {reply}");
                anyhow::Ok(())
            }
        };

        send(r#"{"action":"get-volume"}"#).await?;
        send(r#"{"action":"set-volume","volume":250}"#).await?;
        println!("waiting for a gesture: {}", controller.is_waiting_for_gesture());

        // The user clicks the page
        document.dispatch_event(Event::trusted(EventType::PointerDown, document.body()));
        Timer::after(Duration::from_millis(50)).await;

        // A late player shows up
        document.append_media(HTMLMediaElement::audio("/media/podcast.mp3"));
        Timer::after(controller.config().debounce() * 2).await;

        send(r#"{"action":"get-volume"}"#).await?;
        send(r#"{"action":"set-volume","volume":9000}"#).await?;
        anyhow::Ok(())
    }))?;

    for status in controller.snapshot() {
        println!(
            "{}: {:?} native={:.2} gain={}",
            status.id,
            status.classification,
            status.native_volume,
            status.gain.map_or_else(|| "-".to_string(), |g| format!("{g:.2}")),
        );
    }
    Ok(())
}
