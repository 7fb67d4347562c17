// LensLink viewer: connects to the streamer, keeps the link alive, applies
// decoded distortion parameters on its own context (the render stand-in).

use lenslink_core::{ConnectionEvent, DistortionParameters};
use lenslink_viewer::config;
use lenslink_viewer::manager::{LinkManager, StopHandle};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<(), Box<dyn std::error::Error>> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("lenslink-viewer {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt::init();
    let cfg = config::load();
    tracing::info!(
        stream_port = cfg.stream_port,
        discovery_port = cfg.discovery_port,
        "starting viewer"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (manager, mut events) = LinkManager::start(cfg);
        tokio::spawn(stop_on_host_signal(manager.stop_handle()));

        // The render context applies the default correction until the first
        // parameter frame arrives.
        let mut params = DistortionParameters::default();
        tracing::info!(k1 = params.k1, k2 = params.k2, "using default correction");

        while let Some(event) = events.next().await {
            match event {
                ConnectionEvent::Connected => tracing::info!("link established"),
                ConnectionEvent::FrameDecoded(p) => {
                    params = p;
                    tracing::info!(
                        k1 = params.k1,
                        k2 = params.k2,
                        "applied distortion correction"
                    );
                }
                ConnectionEvent::Disconnected(reason) => {
                    tracing::info!(%reason, "link closed");
                }
                ConnectionEvent::Error(message) => tracing::warn!(%message, "link error"),
            }
        }
        manager.join().await;
    });
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then request link teardown. The event loop
/// keeps draining until the terminal event has been delivered.
async fn stop_on_host_signal(stop: StopHandle) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown requested");
    stop.stop();
}
