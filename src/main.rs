use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use camguard::clock::SystemClock;
use camguard::config::{CameraConfig, Config, DEFAULT_CONFIG_PATH};
use camguard::feed::FeedReader;
use camguard::throttle::GlobalSuppressionTable;
use camguard::Tracker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("camguard=debug".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = Config::load_from(&config_path)?;
    tracing::info!("loaded {} camera(s)", config.cameras.len());

    let global = GlobalSuppressionTable::new(config.global_suppression.clone());
    let tracker = Tracker::new(config.defaults(), global, Arc::new(SystemClock))?
        .with_rng_seed(config.rng_seed);
    let tracker = Arc::new(tracker);

    for cam_config in &config.cameras {
        tracker.configure(&cam_config.id, config.settings_for(cam_config))?;
    }

    let mut handles = Vec::new();

    for cam_config in config.cameras {
        let tracker = Arc::clone(&tracker);
        let camera_id = cam_config.id.clone();

        let handle = tokio::spawn(async move {
            run_camera(cam_config, tracker).await;
        });

        handles.push((camera_id, handle));
    }

    let stats_tracker = Arc::clone(&tracker);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            for camera_id in stats_tracker.camera_ids() {
                log_stats(&stats_tracker, &camera_id);
            }
        }
    });

    let reload_handle = tokio::spawn(watch_reload(config_path, Arc::clone(&tracker)));

    let cameras = async {
        for (camera_id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(camera = %camera_id, "camera task failed: {}", e);
            }
        }
    };

    tokio::select! {
        _ = cameras => {
            tracing::info!("all feeds finished");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    stats_handle.abort();
    reload_handle.abort();

    for camera_id in tracker.camera_ids() {
        log_stats(&tracker, &camera_id);
    }
    tracing::info!("shutdown complete");

    Ok(())
}

fn log_stats(tracker: &Tracker, camera_id: &str) {
    let Some(snapshot) = tracker.snapshot(camera_id) else {
        return;
    };
    let longest_dwell_secs = snapshot
        .persons
        .iter()
        .filter_map(|p| p.longest_dwell.map(|(_, secs)| secs))
        .fold(0.0, f64::max);

    tracing::info!(
        camera = %camera_id,
        frames = snapshot.stats.frames,
        tracked = snapshot.persons.len(),
        created = snapshot.stats.persons_created,
        evicted = snapshot.stats.persons_evicted,
        allowed = snapshot.stats.alerts_allowed,
        suppressed = snapshot.stats.total_suppressed(),
        cooldown_secs = ?snapshot.cooldown_remaining_secs,
        longest_dwell_secs = format!("{:.1}", longest_dwell_secs),
        "camera stats"
    );
}

async fn run_camera(config: CameraConfig, tracker: Arc<Tracker>) {
    let camera_id = config.id.clone();
    let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(
        config.extract_interval_ms.max(1),
    ));

    loop {
        tracing::info!(camera = %camera_id, feed = %config.feed.display(), "opening feed");

        let mut reader = match FeedReader::open(&config.feed).await {
            Ok(reader) => reader,
            Err(e) => {
                tracing::error!(camera = %camera_id, "failed to open feed: {}", e);
                if !config.loop_feed {
                    return;
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                continue;
            }
        };

        let mut frames = 0u64;
        loop {
            interval.tick().await;

            let frame = match reader.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(camera = %camera_id, "feed read failed: {}", e);
                    break;
                }
            };
            frames += 1;

            let outcome = tracker.process(&camera_id, &frame.detections, frame.alert);
            tracing::trace!(
                camera = %camera_id,
                frame = frames,
                detections = frame.detections.len(),
                matched = outcome.assignment.len(),
                "frame processed"
            );
        }

        tracing::info!(
            camera = %camera_id,
            feed = %reader.path().display(),
            frames,
            skipped = reader.skipped(),
            "end of feed"
        );

        if !config.loop_feed {
            return;
        }
    }
}

fn apply_config(tracker: &Tracker, config: &Config) {
    let running = tracker.camera_ids();
    for cam_config in &config.cameras {
        if !running.contains(&cam_config.id) {
            tracing::warn!(camera = %cam_config.id, "new camera ignored until restart");
            continue;
        }
        if let Err(e) = tracker.configure(&cam_config.id, config.settings_for(cam_config)) {
            tracing::error!(camera = %cam_config.id, "failed to apply settings: {}", e);
        }
    }
    tracker.global().set_intervals(&config.global_suppression);
}

#[cfg(unix)]
async fn watch_reload(path: PathBuf, tracker: Arc<Tracker>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::error!("failed to install SIGHUP handler: {}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        tracing::info!(path = %path.display(), "reloading configuration");
        match Config::load_from(&path) {
            Ok(config) => apply_config(&tracker, &config),
            Err(e) => tracing::error!("failed to reload configuration: {}", e),
        }
    }
}

#[cfg(not(unix))]
async fn watch_reload(_path: PathBuf, _tracker: Arc<Tracker>) {
    std::future::pending::<()>().await
}
