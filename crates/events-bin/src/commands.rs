//! Subcommand implementations.

use event_pool::DispatchReport;
use events_config_and_utils::{Config, Paths};
use events_tracker::{EventsClient, TrackerResult};
use serde_json::{Map, Value};
use tracing::info;

/// Parse a `key=value` property. The value is JSON if it parses, a string otherwise.
pub fn parse_property(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property name in '{}'", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn describe(report: DispatchReport) -> String {
    match report {
        DispatchReport::Skipped => "dispatch already in flight".to_string(),
        DispatchReport::Idle => "nothing to dispatch".to_string(),
        DispatchReport::Shipped { sent, removed } => {
            format!("sent {} event(s), removed {}", sent, removed)
        }
    }
}

pub async fn track(
    config: &Config,
    paths: &Paths,
    event_type: String,
    properties: Vec<(String, Value)>,
    dispatch: bool,
) -> TrackerResult<()> {
    let client = EventsClient::new(config, paths)?;
    client.hydrate().await;
    let properties: Map<String, Value> = properties.into_iter().collect();

    let id = client.track(event_type, properties)?;
    println!("Tracked {}", id);

    if dispatch {
        println!("{}", describe(client.dispatch_now().await));
    }

    client.flush().await;
    println!("{} event(s) pending", client.pending_count());
    Ok(())
}

pub async fn dispatch(config: &Config, paths: &Paths) -> TrackerResult<()> {
    let client = EventsClient::new(config, paths)?;
    client.hydrate().await;
    println!("{}", describe(client.dispatch_now().await));
    client.flush().await;
    println!("{} event(s) pending", client.pending_count());
    Ok(())
}

pub fn status(config: &Config, paths: &Paths) -> TrackerResult<()> {
    let client = EventsClient::new(config, paths)?;
    println!("Collector:  {}", config.collector_url);
    println!("Cache file: {}", paths.cache_file().display());
    println!("Pending:    {}", client.pending_count());
    println!("Dry run:    {}", config.dry_run);
    Ok(())
}

pub async fn run(config: &Config, paths: &Paths) -> TrackerResult<()> {
    let client = EventsClient::new(config, paths)?;
    client.hydrate().await;
    let mut failures = client.subscribe_failures();

    client.start()?;
    info!(
        interval_secs = config.dispatch_interval_secs,
        pending = client.pending_count(),
        "Running dispatch loop, press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            failure = failures.recv() => match failure {
                Ok(failure) => {
                    println!(
                        "Shipment failed: id={} status={} removed={}",
                        failure.event_id().unwrap_or("?"),
                        failure.status,
                        failure.removing_from_cache
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.stop().await;
    client.flush().await;
    info!(pending = client.pending_count(), "Stopped");
    Ok(())
}
