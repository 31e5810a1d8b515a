use entity_sorter::{Config, EntityId};
use tracing::Level;

mod entity;
mod transport;

#[tokio::main]
async fn main() {
    setup_tracing();

    let config = Config::from_env().expect("invalid sorter configuration");
    let chaos = transport::Chaos {
        seed: var("SEED", 0),
        duplicate_rate: rate("DUPLICATES", 0.25),
        ..Default::default()
    };
    let signals: u32 = var("SIGNALS", 50);

    let sender = EntityId::new("counter", "a");
    let receiver = EntityId::new("counter", "b");

    let (outgoing, incoming) = transport::channel(chaos);
    let window = config.window();

    let producer = tokio::spawn(entity::produce(
        sender.into(),
        receiver.clone().into(),
        signals,
        window,
        outgoing,
    ));
    let consumer = tokio::spawn(entity::consume(receiver, window, incoming));

    producer.await.expect("sender panicked");
    let counter = consumer.await.expect("receiver panicked");

    let expected: Vec<u32> = (1..=signals).collect();
    if counter.applied == expected {
        tracing::info!(total = counter.total, "all signals applied in order, exactly once");
    } else {
        tracing::warn!(applied = ?counter.applied, "signals applied out of order or repeated");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&counter.sorter).expect("failed to serialize sorter state")
    );
}

fn var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

/// A probability from the environment; out-of-range values are clamped, and
/// `NaN` falls back to `default`.
fn rate(name: &str, default: f64) -> f64 {
    let value: f64 = var(name, default);
    if value.is_nan() {
        default
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(debug_assertions)]
fn setup_tracing() {
    tracing_subscriber::fmt()
        .pretty()
        .with_max_level(Level::TRACE)
        .init();
}

#[cfg(not(debug_assertions))]
fn setup_tracing() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}
