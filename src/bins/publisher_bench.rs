use influx_batch_publisher::{
    BatchPublisher, FieldValue, MetricPublisher, PublisherOptions, UdpLineSink, UdpSinkOptions,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const SERVER_ADDRESS: &str = "127.0.0.1:8089";
const WRITE_TOTAL: usize = 1000 * 1000;

const MEASUREMENT_NAMES: &[&str] = &[
    "check_txrx",
    "check_cpe",
    "check_cpe_docsis",
    "check_bw",
    "check_uptime",
    "check_whatever",
    "idk_what_more_names_to_make",
];
const METRIC_NAMES: &[&str] = &["upbw", "dnbw", "uptx", "dntx", "cpu", "time"];
const UNITS: &[&str] = &["percent", "dbw"];

type FakePoint = (&'static str, Vec<(&'static str, &'static str)>, FieldValue);

fn create_fake_data(rng: &mut impl Rng) -> FakePoint {
    let measurement = MEASUREMENT_NAMES.choose(rng).copied().unwrap_or("check_txrx");
    let mut tags = vec![("metric", METRIC_NAMES.choose(rng).copied().unwrap_or("cpu"))];

    let mut unit = None;
    if rng.gen_bool(0.25) {
        unit = UNITS.choose(rng).copied();
        if let Some(unit) = unit {
            tags.push(("unit", unit));
        }
        if rng.gen_bool(0.25) {
            tags.push(("service", "service"));
        }
    }

    let value = match unit {
        Some("percent") => rng.gen::<f64>() * 100.0,
        Some("dbw") => -(rng.gen::<f64>() * 100.0),
        _ => rng.gen::<f64>(),
    };
    (measurement, tags, FieldValue::Float(value))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let destination = std::env::args()
        .nth(1)
        .unwrap_or_else(|| SERVER_ADDRESS.to_string())
        .parse()
        .expect("destination must be an ip:port address");

    let options = PublisherOptions::default();
    let batch_size = options.batch_size;
    let queue_capacity_trigger = options.queue_capacity_trigger;

    let sink = UdpLineSink::new(UdpSinkOptions::new(destination)).expect("failed to bind UDP socket");
    let publisher = BatchPublisher::new(sink, options);

    let mut rng = rand::thread_rng();
    let data: Vec<FakePoint> = (0..WRITE_TOTAL).map(|_| create_fake_data(&mut rng)).collect();

    let instant = Instant::now();
    for (measurement, tags, value) in data {
        publisher.write_batched(measurement, tags, value);
    }
    publisher.shutdown();

    println!(
        "Total time for writing {WRITE_TOTAL} metrics with batches of {batch_size} and a queue size of {queue_capacity_trigger}: {:?}ms",
        instant.elapsed().as_millis()
    );
}
