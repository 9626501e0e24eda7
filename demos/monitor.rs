use std::env;
use std::sync::Arc;
use std::time::Duration;

use bgh_smart::{
    AccessoryConfig, BghClient, Characteristic, CharacteristicSink, CharacteristicValue,
    MessageLogMode, Thermostat,
};

struct PrintSink;

impl CharacteristicSink for PrintSink {
    fn update(&self, characteristic: Characteristic, value: CharacteristicValue) {
        println!("[{characteristic}] {value:?}");
    }
}

#[tokio::main]
async fn main() -> bgh_smart::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: monitor <config.json> [--log <file>]");
        std::process::exit(2);
    };
    let config = AccessoryConfig::from_json(&std::fs::read_to_string(path)?)?;

    let mut builder = BghClient::builder(&config.home_id, &config.device_id);
    if let Some(i) = args.iter().position(|a| a == "--log")
        && let Some(log_path) = args.get(i + 1)
    {
        builder = builder.message_log(MessageLogMode::Diffed, log_path);
    }
    let client = Arc::new(builder.build()?);

    let thermostat = Thermostat::builder(client, config)
        .sink(Arc::new(PrintSink))
        .on_event(|event| println!("{event:?}"))
        .build();

    println!("Monitoring {}...", thermostat.name());
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        ticker.tick().await;
        match thermostat.refresh().await {
            Ok(status) => println!(
                "{} | target {} | mode: {}",
                status.temperature, status.target_temperature, status.mode
            ),
            Err(e) => eprintln!("Refresh error: {e}"),
        }
    }
}
