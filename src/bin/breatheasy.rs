use breatheasy::bus::{shared_bus, AbsentBus, SharedBus};
use breatheasy::mqtt::{self, MqttTransport};
use breatheasy::publisher::{
    DiscoveryPublisher, LinkStatus, LogTransport, PublisherOptions, Transport,
};
use breatheasy::scheduler;
use breatheasy::store::{shared_store, JsonLinesStore, StationStore};
use breatheasy::{AcquisitionCycle, Config, Scheduler, Station};
use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "breatheasy.toml";
const CONNECT_GRACE: Duration = Duration::from_secs(5);

type CliResult = Result<(), Box<dyn std::error::Error>>;
type BoxedTransport = Box<dyn Transport + Send>;

#[tokio::main]
async fn main() -> CliResult {
    let matches = App::new("breatheasy")
        .version(env!("CARGO_PKG_VERSION"))
        .author("BreatheEasy Engineering Team")
        .about("🌬️  BreatheEasy - environmental sensor station")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults apply when missing)")
                .takes_value(true)
                .default_value(DEFAULT_CONFIG_PATH)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["table", "json"])
                .default_value("table")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("🚀 Run the acquisition loop and publish to MQTT")
                .arg(
                    Arg::with_name("dry-run")
                        .long("dry-run")
                        .help("Log messages instead of connecting to the broker"),
                ),
        )
        .subcommand(
            SubCommand::with_name("scan").about("🔍 Scan the bus and show detected devices"),
        )
        .subcommand(
            SubCommand::with_name("once")
                .about("📊 Run one acquisition cycle and print the readings"),
        )
        .subcommand(
            SubCommand::with_name("config").about("⚙️  Print the effective configuration"),
        )
        .get_matches();

    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);
    let format = matches.value_of("format").unwrap_or("table");
    let config = Config::load(config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match matches.subcommand() {
        ("run", Some(sub)) => handle_run(sub, config).await,
        ("scan", Some(_)) => handle_scan(&config, format),
        ("once", Some(_)) => handle_once(&config, format),
        ("config", Some(_)) => handle_config(&config, format),
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  breatheasy scan");
            println!("  breatheasy run --dry-run");
            Ok(())
        }
    }
}

fn open_bus(config: &Config) -> SharedBus {
    #[cfg(feature = "linux-i2c")]
    {
        match breatheasy::bus::open_linux_bus(config.bus.number) {
            Ok(bus) => return bus,
            Err(e) => warn!(
                "Cannot open I2C bus {}: {}, all sensors will be mocked",
                config.bus.number, e
            ),
        }
    }
    #[cfg(not(feature = "linux-i2c"))]
    info!("Built without I2C support, bus {} unavailable", config.bus.number);

    shared_bus(AbsentBus)
}

fn build_store(config: &Config) -> Result<StationStore, Box<dyn std::error::Error>> {
    let history = shared_store(config.storage.history_capacity);
    let file = match &config.storage.path {
        Some(path) => {
            info!("Appending readings to {}", path.display());
            Some(JsonLinesStore::open(path)?)
        }
        None => None,
    };
    Ok(StationStore::new(history, file))
}

fn build_publisher(
    config: &Config,
    transport: BoxedTransport,
    link: Arc<LinkStatus>,
) -> DiscoveryPublisher {
    DiscoveryPublisher::new(
        transport,
        link,
        config.mqtt.topics.clone(),
        config.device.clone(),
        PublisherOptions {
            eager_discovery: config.mqtt.eager_discovery,
        },
    )
}

async fn handle_run(matches: &ArgMatches<'_>, config: Config) -> CliResult {
    let dry_run = matches.is_present("dry-run");
    println!("{}", "🌬️  Starting BreatheEasy sensor station...".bright_green().bold());

    // `spare` closes the session if the scheduler task dies with the publisher
    let (link, transport, spare, event_task) = if dry_run {
        (
            Arc::new(LinkStatus::connected()),
            Box::new(LogTransport::new()) as BoxedTransport,
            Box::new(LogTransport::new()) as BoxedTransport,
            None,
        )
    } else {
        let link = Arc::new(LinkStatus::new());
        let (transport, eventloop) = MqttTransport::connect(&config.mqtt, Arc::clone(&link))?;
        let task = mqtt::spawn_event_loop(eventloop, Arc::clone(&link));
        (
            link,
            Box::new(transport.clone()) as BoxedTransport,
            Box::new(transport) as BoxedTransport,
            Some(task),
        )
    };

    if !link.wait_connected(CONNECT_GRACE).await {
        warn!("Broker not reachable yet, values are dropped until it is");
    }

    let mut station = Station::new(open_bus(&config), &config);
    let suite = station.select_sources();
    let (climate_backing, air_backing) = suite.backings();
    info!("Sources: climate {}, air quality {}", climate_backing, air_backing);

    let (climate, air_quality) = suite.into_boxed();
    let publisher = build_publisher(&config, transport, Arc::clone(&link));
    let store = Box::new(build_store(&config)?);
    let cycle = AcquisitionCycle::new(climate, air_quality, store, publisher);
    let scheduler =
        Scheduler::new(cycle, config.polling.interval()).with_link_updates(link.subscribe());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, finishing current cycle");
    let _ = shutdown_tx.send(true);

    match scheduler::join(scheduler_task).await {
        Ok((mut cycle, stats)) => {
            cycle.publisher_mut().shutdown();
            info!(
                "Stopped after {} cycles, {} readings; publisher {:?}",
                stats.cycles_started,
                stats.readings,
                cycle.publisher_mut().get_stats()
            );
        }
        Err(e) => {
            error!("Scheduler task failed: {}, closing the session anyway", e);
            build_publisher(&config, spare, Arc::clone(&link)).shutdown();
        }
    }

    if let Some(task) = event_task {
        mqtt::drain(task, config.shutdown.deadline()).await;
    }
    Ok(())
}

fn handle_scan(config: &Config, format: &str) -> CliResult {
    let mut station = Station::new(open_bus(config), config);
    let devices = station.scan_results().clone();
    let detected = station.detected_config();
    let suite = station.select_sources();
    let (climate, air_quality) = suite.backings();

    if format == "json" {
        let report = serde_json::json!({
            "devices": devices.as_slice(),
            "detected": detected,
            "sources": { "climate": climate, "air_quality": air_quality },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", "🔍 I2C Bus Scan".bright_blue().bold());
    println!("{}", "═══════════════".bright_blue());
    if devices.is_empty() {
        println!("{}", "No devices responded".yellow());
    }
    for device in &devices {
        let label = match device.family {
            Some(_) => device.label.bright_green(),
            None => device.label.dimmed(),
        };
        println!("  {}  {}", device.address.to_string().bright_white(), label);
    }

    let show = |name: &str, address: Option<breatheasy::bus::BusAddress>| match address {
        Some(address) => println!("  {:<8} {}", name, address.to_string().bright_green()),
        None => println!("  {:<8} {}", name, "not detected".yellow()),
    };
    println!("\n{}", "Verified devices".bright_white().bold());
    show("BME680", detected.bme680);
    show("SSD1322", detected.ssd1322);

    println!("\n{}", "Sensor sources".bright_white().bold());
    println!("  {:<22} {}", "temperature/humidity", colour_backing(climate));
    println!("  {:<22} {}", "air quality", colour_backing(air_quality));
    Ok(())
}

fn colour_backing(backing: breatheasy::sensors::Backing) -> ColoredString {
    if backing.is_real() {
        backing.to_string().bright_green()
    } else {
        backing.to_string().yellow()
    }
}

fn handle_once(config: &Config, format: &str) -> CliResult {
    let mut station = Station::new(open_bus(config), config);
    let (climate, air_quality) = station.select_sources().into_boxed();

    // Single pass: nothing to keep a broker session alive for
    let link = Arc::new(LinkStatus::connected());
    let publisher = build_publisher(config, Box::new(LogTransport::new()), link);
    let store = Box::new(build_store(config)?);
    let mut cycle = AcquisitionCycle::new(climate, air_quality, store, publisher);
    let readings = cycle.run_once();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(readings.as_slice())?);
        return Ok(());
    }

    println!("\n{}", "📊 Readings".bright_blue().bold());
    if readings.is_empty() {
        println!("{}", "No readings this cycle".yellow());
    }
    for reading in &readings {
        println!(
            "  {:<12} {:>10.2} {:<6} {}",
            reading.sensor_type.to_string().bright_white(),
            reading.value,
            reading.unit,
            reading.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string().dimmed()
        );
    }
    Ok(())
}

fn handle_config(config: &Config, format: &str) -> CliResult {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(())
}
