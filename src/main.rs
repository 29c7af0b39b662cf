use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use usb_sensors::sensor::{find_sensors, NativeEnumerator};
use usb_sensors::SensorConfig;

#[derive(Parser, Debug)]
#[command(name = "usb-sensors", version, about = "USB-TnH / USB-PA sensor tool")]
struct Cli {
    /// JSON config file (PA identifiers, light policy, locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List sensors per family
    List,
    /// Show model, firmware version and name
    Info { port: String },
    /// Read current values
    Read {
        port: String,
        /// Light the indicator while reading
        #[arg(long)]
        light: bool,
        /// Use the GJSON aggregate instead of single reads
        #[arg(long)]
        json: bool,
    },
    /// Print temperature/humidity repeatedly as JSON lines
    Watch {
        port: String,
        #[arg(long, default_value_t = 10)]
        count: u32,
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
        #[arg(long)]
        light: bool,
    },
    /// Rename a sensor (1 to 8 characters)
    SetName { port: String, name: String },
    /// Switch the indicator light
    Led { port: String, state: LightState },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LightState {
    On,
    Off,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => SensorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SensorConfig::default(),
    };

    match cli.command {
        Commands::List => {
            let families = config.family_table()?;
            let found = find_sensors(&NativeEnumerator, &families);
            for (family, ports) in &found {
                if families.id_of(*family).is_none() {
                    println!("{}: (identifiers not configured)", family);
                    continue;
                }
                if ports.is_empty() {
                    println!("{}: none", family);
                }
                for port in ports {
                    match config.location_of(port) {
                        Some(location) => println!("{}: {} ({})", family, port, location),
                        None => println!("{}: {}", family, port),
                    }
                }
            }
        }
        Commands::Info { port } => {
            let sensor = config.sensor(port.as_str());
            let identification = sensor
                .identification()
                .with_context(|| format!("Failed to identify sensor on {}", port))?;
            println!("{}", identification);
        }
        Commands::Read { port, light, json } => {
            let mut sensor = config.sensor(port.as_str());
            if light {
                sensor.set_read_light(true);
            }
            if json {
                match sensor.read_all()? {
                    Some(reading) => println!("{}", serde_json::to_string(&reading)?),
                    None => println!("no data"),
                }
            } else {
                println!("temperature: {}", show(sensor.temperature()?));
                println!("humidity: {}", show(sensor.humidity()?));
                println!("pressure: {}", show(sensor.pressure()?));
            }
        }
        Commands::Watch {
            port,
            count,
            interval_ms,
            light,
        } => {
            let mut sensor = config.sensor(port.as_str());
            if light {
                sensor.set_read_light(true);
            }
            for _ in 0..count {
                let measurement = sensor.measure()?;
                println!("{}", serde_json::to_string(&measurement)?);
                thread::sleep(Duration::from_millis(interval_ms));
            }
        }
        Commands::SetName { port, name } => {
            let sensor = config.sensor(port.as_str());
            if !sensor.set_name(&name)? {
                bail!("Sensor on {} refused name {:?}", port, name);
            }
            println!("{} renamed to {}", port, name);
        }
        Commands::Led { port, state } => {
            let sensor = config.sensor(port.as_str());
            let on = matches!(state, LightState::On);
            if !sensor.set_led(on)? {
                bail!("Sensor on {} did not acknowledge the light command", port);
            }
        }
    }

    Ok(())
}

fn show(value: Option<f64>) -> String {
    value.map_or_else(|| "no data".to_string(), |v| v.to_string())
}
