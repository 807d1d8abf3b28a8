//! Sensor injection tool
//!
//! Publishes sensor edges to the topics the controller subscribes to, so a
//! room can be exercised on the bench without the monitors attached.
//!
//! Usage:
//!   cargo run --bin sensorctl -- set lower on
//!   cargo run --bin sensorctl -- cross --person child --direction enter
//!   cargo run --bin sensorctl -- pulse proximity --hold-ms 2000

use childguard::infra::Config;
use childguard::io::Signal;
use clap::{Parser, Subcommand, ValueEnum};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[command(name = "sensorctl", about = "Publish sensor edges to a childguard room")]
struct Args {
    /// Path to the controller's TOML configuration (for broker and topics)
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Print every publish
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set one signal to a value
    Set {
        signal: Signal,
        #[arg(value_enum)]
        value: Level,
    },
    /// Raise a signal, hold it, then clear it
    Pulse {
        signal: Signal,
        #[arg(long, default_value_t = 500)]
        hold_ms: u64,
    },
    /// Play a full doorway crossing on the threshold sensors
    Cross {
        #[arg(long, value_enum)]
        person: Person,
        #[arg(long, value_enum)]
        direction: Way,
        /// Override the co-trigger window from the config
        #[arg(long)]
        window_ms: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Level {
    On,
    Off,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Person {
    Adult,
    Child,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Way {
    Enter,
    Exit,
}

/// Gap between the direction sensor and the threshold sensors on entry
const DIRECTION_LEAD_MS: u64 = 50;
/// How long a body stays in the door frame after classification
const DWELL_MS: u64 = 300;

struct Publisher {
    client: AsyncClient,
    config: Config,
    verbose: bool,
}

impl Publisher {
    fn topic(&self, signal: Signal) -> &str {
        let sensors = self.config.sensors();
        match signal {
            Signal::Lower => &sensors.lower_topic,
            Signal::Higher => &sensors.higher_topic,
            Signal::Direction => &sensors.direction_topic,
            Signal::Proximity => &sensors.proximity_topic,
            Signal::RoomMotion => &sensors.motion_topic,
        }
    }

    async fn set(&self, signal: Signal, on: bool) -> Result<(), rumqttc::ClientError> {
        let topic = self.topic(signal).to_string();
        let payload = if on { "1" } else { "0" };
        if self.verbose {
            println!("{:>10} -> {topic} = {payload}", signal.as_str());
        }
        self.client.publish(topic, QoS::AtLeastOnce, false, payload).await
    }

    async fn pulse(&self, signal: Signal, hold: Duration) -> Result<(), rumqttc::ClientError> {
        self.set(signal, true).await?;
        sleep(hold).await;
        self.set(signal, false).await
    }

    async fn cross(&self, person: Person, way: Way, window: Duration) -> Result<(), rumqttc::ClientError> {
        if matches!(way, Way::Enter) {
            self.pulse(Signal::Direction, Duration::from_millis(DIRECTION_LEAD_MS)).await?;
        }

        match person {
            Person::Adult => {
                self.set(Signal::Lower, true).await?;
                sleep(window / 10).await;
                self.set(Signal::Higher, true).await?;
                sleep(Duration::from_millis(DWELL_MS)).await;
                self.set(Signal::Higher, false).await?;
                self.set(Signal::Lower, false).await?;
            }
            Person::Child => {
                self.set(Signal::Lower, true).await?;
                sleep(window + Duration::from_millis(DWELL_MS)).await;
                self.set(Signal::Lower, false).await?;
            }
        }

        // Someone walking into the room shows up on the PIR
        if matches!(way, Way::Enter) {
            self.pulse(Signal::RoomMotion, Duration::from_millis(DWELL_MS)).await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::from_file(&args.config)?;

    let client_id = format!("childguard-sensorctl-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(10));
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 32);
    let verbose = args.verbose;
    let events = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) if verbose => println!("connected"),
                Ok(_) => {}
                Err(e) => {
                    eprintln!("mqtt error: {e}");
                    break;
                }
            }
        }
    });

    let window = config.window_both_sensors();
    let publisher = Publisher { client: client.clone(), config, verbose };

    match args.command {
        Command::Set { signal, value } => publisher.set(signal, matches!(value, Level::On)).await?,
        Command::Pulse { signal, hold_ms } => {
            publisher.pulse(signal, Duration::from_millis(hold_ms)).await?
        }
        Command::Cross { person, direction, window_ms } => {
            let window = window_ms.map(Duration::from_millis).unwrap_or(window);
            publisher.cross(person, direction, window).await?
        }
    }

    // Let the event loop flush the queued publishes before disconnecting
    sleep(Duration::from_millis(200)).await;
    client.disconnect().await?;
    let _ = tokio::time::timeout(Duration::from_secs(1), events).await;
    Ok(())
}
