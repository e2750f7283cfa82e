use clap::Parser;
use client::input::InputManager;
use client::network::Client;
use log::{debug, info, warn};
use shared::{ConnectionStatus, MessageType, NetConfig, WorldState};
use std::net::IpAddr;
use std::time::Instant;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    server: IpAddr,

    /// Server port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Local port to bind (0 picks an ephemeral port)
    #[arg(short, long, default_value = "0")]
    bind_port: u16,

    /// Input ticks per second
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = NetConfig {
        server_address: args.server,
        server_port: args.port,
        client_port: args.bind_port,
        ..NetConfig::default()
    };

    let mut client = Client::new(&config)?;
    client.begin()?;
    info!("Connecting to {} from {}", client.server_addr(), client.local_addr());

    let mut inputs = InputManager::default();
    let mut rng = rand::thread_rng();
    let mut ticker = interval(Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                while let Some(message) = client.next_message() {
                    match message.message_type() {
                        MessageType::ConnectionAccepted => {
                            info!("Joined as player {:?}", client.client_index());
                        }
                        MessageType::WorldSnapshot => match WorldState::from_bytes(&message.body) {
                            Ok(world) => debug!(
                                "Snapshot #{}: {:?}",
                                message.header.sequence_id,
                                world.players()
                            ),
                            Err(e) => warn!("Unreadable snapshot: {}", e),
                        },
                        MessageType::ConnectionDenied => warn!("Server is full"),
                        MessageType::Disconnected => info!("Server closed the session"),
                        _ => {}
                    }
                }

                if client.connection_status() == ConnectionStatus::Disconnected {
                    break;
                }

                if client.maybe_timeout() {
                    warn!("Server timed out");
                    break;
                }

                if client.is_connected() {
                    if let Some(input) = inputs.update(&mut rng, Instant::now()) {
                        if let Err(e) = client.send_inputs(&input) {
                            warn!("Failed to send inputs: {}", e);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, disconnecting");
                break;
            }
        }
    }

    client.shutdown();
    Ok(())
}
