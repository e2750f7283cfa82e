use clap::Parser;
use log::{debug, info, warn};
use server::game::Game;
use server::network::Server;
use shared::NetConfig;
use std::net::IpAddr;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative UDP game server")]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of simultaneous clients
    #[arg(short, long, default_value = "8")]
    max_clients: u8,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let tick_rate = args.tick_rate.max(1);
    let config = NetConfig {
        server_address: args.host,
        server_port: args.port,
        max_clients: args.max_clients,
        timeout: Duration::from_secs(args.timeout_secs),
        ..NetConfig::default()
    };

    let mut server = Server::new(&config)?;
    server.begin()?;
    info!(
        "Server running on {} at {} Hz, {} slots",
        server.local_addr(),
        tick_rate,
        config.max_clients
    );

    // Ping once per second
    let mut game = Game::new(u64::from(tick_rate));
    let tick_duration = Duration::from_secs_f32(1.0 / tick_rate as f32);
    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_tick = Instant::now();
    let max_delta = 1.0 / 20.0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let mut dt = (now - last_tick).as_secs_f32();
                last_tick = now;

                if dt > max_delta {
                    warn!("Large delta time {:.3}s, capping to {:.3}s", dt, max_delta);
                    dt = max_delta;
                }

                let report = game.tick(&server, dt);
                let elapsed = now.elapsed();

                if game.tick_count() % 60 == 0 {
                    debug!(
                        "Tick {} took {:?}: {} connected, {} inputs applied",
                        game.tick_count(),
                        elapsed,
                        server.connected_count(),
                        report.inputs_applied
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    server.shutdown();
    Ok(())
}
