use clap::Parser;
use log::{error, info};
use server::content::ContentStore;
use server::game::GameState;
use server::network::Server;
use server::simulation::{Simulation, SimulationConfig};
use shared::{BROADCAST_RATE, COUNTDOWN_SECONDS, DEFAULT_PORT, HP_DECAY_PER_SECOND};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory holding config.json and the tables it names
    #[arg(short, long, default_value = "content")]
    content_dir: PathBuf,

    /// Simulation poll interval in milliseconds
    #[arg(long, default_value = "1")]
    poll_ms: u64,

    /// Seconds between race start and the first update
    #[arg(long, default_value_t = COUNTDOWN_SECONDS)]
    countdown: f32,

    /// State broadcasts per second
    #[arg(short, long, default_value_t = BROADCAST_RATE)]
    broadcast_rate: u32,

    /// HP lost per second while running
    #[arg(short, long, default_value_t = HP_DECAY_PER_SECOND)]
    decay: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting server...");
    info!("Loading content from {}", args.content_dir.display());
    let content = Arc::new(ContentStore::load_dir(&args.content_dir)?);

    let config = SimulationConfig {
        poll_interval: Duration::from_millis(args.poll_ms.max(1)),
        countdown: args.countdown,
        broadcast_step: 1.0 / args.broadcast_rate.max(1) as f32,
        hp_decay_per_second: args.decay,
        ..SimulationConfig::default()
    };
    info!(
        "Countdown {}s, {} broadcasts/s, decay {}/s",
        config.countdown,
        args.broadcast_rate.max(1),
        config.hp_decay_per_second
    );

    let address = format!("{}:{}", args.host, args.port);
    let poll_interval = config.poll_interval;
    let mut server = Server::new(
        &address,
        GameState::new(content),
        Simulation::new(config),
        poll_interval,
    )
    .await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}
