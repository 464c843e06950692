use clap::Parser;
use log::info;
use server::network::Server;
use shared::{CanvasSpec, PaintConfig};
use std::time::Duration;

/// Command line arguments for the paint relay server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Maximum participants in the room
    #[clap(short, long, default_value = "8")]
    max_clients: usize,
    /// Round length in seconds
    #[clap(short, long, default_value = "90")]
    round_secs: u64,
    /// Canvas width in pixels
    #[clap(long, default_value_t = shared::CANVAS_WIDTH)]
    width: f32,
    /// Canvas height in pixels
    #[clap(long, default_value_t = shared::CANVAS_HEIGHT)]
    height: f32,
    /// Territory cell size in pixels
    #[clap(long, default_value_t = shared::CELL_SIZE)]
    cell_size: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    if args.tick_rate == 0 {
        return Err("tick rate must be positive".into());
    }
    let config = PaintConfig {
        width: args.width,
        height: args.height,
        cell_size: args.cell_size,
        ..PaintConfig::default()
    };
    CanvasSpec::from(&config)
        .validate()
        .map_err(|e| format!("unusable canvas: {}", e))?;
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate as f64);
    let address = format!("{}:{}", args.host, args.port);

    info!(
        "Starting paint server on {} ({}x{} canvas, {} s rounds, {} Hz)",
        address, config.width, config.height, args.round_secs, args.tick_rate
    );

    let mut server = Server::new(
        &address,
        tick_duration,
        args.max_clients,
        config,
        Duration::from_secs(args.round_secs),
    )
    .await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
