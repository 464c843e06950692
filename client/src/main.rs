use clap::Parser;
use client::bot::Bot;
use client::game::ClientGame;
use client::input::{ControlAction, InputManager};
use client::network::NetworkClient;
use client::rendering::{HudConfig, Renderer};
use log::{error, info};
use macroquad::prelude::*;
use shared::{timestamp_ms, CanvasSpec, PaintConfig};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Let a random-walk bot paint instead of the mouse
    #[arg(short = 'b', long)]
    bot: bool,

    /// Seed for the bot's random walk
    #[arg(long)]
    bot_seed: Option<u64>,
}

fn window_conf() -> Conf {
    let (width, height) = Renderer::window_size(CanvasSpec::from(&PaintConfig::default()));
    Conf {
        window_title: "Paint Battle".to_owned(),
        window_width: width as i32,
        window_height: height as i32,
        window_resizable: false,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Client stopped: {}", e);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("Controls: drag to paint, 1-6 color, B brush, C clear, R resync, G grid");

    // The frame loop runs on macroquad's executor; sockets live on tokio
    let runtime = tokio::runtime::Runtime::new()?;
    let mut network = runtime.block_on(NetworkClient::connect(&args.server, args.fake_ping))?;

    let mut game = ClientGame::new(PaintConfig::default(), Instant::now());
    let mut renderer = Renderer::new(game.session().canvas_spec());
    let mut input = InputManager::new();
    let mut bot = args.bot.then(|| match args.bot_seed {
        Some(seed) => Bot::from_seed(seed),
        None => Bot::new(),
    });
    let hud = HudConfig {
        fake_ping_ms: args.fake_ping,
        bot: bot.is_some(),
    };

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }

        let now = Instant::now();
        let now_ms = timestamp_ms();

        while let Some(packet) = network.try_recv() {
            game.handle_packet(packet, now, now_ms);
        }

        let canvas = game.session().canvas_spec();
        let (actions, pointer) = input.update(canvas.width, canvas.height);
        for action in actions {
            match action {
                ControlAction::ToggleGrid => renderer.toggle_grid(),
                action => game.handle_control(action, now),
            }
        }

        match bot.as_mut() {
            Some(bot) => bot.step(&mut game, now_ms),
            None => {
                if let Some(event) = pointer {
                    game.handle_pointer(event, now_ms);
                }
            }
        }

        game.tick(now, now_ms);

        for packet in game.drain_outbound() {
            if !network.send(packet) {
                return Err("network sender stopped".into());
            }
        }

        renderer.render(&game, &hud, now);
        next_frame().await;
    }

    info!("Shutting down");
    for packet in game.shutdown() {
        network.send(packet);
    }
    // Give the sender task a moment to flush the goodbye
    runtime.block_on(tokio::time::sleep(
        Duration::from_millis(50 + args.fake_ping / 2),
    ));

    Ok(())
}
