use clap::{Parser, Subcommand};
use client::bot::Autopilot;
use client::network::{self, BoxError, GameConnection};
use log::{info, warn};
use shared::{GameStatus, Packet, PlayerAction};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Signup { username: String, password: String },
    /// Check credentials
    Login { username: String, password: String },
    /// Print the leaderboard
    Rank,
    /// Fly a ship with the autopilot until the game ends
    Play {
        /// Log in first; required by multiplayer servers
        #[arg(short, long, requires = "password")]
        username: Option<String>,

        #[arg(short, long)]
        password: Option<String>,

        /// Give up after this many snapshots
        #[arg(long)]
        max_ticks: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Command::Signup { username, password } => {
            let (success, message) = network::sign_up(&args.server, &username, &password).await?;
            println!("{}: {}", if success { "ok" } else { "failed" }, message);
        }
        Command::Login { username, password } => {
            let success = network::login(&args.server, &username, &password).await?;
            println!("{}", if success { "login ok" } else { "login rejected" });
        }
        Command::Rank => {
            for (place, entry) in network::fetch_rankings(&args.server)
                .await?
                .iter()
                .enumerate()
            {
                println!("{:>3}. {:<16} {}", place + 1, entry.username, entry.score);
            }
        }
        Command::Play {
            username,
            password,
            max_ticks,
        } => {
            play(&args.server, username.zip(password), max_ticks).await?;
        }
    }

    Ok(())
}

async fn play(
    addr: &str,
    credentials: Option<(String, String)>,
    max_ticks: Option<u64>,
) -> Result<(), BoxError> {
    let mut connection = GameConnection::connect(addr).await?;

    if let Some((username, password)) = credentials {
        if !connection.login(&username, &password).await? {
            warn!("Login rejected for {}", username);
            return connection.close().await;
        }
        info!("Logged in as {}", username);
    }

    // Binds a ship on multiplayer servers; harmless otherwise.
    connection.send_action(PlayerAction::Stop).await?;

    let mut pilot = Autopilot::new();
    let mut last_status = GameStatus::Playing;
    let mut snapshots = 0u64;

    loop {
        match connection.next_packet().await? {
            Packet::GameState {
                tick,
                entities,
                score,
                lives,
                status,
            } => {
                snapshots += 1;
                if status != last_status {
                    info!("Tick {}: {:?} with score {}", tick, status, score);
                    last_status = status;
                }
                if status == GameStatus::GameOver {
                    break;
                }
                if lives > 0 {
                    for action in pilot.decide(&entities) {
                        connection.send_action(action).await?;
                    }
                }
                if max_ticks.map_or(false, |max| snapshots >= max) {
                    info!("Stopping after {} snapshots with score {}", snapshots, score);
                    break;
                }
            }
            Packet::Victory => {
                info!("Victory!");
                break;
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                return Ok(());
            }
            other => warn!("Unexpected packet: {:?}", other),
        }
    }

    connection.close().await
}
