use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::{
    io::{BufRead, IsTerminal},
    time::Duration,
};
use steamq::{ConnectOptions, Server, Timeouts};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server address, `host:port`
    #[arg(short, long, env = "ADDR", global = true)]
    addr: Option<String>,

    /// Log protocol traffic to stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Seconds to wait for each UDP reply
    #[arg(long, default_value = "1", global = true)]
    udp_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Repeat {
    /// Repeat until interrupted or until a call fails
    #[arg(short, long)]
    forever: bool,

    /// Milliseconds to wait between repetitions
    #[arg(short, long = "delay-ms", default_value = "1000")]
    delay: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Measure the round-trip time of an info query
    Ping {
        /// Also print server info
        #[arg(short)]
        v: bool,

        /// Also print server info and the player list
        #[arg(long)]
        vv: bool,

        #[command(flatten)]
        repeat: Repeat,

        /// Address, when not given with --addr
        target: Option<String>,
    },
    /// Print server info
    Info,
    /// Print the player list
    Players,
    /// Run a console command over RCON
    Exec {
        cmd: String,

        /// RCON password; prompted on stdin when absent
        #[arg(long, env = "RCON_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        #[command(flatten)]
        repeat: Repeat,
    },
    /// Print the parsed output of the `stats` console command
    Stats {
        #[arg(long, env = "RCON_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("steamq=debug")
    } else {
        EnvFilter::from_default_env()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_password(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return rpassword::prompt_password("Password: ").context("could not read password");
    }

    read_password_line(stdin.lock()).context("could not read password")
}

/// Password piped in on stdin: the first line, without its line ending.
fn read_password_line<R: BufRead>(mut reader: R) -> std::io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

fn print<T: Serialize + std::fmt::Display>(json: bool, value: &T) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

async fn connect(addr: &str, timeouts: Timeouts, password: Option<String>) -> anyhow::Result<Server> {
    let mut opts = ConnectOptions::default().with_timeouts(timeouts);
    if let Some(password) = password {
        opts = opts.with_rcon_password(password);
    }

    Server::connect(addr, opts)
        .await
        .with_context(|| format!("could not connect to server {}", addr))
}

async fn ping(
    server: &Server,
    json: bool,
    info: bool,
    players: bool,
    repeat: &Repeat,
) -> anyhow::Result<()> {
    loop {
        let rtt = server
            .ping()
            .await
            .with_context(|| format!("could not ping {}", server))?;
        println!("{:?}", rtt);

        if info {
            let info = server
                .info()
                .await
                .with_context(|| format!("could not get server info from {}", server))?;
            println!("\ninfo of {}:", server);
            print(json, &info)?;
        }

        if players {
            let result = server
                .players_info()
                .await
                .with_context(|| format!("could not get player info from {}", server))?;
            if !result.players.is_empty() {
                println!("\nplayer infos for {}:", server);
                for player in &result.players {
                    println!("{} {}", player.name, player.score);
                }
            }
        }

        if !repeat.forever {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(repeat.delay)).await;
        if info {
            println!();
        }
    }
}

async fn exec(server: &Server, cmd: &str, repeat: &Repeat) -> anyhow::Result<()> {
    loop {
        let output = server
            .send(cmd)
            .await
            .with_context(|| format!("could not exec {:?} on {}", cmd, server))?;
        println!("{}", output);

        if !repeat.forever {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(repeat.delay)).await;
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let timeouts = Timeouts {
        udp_read: Duration::from_secs(cli.udp_timeout),
        ..Timeouts::default()
    };

    let target = match &cli.command {
        Command::Ping { target, .. } => target.clone(),
        _ => None,
    };
    let addr = match cli.addr.or(target) {
        Some(addr) if !addr.is_empty() => addr,
        _ => bail!("please provide the server address with --addr or ADDR"),
    };
    debug!(%addr, "starting");

    match cli.command {
        Command::Ping { v, vv, repeat, .. } => {
            let server = connect(&addr, timeouts, None).await?;
            let result = ping(&server, cli.json, v || vv, vv, &repeat).await;
            server.close().await;
            result
        }
        Command::Info => {
            let server = connect(&addr, timeouts, None).await?;
            let result = server.info().await;
            server.close().await;
            print(cli.json, &result.context("could not get server info")?)
        }
        Command::Players => {
            let server = connect(&addr, timeouts, None).await?;
            let result = server.players_info().await;
            server.close().await;
            let result = result.context("could not get player info")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for player in &result.players {
                    println!("{}", player);
                }
            }
            Ok(())
        }
        Command::Exec {
            cmd,
            password,
            repeat,
        } => {
            let password = read_password(password)?;
            let server = connect(&addr, timeouts, Some(password)).await?;
            let result = exec(&server, &cmd, &repeat).await;
            server.close().await;
            result
        }
        Command::Stats { password } => {
            let password = read_password(password)?;
            let server = connect(&addr, timeouts, Some(password)).await?;
            let result = server.stats().await;
            server.close().await;
            let stats = result.context("could not get server stats")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    run(cli).await
}
