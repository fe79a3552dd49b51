//! wirechat console - interactive line-based TCP chat
//!
//! Runs as either a server (fans operator lines out to every connected
//! client) or a client (one persistent connection to a running server).
//! Role, host, and port can be given as flags; anything omitted is
//! prompted for interactively.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use wirechat::network::DEFAULT_CLIENT_HOST;
use wirechat::protocol::{CLIENT_PREFIX, SERVER_PREFIX};
use wirechat::{parse_port, ClientBuilder, ClientState, Event, Role, ServerBuilder};

/// wirechat - line-based TCP chat server and client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Role to run as; prompted for interactively when omitted
    #[arg(short, long, value_enum)]
    role: Option<RoleArg>,

    /// Host to connect to (client role only)
    #[arg(long)]
    host: Option<String>,

    /// TCP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Command-line spelling of the process role
#[derive(ValueEnum, Debug, Clone, Copy)]
enum RoleArg {
    /// Connect to a running server
    Client,
    /// Accept client connections
    Server,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Client => Role::Client,
            RoleArg::Server => Role::Server,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Chat output owns stdout; logs stay quiet unless asked for.
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("wirechat={}", log_level))
        .with_target(false)
        .init();

    let role = match args.role {
        Some(arg) => arg.into(),
        None => {
            let choice = prompt_line("Enter 1 for Client, 2 for Server:")?;
            match choice.trim() {
                "1" => Role::Client,
                "2" => Role::Server,
                other => bail!("Unrecognized role choice: {}", other),
            }
        },
    };

    let host = match (role, args.host) {
        (Role::Client, Some(host)) => host,
        (Role::Client, None) => {
            let input = prompt_line("Enter HOST (leave blank for 127.0.0.1):")?;
            let trimmed = input.trim();
            if trimmed.is_empty() {
                DEFAULT_CLIENT_HOST.to_string()
            } else {
                trimmed.to_string()
            }
        },
        (Role::Server, _) => String::new(),
    };

    let port = match args.port {
        Some(port) => port,
        None => {
            let input = prompt_line("Enter PORT (leave blank for 50007):")?;
            parse_port(&input)?
        },
    };

    println!("-----");

    match role {
        Role::Server => run_server(port).await,
        Role::Client => run_client(host, port).await,
    }
}

/// Print a prompt and read one line of operator input
fn prompt_line(label: &str) -> Result<String> {
    println!("{}", label);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("Failed to read operator input")?;
    Ok(input)
}

/// Run the server role until operator input ends
async fn run_server(port: u16) -> Result<()> {
    let mut server = ServerBuilder::new().with_port(port).build()?;

    server.on_event(|event| match event {
        Event::MessageReceived { line, .. } => println!("{}{}", CLIENT_PREFIX, line),
        Event::PeerConnected { .. } => println!("New client connected."),
        _ => {},
    });

    server.start().await?;

    let addr = server
        .local_addr()
        .context("Server address unavailable after start")?;
    println!("Server online at:");
    println!("(HOST) {}", addr.ip());
    println!("(PORT) {}", addr.port());

    // Every operator line fans out to all currently connected clients.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        server.broadcast(&line)?;
    }

    server.stop().await?;
    Ok(())
}

/// Run the client role until operator input ends or the connection dies
async fn run_client(host: String, port: u16) -> Result<()> {
    let mut client = ClientBuilder::new()
        .with_host(host)
        .with_port(port)
        .build()?;

    client.on_event(|event| match event {
        Event::MessageReceived { line, .. } => println!("{}{}", SERVER_PREFIX, line),
        Event::PeerDisconnected { .. } => println!("Connection closed by server."),
        _ => {},
    });

    // Fatal if the server is not there.
    client.connect().await?;

    let addr = client
        .server_addr()
        .context("Server address unavailable after connect")?;
    println!("Client connected to ({})", addr);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if client.state() != ClientState::Connected {
            bail!("Connection to the server was lost");
        }
        client.send(&line)?;
    }

    if client.state() == ClientState::Connected {
        client.stop()?;
    }
    Ok(())
}
