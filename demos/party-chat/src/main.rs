//! Terminal chat over the Partyline bus.
//!
//! One terminal hosts, the others join it by address. Every line typed
//! becomes a `("msg", line)` send; the host fans its own lines out to
//! all clients and relays each client's lines to the others.
//!
//! ```text
//! party-chat host [port]
//! party-chat join <address> [port]
//! ```

use std::env;
use std::net::IpAddr;

use partyline::{DEFAULT_PORT, Session, SessionConfig, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

enum Input {
    Event(Option<SessionEvent>),
    Line(std::io::Result<Option<String>>),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut session = Session::new(SessionConfig::default());

    match args.first().map(String::as_str) {
        Some("host") => {
            let port = parse_port(args.get(1))?;
            session.host(port).await?;
            if let Some(addr) = session.local_addr().await {
                println!("hosting on {addr}");
                println!("join from another machine with: party-chat join {}", addr.ip());
            }
        }
        Some("join") => {
            let addr: IpAddr = args
                .get(1)
                .ok_or("missing host address")?
                .parse()?;
            let port = parse_port(args.get(2))?;
            session.join(addr, port).await?;
        }
        _ => {
            eprintln!("usage: party-chat host [port] | party-chat join <address> [port]");
            std::process::exit(2);
        }
    }

    println!("type to chat, /quit to leave");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let input = next_input(&mut session, &mut lines).await;
        match input {
            Input::Event(Some(event)) => {
                if !handle_event(event) {
                    break;
                }
            }
            Input::Event(None) => break,
            Input::Line(line) => match line? {
                Some(line) if line.trim() == "/quit" => {
                    session.close().await;
                    break;
                }
                Some(line) if !line.trim().is_empty() => {
                    session.send("msg", line).await?;
                }
                Some(_) => {}
                None => {
                    session.close().await;
                    break;
                }
            },
        }
    }

    Ok(())
}

async fn next_input(session: &mut Session, lines: &mut Lines<BufReader<Stdin>>) -> Input {
    tokio::select! {
        event = session.next_event() => Input::Event(event),
        line = lines.next_line() => Input::Line(line),
    }
}

/// Prints one event; returns `false` when the session is over.
fn handle_event(event: SessionEvent) -> bool {
    match event {
        SessionEvent::Connected => println!("* connected"),
        SessionEvent::JoinError(cause) => {
            eprintln!("join failed: {cause}");
            return false;
        }
        SessionEvent::Data(msg) => match msg.op_code.as_str() {
            "msg" => println!("> {}", msg.payload),
            other => println!("[{other}] {}", msg.payload),
        },
        SessionEvent::PeerConnected { peer, addr } => {
            println!("* {peer} joined from {addr}");
        }
        SessionEvent::PeerDisconnected { peer } => {
            println!("* {peer} left");
        }
        SessionEvent::ServerShutdown => {
            println!("* host shut down");
            return false;
        }
        SessionEvent::Debug(text) => tracing::debug!("{text}"),
    }
    true
}

fn parse_port(arg: Option<&String>) -> Result<u16, std::num::ParseIntError> {
    arg.map(|p| p.parse()).transpose().map(|p| p.unwrap_or(DEFAULT_PORT))
}
