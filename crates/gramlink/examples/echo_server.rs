//! Echo server: sends every message back to the peer it came from.
//!
//! Run:
//! - cargo run -p gramlink --example echo_server
//! - RUST_LOG=debug cargo run -p gramlink --example echo_server -- 127.0.0.1:7777

use std::{env, net::SocketAddr, thread, time::Duration};

use gramlink::prelude::*;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_ids(true)
        .try_init()
        .ok();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let bind_addr: SocketAddr = env::args().nth(1).unwrap_or_else(|| "127.0.0.1:9000".to_string()).parse()?;
    let link = Link::bind_with_config(bind_addr, LinkConfig::default())?;
    println!("gramlink echo server listening on {}", link.local_addr());

    loop {
        while let Some(message) = link.get_message(None) {
            let text = String::from_utf8_lossy(message.payload());
            println!(
                "[message] peer={} type={} reliable={} len={} payload=\"{}\"",
                message.peer_id(),
                message.kind(),
                message.is_reliable(),
                message.payload().len(),
                text
            );

            let peer_id = message.peer_id();
            if !link.send_message(peer_id, message.kind(), message.payload().to_vec(), message.flags()) {
                println!("[dropped] echo to peer {}", peer_id);
            }
            if let Some(status) = link.peer_status(peer_id).filter(PeerStatus::is_overflow) {
                println!("[overflow] peer={} status={:?}, resetting", peer_id, status);
                link.reset_peer_status(peer_id);
            }
        }

        thread::sleep(Duration::from_millis(10));
    }
}
