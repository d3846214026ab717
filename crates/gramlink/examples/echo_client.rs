//! Client that sends messages to the echo server and prints the replies.
//!
//! Run the server first:
//! - cargo run -p gramlink --example echo_server -- 127.0.0.1:7777
//!
//! Then run the client:
//! - cargo run -p gramlink --example echo_client -- 127.0.0.1:7777
//! - cargo run -p gramlink --example echo_client -- 127.0.0.1:7777 10 200
//!   (sends 10 messages, 200ms apart; every third one is large enough to be split)

use std::{
    env,
    net::SocketAddr,
    thread,
    time::{Duration, Instant},
};

use gramlink::prelude::*;
use tracing_subscriber::EnvFilter;

const LARGE_PAYLOAD: usize = 4_000;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_ids(true)
        .try_init()
        .ok();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    // Args: <server_addr> [count] [interval_ms]
    let mut args = env::args().skip(1);
    let server_addr: SocketAddr = args.next().unwrap_or_else(|| "127.0.0.1:9000".to_string()).parse()?;
    let count: usize = args.next().unwrap_or_else(|| "5".into()).parse().unwrap_or(5);
    let interval_ms: u64 = args.next().unwrap_or_else(|| "300".into()).parse().unwrap_or(300);

    let link = Link::bind_any()?;
    let server = link.add_peer(server_addr);
    println!(
        "gramlink client bound to {} -> sending {} messages to {} (every {}ms)",
        link.local_addr(),
        count,
        server_addr,
        interval_ms
    );

    for i in 0..count {
        let (payload, flags) = if i % 3 == 2 {
            (vec![b'x'; LARGE_PAYLOAD], MessageFlags::RELIABLE.with_scatter())
        } else {
            (format!("hello {} from {}", i, link.local_addr()).into_bytes(), MessageFlags::RELIABLE)
        };
        if !link.send_message(server, 1, payload, flags) {
            println!("[dropped] message {} status={:?}", i, link.peer_status(server));
        }

        let start = Instant::now();
        let wait = Duration::from_millis(interval_ms);
        while start.elapsed() < wait {
            while let Some(reply) = link.get_message(Some(server)) {
                let len = reply.payload().len();
                if len > 64 {
                    println!("[reply] {} bytes", len);
                } else {
                    println!("[reply] \"{}\"", String::from_utf8_lossy(reply.payload()));
                }
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    let counters = link.counters();
    println!(
        "done: sent={} recv={} retries={} drops={} lag={:.1}ms",
        counters.packets_sent, counters.packets_recv, counters.retries, counters.drops, counters.lag_ms
    );
    Ok(())
}
