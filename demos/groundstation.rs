use clap::Parser;
use quadpilot::protocol::{compute_signature, PACKET_TAG, PING};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Send control packets to a flight server and print the ACKs
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Flight server address
    #[arg(long, default_value = "127.0.0.1:8888")]
    target: String,

    /// Throttle stick position, 0..1
    #[arg(long, default_value_t = 0.3)]
    throttle: f32,

    /// Roll stick position, -1..1
    #[arg(long, default_value_t = 0.0)]
    roll: f32,

    /// Pitch stick position, -1..1
    #[arg(long, default_value_t = 0.0)]
    pitch: f32,

    /// Yaw stick position, -1..1
    #[arg(long, default_value_t = 0.0)]
    yaw: f32,

    /// Shared secret; when set, packets are signed
    #[arg(long)]
    secret: Option<String>,

    /// Packets per second
    #[arg(long, default_value_t = 20)]
    rate: u32,

    /// Number of packets to send, 0 for unlimited
    #[arg(long, default_value_t = 100)]
    count: u64,

    /// Send heartbeat pings instead of control packets
    #[arg(long)]
    ping: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&args.target).await?;
    println!("Sending to {} at {} Hz", args.target, args.rate);

    let period = Duration::from_millis(1000 / args.rate.max(1) as u64);
    let mut nonce = 0u64;
    let mut sent = 0u64;
    let mut acked = 0u64;
    let mut buf = [0u8; 256];

    loop {
        let packet = if args.ping {
            format!("{PING}\n")
        } else {
            let payload = format!(
                "{PACKET_TAG},{:.3},{:.3},{:.3},{:.3}",
                args.throttle, args.roll, args.pitch, args.yaw
            );
            match &args.secret {
                Some(secret) => {
                    nonce += 1;
                    let sig = compute_signature(&payload, &nonce.to_string(), secret);
                    format!("{payload},{nonce},{sig}\n")
                }
                None => format!("{payload}\n"),
            }
        };

        socket.send(packet.as_bytes()).await?;
        sent += 1;

        // ACKs are best-effort; a missed one is not an error
        if let Ok(Ok(len)) = timeout(period, socket.recv(&mut buf)).await {
            acked += 1;
            let reply = String::from_utf8_lossy(&buf[..len]);
            println!("[{sent}] {}", reply.trim_end());
        } else {
            println!("[{sent}] no reply");
        }

        if args.count != 0 && sent >= args.count {
            break;
        }
        tokio::time::sleep(period).await;
    }

    println!("\nSent {sent} packets, {acked} ACKed");
    Ok(())
}
