use quadpilot::clock::{Clock, WallClock};
use quadpilot::motors::RecordingMotors;
use quadpilot::sensors::SimulatedSensors;
use quadpilot::{ControlLink, FlightComputer, FlightConfig, LinkConfig, TickRecord, UdpTransport};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional config file path as first argument
    let args: Vec<String> = env::args().collect();
    let config = if args.len() > 1 {
        LinkConfig::load(&args[1])?
    } else {
        LinkConfig::default()
    };

    println!("=== Flight server ===");
    println!("Listening on UDP port {}", config.port);
    if config.secret.is_some() {
        println!("Packet signatures required");
    }
    println!();

    let transport = UdpTransport::bind(config.port).await?;
    let clock = WallClock::new();
    let mut link = ControlLink::new(transport, config, clock.now_ms());

    let mut fc = FlightComputer::new(FlightConfig::default(), SimulatedSensors::new(), RecordingMotors::new());
    fc.arm();

    let mut tick = 0u64;
    fc.run_with_link(
        &mut link,
        &(),
        None,
        Some(|record: &TickRecord| {
            if tick % 100 == 0 {
                println!("{record}");
            }
            tick += 1;
        }),
    )
    .await?;

    Ok(())
}
