use quadpilot::motors::RecordingMotors;
use quadpilot::sensors::SimulatedSensors;
use quadpilot::{FlightComputer, FlightConfig, TickRecord};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let seconds: f32 = if args.len() > 1 {
        args[1].parse().unwrap_or(3.0)
    } else {
        3.0
    };
    let throttle: f32 = if args.len() > 2 {
        args[2].parse().unwrap_or(0.4)
    } else {
        0.4
    };

    println!("=== Simulated flight ===");
    println!("Duration: {seconds}s, throttle: {throttle}\n");

    let mut fc = FlightComputer::new(FlightConfig::default(), SimulatedSensors::new(), RecordingMotors::new());
    fc.arm();
    fc.set_throttle(throttle);

    // Print every 25th record so 100Hz stays readable
    let mut tick = 0u64;
    fc.run(
        Some(seconds),
        Some(|record: &TickRecord| {
            if tick % 25 == 0 {
                println!("{record}");
            }
            tick += 1;
        }),
    )
    .await;

    println!("\nRan {tick} ticks");
    Ok(())
}
