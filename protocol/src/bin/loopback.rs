use clap::Parser;
use log::debug;
use midicore::{Interface, port::PortArgs};
use std::{error::Error, time::Duration};
use tokio::time::{self, Instant};

// Non-commercial manufacturer ID, never answered by a device
const TEST_FRAME: [u8; 5] = [0xf0, 0x7d, 0x00, 0x01, 0xf7];

// Time without input after which the port counts as drained
const DRAIN_QUIET: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    port: PortArgs,

    /// Number of test frames to send
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    count: u32,

    /// Time to wait for each frame to come back in milliseconds
    #[arg(short, long, default_value_t = 500)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let port = args.port.open().await?;
    let mut intf = Interface::new(port);
    let timeout = Duration::from_millis(args.timeout);
    let mut returned = 0;

    intf.drain(DRAIN_QUIET).await?;

    for i in 1..=args.count {
        let start = Instant::now();
        let deadline = start + timeout;

        intf.send(&TEST_FRAME).await?;

        // Other traffic may arrive before the frame comes back
        let echo = loop {
            match time::timeout_at(deadline, intf.receive()).await {
                Ok(res) => {
                    let frame = res?;

                    if frame == TEST_FRAME {
                        break Some(start.elapsed());
                    }

                    debug!("Skipping frame: {frame:02x?}");
                }
                Err(_) => break None,
            }
        };

        match echo {
            Some(elapsed) => {
                println!("Frame {i}: returned after {} ms", elapsed.as_millis());
                returned += 1;
            }
            None => println!("Frame {i}: no loopback"),
        }
    }

    println!();

    if returned < args.count {
        return Err(format!("Loopback failed: {returned} of {} frames returned", args.count).into());
    }

    println!("Loopback passed: all {} frames returned", args.count);

    Ok(())
}
