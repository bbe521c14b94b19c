mod worker;

use crate::worker::Worker;
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use midicore::{
    Interface,
    emulator::{DEFAULT_STARTUP_DELAY, DeviceInfoTable, Target},
    port::{PortArgs, ProtocolArgs},
};
use tokio::{signal, time::Duration};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(flatten)]
    port: PortArgs,

    #[command(flatten)]
    protocol: ProtocolArgs,

    /// Interval between heartbeat messages in seconds
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat: u64,

    /// Time given to the host to connect before the greeting in seconds
    #[arg(long, default_value_t = DEFAULT_STARTUP_DELAY.as_secs())]
    startup_delay: u64,

    /// Skip the greeting messages sent after startup
    #[arg(long)]
    no_greeting: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let port = args.port.open().await.context("Failed to open MIDI port")?;
    let codec = args.protocol.codec();
    let target = Target::with_codec(codec, DeviceInfoTable::default());
    let mut worker = Worker::new(
        Interface::with_codec(port, codec),
        target,
        Duration::from_secs(args.heartbeat),
    );

    let greeting = (!args.no_greeting).then(|| Duration::from_secs(args.startup_delay));

    info!("Emulating device instance {} on {}", codec.instance(), args.port.port);

    // Serve until interrupted
    tokio::select! {
        res = worker.run(greeting) => res?,
        res = signal::ctrl_c() => res.context("Failed to wait for Ctrl+C")?,
    }

    println!("Total messages sent: {}", worker.messages_sent());

    Ok(())
}
