use clap::Parser;
use midicore::{
    Interface,
    debug::Direction,
    port::{PortArgs, ProtocolArgs},
};
use std::{
    error::Error,
    io::{self, Write},
    time::Duration,
};
use tokio::time::{self, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Command to send to the device's terminal
    command: Option<String>,

    #[command(flatten)]
    port: PortArgs,

    #[command(flatten)]
    protocol: ProtocolArgs,

    /// Time to listen for terminal output in seconds
    #[arg(short, long, default_value_t = 10)]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let port = args.port.open().await?;
    let mut intf = Interface::with_codec(port, args.protocol.codec());
    let deadline = Instant::now() + Duration::from_secs(args.duration);

    if let Some(cmd) = &args.command {
        intf.send_terminal_input(cmd).await?;
    }

    // Print terminal output until the deadline passes
    while let Ok(res) = time::timeout_at(deadline, intf.receive()).await {
        let frame = res?;

        if let Some(msg) = intf.codec().parse_debug_message(&frame)
            && msg.direction != Some(Direction::Input)
        {
            print!("{}", msg.text);
            io::stdout().flush()?;
        }
    }

    Ok(())
}
