use clap::Parser;
use log::warn;
use midicore::{
    Interface,
    port::{Port, PortArgs, ProtocolArgs},
    query::QueryType,
};
use std::{error::Error, time::Duration};
use strum::VariantArray;
use tokio::time;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    port: PortArgs,

    #[command(flatten)]
    protocol: ProtocolArgs,

    /// Timeout per query in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    timeout: u64,
}

// Time without input after which the port counts as drained
const DRAIN_QUIET: Duration = Duration::from_millis(50);

async fn query_all(intf: &mut Interface<Port>, timeout: Duration) -> Result<usize, Box<dyn Error>> {
    let mut answered = 0;

    for &query_type in QueryType::VARIANTS {
        let label = query_type.to_string();
        let discarded = intf.drain(DRAIN_QUIET).await?;

        if discarded > 0 {
            warn!("Discarded {discarded} pending frames before querying {label}");
        }

        match time::timeout(timeout, intf.query(query_type)).await {
            Ok(Ok(text)) => {
                println!("{label:<26} {text}");
                answered += 1;
            }
            Ok(Err(err)) => println!("{label:<26} error: {err}"),
            Err(_) => println!("{label:<26} no response"),
        }
    }

    Ok(answered)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let port = args.port.open().await?;
    let mut intf = Interface::with_codec(port, args.protocol.codec());
    let answered = query_all(&mut intf, Duration::from_millis(args.timeout)).await?;
    let total = QueryType::VARIANTS.len();

    println!();

    if answered < total {
        return Err(format!("Recognition failed: {answered} of {total} queries answered").into());
    }

    println!("Recognition passed: all {total} queries answered");

    Ok(())
}
