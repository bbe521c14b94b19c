use clap::Parser;
use midicore::{
    Codec, Interface,
    port::{PortArgs, ProtocolArgs},
    upload::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, State, Uploader},
};
use std::{
    error::Error,
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};
use tokio::{signal, time};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Firmware image (raw binary)
    firmware: PathBuf,

    #[command(flatten)]
    port: PortArgs,

    #[command(flatten)]
    protocol: ProtocolArgs,

    /// Bytes per block (1-127)
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, value_parser = clap::value_parser!(u8).range(1..=i64::from(MAX_BLOCK_SIZE)))]
    block_size: u8,

    /// Time to wait for the erase to settle in milliseconds
    #[arg(long, default_value_t = 3000)]
    erase_delay: u64,

    /// Pause between blocks in milliseconds
    #[arg(long, default_value_t = 20)]
    block_delay: u64,

    /// Time to wait after the jump in milliseconds
    #[arg(long, default_value_t = 500)]
    jump_delay: u64,
}

/// Waits for the given time, cancelling the upload on Ctrl+C.
async fn wait(uploader: &mut Uploader, millis: u64) -> Result<(), Box<dyn Error>> {
    tokio::select! {
        () = time::sleep(Duration::from_millis(millis)) => Ok(()),
        res = signal::ctrl_c() => {
            res?;

            let state = uploader.state();

            uploader.cancel();

            Err(format!("Upload cancelled while {state}").into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let firmware = std::fs::read(&args.firmware)?;
    let codec = Codec::bootloader()
        .with_instance(args.protocol.instance)
        .with_checksum(!args.protocol.plain);
    let port = args.port.open().await?;
    let mut intf = Interface::with_codec(port, codec);
    let mut uploader = Uploader::with_codec(codec);
    let progress = uploader.start(&mut intf, firmware, args.block_size).await?;

    println!(
        "Erasing application for {} bytes ({} blocks of {} bytes)",
        progress.bytes_total, progress.blocks_total, args.block_size
    );

    wait(&mut uploader, args.erase_delay).await?;
    uploader.erase_settled()?;

    while let State::Writing { offset } = uploader.state() {
        let progress = uploader.next_block(&mut intf).await?;

        print!(
            "\rWriting block {}/{} at {offset:#08x} ({}%)",
            progress.blocks_sent,
            progress.blocks_total,
            progress.percent()
        );
        io::stdout().flush()?;

        wait(&mut uploader, args.block_delay).await?;
    }

    println!();

    uploader.finish(&mut intf).await?;
    time::sleep(Duration::from_millis(args.jump_delay)).await;

    println!("Upload complete, application started");

    Ok(())
}
