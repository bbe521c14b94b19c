use midicore::Interface;
use std::{error::Error, time::Duration};
use tokio::time;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let port = midicore::port::open_rawmidi("/dev/snd/midiC1D0").await?;
    let mut intf = Interface::new(port);

    for i in 1..=5 {
        intf.send_debug_message(&format!("Hello from the host #{i}\r\n"))
            .await?;
        time::sleep(Duration::from_millis(500)).await;
    }

    Ok(())
}
