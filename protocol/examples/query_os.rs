use midicore::{Interface, query::QueryType};
use std::{error::Error, time::Duration};
use tokio::time;

const QUERY_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let port = midicore::port::open_rawmidi("/dev/snd/midiC1D0").await?;
    let mut intf = Interface::new(port);

    for query_type in [QueryType::OperatingSystem, QueryType::AppName1, QueryType::AppName2] {
        let text = time::timeout(QUERY_TIMEOUT, intf.query(query_type)).await??;

        println!("{query_type}: {text}");
    }

    Ok(())
}
