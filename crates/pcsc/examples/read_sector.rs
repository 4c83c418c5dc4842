//! Wait for a MIFARE Classic card and dump one sector
//!
//! ```sh
//! RUST_LOG=debug cargo run --example read_sector -- 1 "ACS ACR122U 00 00"
//! ```

use std::time::Duration;

use mifare_classic::{LoginKey, MifareCard};
use mifare_transport_pcsc::{CardEvent, MonitorConfig, PcscDeviceManager};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let sector: u8 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(1);
    let reader = args.next();

    let manager = PcscDeviceManager::new()?;
    let mut monitor = manager.monitor(reader.as_deref(), MonitorConfig::default())?;
    let (_, events) = monitor.subscribe_channel();
    monitor.start()?;

    println!("Waiting for a card on {}...", monitor.reader());

    let connection = loop {
        match events.recv_timeout(Duration::from_secs(30))? {
            CardEvent::Added { connection, .. } => break connection,
            CardEvent::Removed { .. } => {}
        }
    };

    let mut card = MifareCard::new(connection);
    let identity = card.card_info();
    println!("Card: {} ({})", identity.card_name, identity.device_class);
    println!("UID: {}", hex::encode_upper(card.get_uid()?));

    let mut handle = card.sector(sector)?;
    if !handle.login(LoginKey::A)? {
        println!("Login to sector {sector} with the factory key failed");
        return Ok(());
    }
    for block in 0..handle.num_data_blocks() {
        let data = handle.get_data(block)?;
        println!("{sector:2}/{block:2}  {}", hex::encode_upper(data));
    }

    drop(card);
    monitor.stop()?;
    Ok(())
}
