//! Example showing how to enumerate connected card readers

use mifare_transport_pcsc::PcscDeviceManager;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manager = PcscDeviceManager::new()?;
    let readers = manager.list_readers()?;

    println!("Found {} readers:", readers.len());

    for (i, reader) in readers.iter().enumerate() {
        let kind = if reader.is_contactless() { " (contactless)" } else { "" };
        println!("{}. Reader: {}{kind}", i + 1, reader.name());

        match reader.atr() {
            Some(atr) if reader.has_card() => {
                println!("   Card present, ATR: {}", hex::encode_upper(atr));
            }
            _ => println!("   No card present"),
        }
    }

    match manager.find_reader(None) {
        Ok(name) => println!("Default reader: {name}"),
        Err(e) => println!("No default reader: {e}"),
    }

    Ok(())
}
