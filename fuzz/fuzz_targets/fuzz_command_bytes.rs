#![no_main]
use std::sync::Arc;

use filmscan_core::protocol::EventFrame;
use filmscan_core::{CommandChannel, I2cPeripheral};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Bus bytes in: whole messages are queued, the rest dropped, never a panic.
    let link = I2cPeripheral::new(Arc::new(CommandChannel::new()));
    let queued = link.on_receive(data);
    assert!(queued <= data.len() / 3);
    while let Some(raw) = link.channel().pop() {
        let _ = raw.decode();
    }
    // Bytes out: decoding an arbitrary frame must not panic either.
    let _ = EventFrame::decode(data);
});
