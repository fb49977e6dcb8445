#![no_main]

use libfuzzer_sys::fuzz_target;
use rdp_client::codec::FrameDecoder;
use rdp_client::ConnectionConfig;

const MAX_INPUT_SIZE: usize = 256 * 1024;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_SIZE)];
    let config = ConnectionConfig {
        max_message_bytes: 64 * 1024,
        max_length_prefix_digits: 8,
    };

    // Feed the input in uneven chunks so partial prefixes and bodies are hit.
    let mut decoder = FrameDecoder::new(&config);
    for chunk in data.chunks(7) {
        decoder.push(chunk);
        loop {
            match decoder.next_frame() {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
});
