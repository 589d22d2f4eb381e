#![no_main]

use libfuzzer_sys::fuzz_target;
use switchboard_mcp::{parse_message, parse_request, Incoming, MAX_MESSAGE_SIZE};

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    match parse_message(line, MAX_MESSAGE_SIZE) {
        Ok(Incoming::Single(value)) => {
            let _ = parse_request(value);
        }
        Ok(Incoming::Batch(members)) => {
            for member in members {
                let _ = parse_request(member);
            }
        }
        Err(error) => {
            let _ = serde_json::to_string(&error.to_jsonrpc_error());
        }
    }
});
