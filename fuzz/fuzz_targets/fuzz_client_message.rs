#![no_main]

use chess_arena_client::protocol::ClientMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = serde_json::from_slice::<ClientMessage>(data) else {
        return;
    };

    // Anything that decodes must encode back to the same message.
    let json = serde_json::to_string(&msg).unwrap_or_default();
    let again = serde_json::from_str::<ClientMessage>(&json).ok();
    assert_eq!(again.as_ref(), Some(&msg));
});
