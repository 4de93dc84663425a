#![no_main]

use chess_arena_client::protocol::ServerMessage;
use chess_arena_client::session::{reduce, SessionInput, SessionSnapshot};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) else {
        return;
    };

    // Whatever decodes must fold into a connected snapshot without panicking.
    let connected = reduce(&SessionSnapshot::initial(), &SessionInput::Opened);
    let next = reduce(&connected, &SessionInput::Message(msg));
    let _ = next.phase();
    let _ = next.can_move();
});
