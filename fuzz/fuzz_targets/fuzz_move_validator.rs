#![no_main]

use chess_arena_client::{Color, MoveValidator};
use libfuzzer_sys::fuzz_target;

// Input layout: `<fen>\n<from>\n<to>`; a missing target is a dropped drag.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut parts = text.splitn(3, '\n');
    let fen = parts.next().unwrap_or_default();
    let from = parts.next().unwrap_or_default();
    let to = parts.next();

    for color in [None, Some(Color::White), Some(Color::Black)] {
        if let Ok(validated) = MoveValidator::validate(fen, from, to, color) {
            assert!(MoveValidator::is_valid_fen(&validated.fen));
            assert!(!validated.san.is_empty());
        }
    }
});
