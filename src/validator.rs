//! Local move pre-validation.
//!
//! Drag-and-drop moves are checked against a fresh [`shakmaty::Chess`]
//! position built from the snapshot's FEN before anything is sent to the
//! server. Nothing is cached between calls, so a stale position can never leak
//! into the next validation.
//!
//! An accepted move yields its SAN (sent to the server) and the resulting FEN
//! (applied to the snapshot optimistically). The server's next `state`
//! overwrites the optimistic FEN unconditionally.

use std::fmt;

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position, Rank, Role, Square};

use crate::protocol::Color;

/// A locally validated move, ready to be applied and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMove {
    /// Source square, e.g. `"e2"`.
    pub from: String,
    /// Target square, e.g. `"e4"`.
    pub to: String,
    /// Standard algebraic notation including check suffix, e.g. `"Nf3+"`.
    pub san: String,
    /// FEN the move was validated against.
    pub source_fen: String,
    /// FEN after the move. En passant targets are always written.
    pub fen: String,
    /// Side to move after the move.
    pub turn: Color,
    /// `true` when the move promoted a pawn (always to a queen).
    pub promotion: bool,
}

/// Why a drag was rejected. Rejections have no side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveRejection {
    /// The piece was dropped outside the board.
    MissingTarget,
    /// A square name could not be parsed.
    InvalidSquare(String),
    /// The current position is not a valid FEN.
    InvalidPosition(String),
    /// There is no piece on the source square.
    EmptySource,
    /// The local player has no assigned color yet.
    NoAssignedColor,
    /// The piece belongs to the opponent.
    NotYourPiece,
    /// The rules engine reports the move illegal.
    Illegal,
}

impl fmt::Display for MoveRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTarget => f.write_str("no target square"),
            Self::InvalidSquare(square) => write!(f, "invalid square {square:?}"),
            Self::InvalidPosition(fen) => write!(f, "invalid position {fen:?}"),
            Self::EmptySource => f.write_str("no piece on source square"),
            Self::NoAssignedColor => f.write_str("no color assigned"),
            Self::NotYourPiece => f.write_str("piece belongs to the opponent"),
            Self::Illegal => f.write_str("illegal move"),
        }
    }
}

impl std::error::Error for MoveRejection {}

/// Stateless move pre-validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveValidator;

impl MoveValidator {
    /// Validate dropping the piece on `from` onto `to` in position `fen`,
    /// played by `local_color`.
    ///
    /// Pawns reaching the last rank always promote to a queen.
    ///
    /// # Errors
    ///
    /// Returns the [`MoveRejection`] describing why the drag is refused.
    pub fn validate(
        fen: &str,
        from: &str,
        to: Option<&str>,
        local_color: Option<Color>,
    ) -> Result<ValidatedMove, MoveRejection> {
        let to = to.ok_or(MoveRejection::MissingTarget)?;
        let from_square = parse_square(from)?;
        let to_square = parse_square(to)?;
        let position = load_position(fen)?;

        let piece = position
            .board()
            .piece_at(from_square)
            .ok_or(MoveRejection::EmptySource)?;
        let local_color = local_color.ok_or(MoveRejection::NoAssignedColor)?;
        if Color::from(piece.color) != local_color {
            return Err(MoveRejection::NotYourPiece);
        }

        let last_rank = piece.color.fold_wb(Rank::Eighth, Rank::First);
        let promotion = (piece.role == Role::Pawn && to_square.rank() == last_rank)
            .then_some(Role::Queen);

        let candidate = UciMove::Normal {
            from: from_square,
            to: to_square,
            promotion,
        };
        let legal = candidate
            .to_move(&position)
            .map_err(|_| MoveRejection::Illegal)?;

        let mut after = position;
        let san = SanPlus::from_move_and_play_unchecked(&mut after, &legal);
        let turn = Color::from(after.turn());
        let fen_after = Fen::from_setup(after.into_setup(EnPassantMode::Always));

        Ok(ValidatedMove {
            from: from.to_owned(),
            to: to.to_owned(),
            san: san.to_string(),
            source_fen: fen.to_owned(),
            fen: fen_after.to_string(),
            turn,
            promotion: promotion.is_some(),
        })
    }

    /// Returns `true` when `fen` parses into a legal chess position.
    pub fn is_valid_fen(fen: &str) -> bool {
        load_position(fen).is_ok()
    }

    /// Side to move in `fen`, if it parses.
    pub fn side_to_move(fen: &str) -> Option<Color> {
        load_position(fen).ok().map(|pos| Color::from(pos.turn()))
    }
}

fn parse_square(name: &str) -> Result<Square, MoveRejection> {
    name.parse::<Square>()
        .map_err(|_| MoveRejection::InvalidSquare(name.to_owned()))
}

fn load_position(fen: &str) -> Result<Chess, MoveRejection> {
    let setup: Fen = fen
        .parse()
        .map_err(|_| MoveRejection::InvalidPosition(fen.to_owned()))?;
    setup
        .into_position(CastlingMode::Standard)
        .map_err(|_| MoveRejection::InvalidPosition(fen.to_owned()))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::session::INITIAL_FEN;

    #[test]
    fn e2e4_from_start() {
        let mv = MoveValidator::validate(INITIAL_FEN, "e2", Some("e4"), Some(Color::White)).unwrap();
        assert_eq!(mv.san, "e4");
        assert_eq!(mv.turn, Color::Black);
        assert_eq!(
            mv.fen,
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
        );
        assert!(!mv.promotion);
        assert_eq!(mv.source_fen, INITIAL_FEN);
    }

    #[test]
    fn knight_move_uses_piece_letter() {
        let mv = tokio_test::assert_ok!(MoveValidator::validate(
            INITIAL_FEN,
            "g1",
            Some("f3"),
            Some(Color::White)
        ));
        assert_eq!(mv.san, "Nf3");
        tokio_test::assert_err!(MoveValidator::validate(
            &mv.fen,
            "g1",
            Some("f3"),
            Some(Color::White)
        ));
    }

    #[test]
    fn rejects_opponent_piece() {
        let err = MoveValidator::validate(INITIAL_FEN, "e7", Some("e5"), Some(Color::White))
            .unwrap_err();
        assert_eq!(err, MoveRejection::NotYourPiece);
    }

    #[test]
    fn rejects_empty_source_and_missing_target() {
        assert_eq!(
            MoveValidator::validate(INITIAL_FEN, "e4", Some("e5"), Some(Color::White)),
            Err(MoveRejection::EmptySource)
        );
        assert_eq!(
            MoveValidator::validate(INITIAL_FEN, "e2", None, Some(Color::White)),
            Err(MoveRejection::MissingTarget)
        );
    }

    #[test]
    fn rejects_illegal_move() {
        let err = MoveValidator::validate(INITIAL_FEN, "e2", Some("e5"), Some(Color::White))
            .unwrap_err();
        assert_eq!(err, MoveRejection::Illegal);
    }

    #[test]
    fn rejects_without_assigned_color() {
        let err = MoveValidator::validate(INITIAL_FEN, "e2", Some("e4"), None).unwrap_err();
        assert_eq!(err, MoveRejection::NoAssignedColor);
    }

    #[test]
    fn rejects_garbage_inputs() {
        assert!(matches!(
            MoveValidator::validate(INITIAL_FEN, "z9", Some("e4"), Some(Color::White)),
            Err(MoveRejection::InvalidSquare(_))
        ));
        assert!(matches!(
            MoveValidator::validate("not a fen", "e2", Some("e4"), Some(Color::White)),
            Err(MoveRejection::InvalidPosition(_))
        ));
    }

    #[test]
    fn pawn_on_last_rank_promotes_to_queen() {
        let fen = "8/P6k/8/8/8/8/8/K7 w - - 0 1";
        let mv = MoveValidator::validate(fen, "a7", Some("a8"), Some(Color::White)).unwrap();
        assert!(mv.promotion);
        assert!(mv.san.starts_with("a8=Q"));
    }

    #[test]
    fn black_promotion_on_first_rank() {
        let fen = "k7/8/8/8/8/8/p6K/8 b - - 0 1";
        let mv = MoveValidator::validate(fen, "a2", Some("a1"), Some(Color::Black)).unwrap();
        assert!(mv.promotion);
        assert!(mv.san.starts_with("a1=Q"));
    }

    #[test]
    fn king_drag_castles() {
        let fen = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1";
        let mv = MoveValidator::validate(fen, "e1", Some("g1"), Some(Color::White)).unwrap();
        assert_eq!(mv.san, "O-O");
    }

    #[test]
    fn checking_move_carries_suffix() {
        let fen = "4k3/8/8/8/8/8/8/R3K3 w - - 0 1";
        let mv = MoveValidator::validate(fen, "a1", Some("a8"), Some(Color::White)).unwrap();
        assert_eq!(mv.san, "Ra8+");
    }

    #[test]
    fn fen_helpers() {
        assert!(MoveValidator::is_valid_fen(INITIAL_FEN));
        assert!(!MoveValidator::is_valid_fen("rnbqkbnr/8 w"));
        assert_eq!(MoveValidator::side_to_move(INITIAL_FEN), Some(Color::White));
        assert_eq!(MoveValidator::side_to_move("garbage"), None);
    }
}
