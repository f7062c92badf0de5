//! The fixed hexagonal-ish board both devices compute locally.
//!
//! The layout is a shared constant — row sizes `5,6,7,8,7,6,5`, 44
//! bubbles total — and is **never transmitted**. Messages refer to
//! bubbles by id alone; both sides resolve ids against the same grid, so
//! a mismatch is impossible by construction.

use serde::{Deserialize, Serialize};

use crate::PlayerSide;

/// Bubbles per row, top to bottom.
pub const ROW_SIZES: [usize; 7] = [5, 6, 7, 8, 7, 6, 5];

/// Total bubbles on the board (the sum of [`ROW_SIZES`]).
pub const BUBBLE_COUNT: usize = 44;

/// One claimable cell.
///
/// Mutated only by the reducer. `transition_start_time` records the
/// sender-local timestamp of the claim that produced the current owner;
/// it is what the staleness guard compares incoming claims against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoopBubble {
    /// Stable id, `0..44`, in row-major order.
    pub id: u8,
    /// Row index into [`ROW_SIZES`].
    pub row: u8,
    /// Column within the row.
    pub col: u8,
    /// Who holds the bubble, if anyone.
    pub owner: Option<PlayerSide>,
    /// Whether the claim animation is still running (display hint).
    pub is_transitioning: bool,
    /// Timestamp of the claim that set the current owner, 0 if unclaimed.
    pub transition_start_time: u64,
}

/// Builds the 44-bubble board, all unclaimed.
pub fn standard_layout() -> Vec<CoopBubble> {
    let mut bubbles = Vec::with_capacity(BUBBLE_COUNT);
    let mut id: u8 = 0;
    for (row, &size) in ROW_SIZES.iter().enumerate() {
        for col in 0..size {
            bubbles.push(CoopBubble {
                id,
                row: row as u8,
                col: col as u8,
                owner: None,
                is_transitioning: false,
                transition_start_time: 0,
            });
            id += 1;
        }
    }
    bubbles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_layout_has_exactly_44_bubbles() {
        assert_eq!(standard_layout().len(), BUBBLE_COUNT);
        assert_eq!(ROW_SIZES.iter().sum::<usize>(), BUBBLE_COUNT);
    }

    #[test]
    fn test_standard_layout_ids_are_sequential_row_major() {
        let bubbles = standard_layout();
        for (i, bubble) in bubbles.iter().enumerate() {
            assert_eq!(bubble.id as usize, i);
        }
        // First row has 5 bubbles, so id 5 starts row 1.
        assert_eq!(bubbles[4].row, 0);
        assert_eq!(bubbles[5].row, 1);
        assert_eq!(bubbles[5].col, 0);
    }

    #[test]
    fn test_standard_layout_row_widths_match_constant() {
        let bubbles = standard_layout();
        for (row, &size) in ROW_SIZES.iter().enumerate() {
            let width = bubbles.iter().filter(|b| b.row as usize == row).count();
            assert_eq!(width, size, "row {row}");
        }
    }

    #[test]
    fn test_standard_layout_starts_unclaimed() {
        assert!(standard_layout().iter().all(|b| b.owner.is_none()
            && !b.is_transitioning
            && b.transition_start_time == 0));
    }
}
