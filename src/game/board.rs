//! Board
//!
//! 3×3 grid of cell marks. A plain value type: sessions own one and
//! mutate it in place when a move is accepted.
//!
//! Wire format is three rows of three strings, each `""`, `"X"` or `"O"`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rows and columns on the board.
pub const BOARD_SIZE: usize = 3;

// =============================================================================
// MARK
// =============================================================================

/// Content of a single cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// Nobody has played here.
    #[default]
    #[serde(rename = "")]
    Empty,
    /// Mark of the player who started the game.
    #[serde(rename = "O")]
    O,
    /// Mark of the invited player.
    #[serde(rename = "X")]
    X,
}

impl Mark {
    /// Wire symbol for this mark.
    pub fn symbol(self) -> &'static str {
        match self {
            Mark::Empty => "",
            Mark::O => "O",
            Mark::X => "X",
        }
    }

    /// Check if the cell is empty.
    #[inline]
    pub fn is_empty(self) -> bool {
        self == Mark::Empty
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::Empty => f.write_str("."),
            other => f.write_str(other.symbol()),
        }
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// Board errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// Row or column outside `0..BOARD_SIZE`.
    #[error("cell ({row}, {col}) is outside the {}x{} board", BOARD_SIZE, BOARD_SIZE)]
    OutOfBounds {
        /// Requested row.
        row: usize,
        /// Requested column.
        col: usize,
    },
}

/// The playing grid, indexed `[row][col]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Mark; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the mark at a cell, `None` if out of range.
    pub fn get(&self, row: usize, col: usize) -> Option<Mark> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Write a mark into a cell.
    ///
    /// The cell is overwritten whether or not it already holds a mark;
    /// only the coordinates are validated.
    pub fn place(&mut self, row: usize, col: usize, mark: Mark) -> Result<(), BoardError> {
        let cell = self
            .cells
            .get_mut(row)
            .and_then(|r| r.get_mut(col))
            .ok_or(BoardError::OutOfBounds { row, col })?;
        *cell = mark;
        Ok(())
    }

    /// Rows of the board, top to bottom.
    pub fn rows(&self) -> &[[Mark; BOARD_SIZE]; BOARD_SIZE] {
        &self.cells
    }

    /// Check if no cell has been played.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(|m| m.is_empty())
    }

    /// Count cells holding a given mark.
    pub fn count(&self, mark: Mark) -> usize {
        self.cells.iter().flatten().filter(|m| **m == mark).count()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.cells.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            for mark in row {
                write!(f, "{}", mark)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new();
        assert!(board.is_empty());
        assert_eq!(board.count(Mark::Empty), BOARD_SIZE * BOARD_SIZE);
        assert_eq!(board.get(1, 1), Some(Mark::Empty));
    }

    #[test]
    fn test_place_overwrites_occupied_cell() {
        let mut board = Board::new();
        board.place(0, 0, Mark::O).unwrap();
        board.place(0, 0, Mark::X).unwrap();

        assert_eq!(board.get(0, 0), Some(Mark::X));
        assert_eq!(board.count(Mark::O), 0);
    }

    #[test]
    fn test_place_out_of_bounds() {
        let mut board = Board::new();
        let result = board.place(3, 0, Mark::O);
        assert_eq!(result, Err(BoardError::OutOfBounds { row: 3, col: 0 }));

        let result = board.place(0, usize::MAX, Mark::X);
        assert!(matches!(result, Err(BoardError::OutOfBounds { .. })));
        assert!(board.is_empty());
    }

    #[test]
    fn test_wire_format() {
        let mut board = Board::new();
        board.place(0, 0, Mark::O).unwrap();
        board.place(2, 1, Mark::X).unwrap();

        let json = serde_json::to_string(&board).unwrap();
        assert_eq!(json, r#"[["O","",""],["","",""],["","X",""]]"#);

        let parsed: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, board);
    }

    #[test]
    fn test_rejects_unknown_symbol() {
        let json = r#"[["Z","",""],["","",""],["","",""]]"#;
        assert!(serde_json::from_str::<Board>(json).is_err());
    }

    #[test]
    fn test_display() {
        let mut board = Board::new();
        board.place(1, 1, Mark::X).unwrap();
        assert_eq!(board.to_string(), ".../.X./...");
    }

    proptest! {
        #[test]
        fn test_place_touches_only_target(row in 0..BOARD_SIZE, col in 0..BOARD_SIZE) {
            let mut board = Board::new();
            board.place(row, col, Mark::O).unwrap();

            prop_assert_eq!(board.get(row, col), Some(Mark::O));
            prop_assert_eq!(board.count(Mark::O), 1);
            prop_assert_eq!(board.count(Mark::Empty), BOARD_SIZE * BOARD_SIZE - 1);
        }
    }
}
