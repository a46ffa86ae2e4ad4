// Match engines.
//
// The dispatcher and registries never look inside a board: they drive a
// `MatchEngine` through move application, legal-move listing (for the
// scripted opponent of a validation match) and two terminal queries. The turn
// itself is owned by `registry::Match`, which passes the mover's `Seat` in.
//
// `FourInARow` is the reference engine: a 6 x 7 board stored as a flat array
// of 42 cells (row-major, row 0 at the bottom) plus a fill height per column.
// Moves are 1-based column numbers on the wire. Wins are detected by scanning
// the fixed table of all 69 four-cell lines (`LINES`), and only once seven
// moves have been played, since no earlier position can contain a line.

use thiserror::Error;

/// Which marker a participant plays. The first mover is always `First`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    pub fn other(self) -> Seat {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }
}

/// A move the engine refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvalidMove {
    #[error("{token:?} is not a valid play")]
    NotAColumn { token: String },

    #[error("{column} is not a valid play")]
    ColumnOutOfRange { column: usize },

    #[error("column {column} is already full")]
    ColumnFull { column: usize },
}

/// Rules of one game, independent of who is playing it.
pub trait MatchEngine: Send {
    /// Validate `token` and apply it for `seat`.
    fn apply(&mut self, seat: Seat, token: &str) -> Result<(), InvalidMove>;

    /// Tokens of every move that `apply` would currently accept.
    fn legal_moves(&self) -> Vec<String>;

    /// True if `seat` has completed a winning pattern.
    fn has_won(&self, seat: Seat) -> bool;

    /// True if no further move is possible.
    fn is_full(&self) -> bool;
}

pub const ROWS: usize = 6;
pub const COLS: usize = 7;
pub const CELLS: usize = ROWS * COLS;

/// Number of moves before which no line of four can exist.
const FIRST_POSSIBLE_WIN: usize = 7;

/// Every maximal four-in-a-row line on a 6 x 7 board, as flat cell indices
/// (`row * COLS + col`, row 0 at the bottom).
pub const LINES: [[usize; 4]; 69] = [
    // Horizontal
    [0, 1, 2, 3],
    [1, 2, 3, 4],
    [2, 3, 4, 5],
    [3, 4, 5, 6],
    [7, 8, 9, 10],
    [8, 9, 10, 11],
    [9, 10, 11, 12],
    [10, 11, 12, 13],
    [14, 15, 16, 17],
    [15, 16, 17, 18],
    [16, 17, 18, 19],
    [17, 18, 19, 20],
    [21, 22, 23, 24],
    [22, 23, 24, 25],
    [23, 24, 25, 26],
    [24, 25, 26, 27],
    [28, 29, 30, 31],
    [29, 30, 31, 32],
    [30, 31, 32, 33],
    [31, 32, 33, 34],
    [35, 36, 37, 38],
    [36, 37, 38, 39],
    [37, 38, 39, 40],
    [38, 39, 40, 41],
    // Vertical
    [0, 7, 14, 21],
    [1, 8, 15, 22],
    [2, 9, 16, 23],
    [3, 10, 17, 24],
    [4, 11, 18, 25],
    [5, 12, 19, 26],
    [6, 13, 20, 27],
    [7, 14, 21, 28],
    [8, 15, 22, 29],
    [9, 16, 23, 30],
    [10, 17, 24, 31],
    [11, 18, 25, 32],
    [12, 19, 26, 33],
    [13, 20, 27, 34],
    [14, 21, 28, 35],
    [15, 22, 29, 36],
    [16, 23, 30, 37],
    [17, 24, 31, 38],
    [18, 25, 32, 39],
    [19, 26, 33, 40],
    [20, 27, 34, 41],
    // Diagonal, rising to the left
    [21, 15, 9, 3],
    [22, 16, 10, 4],
    [23, 17, 11, 5],
    [24, 18, 12, 6],
    [28, 22, 16, 10],
    [29, 23, 17, 11],
    [30, 24, 18, 12],
    [31, 25, 19, 13],
    [35, 29, 23, 17],
    [36, 30, 24, 18],
    [37, 31, 25, 19],
    [38, 32, 26, 20],
    // Diagonal, rising to the right
    [24, 16, 8, 0],
    [25, 17, 9, 1],
    [26, 18, 10, 2],
    [27, 19, 11, 3],
    [31, 23, 15, 7],
    [32, 24, 16, 8],
    [33, 25, 17, 9],
    [34, 26, 18, 10],
    [38, 30, 22, 14],
    [39, 31, 23, 15],
    [40, 32, 24, 16],
    [41, 33, 25, 17],
];

/// Four-in-a-row on a 6 x 7 board.
#[derive(Clone, Debug)]
pub struct FourInARow {
    cells: [Option<Seat>; CELLS],
    heights: [usize; COLS],
    moves: usize,
}

impl Default for FourInARow {
    fn default() -> Self {
        Self::new()
    }
}

impl FourInARow {
    pub fn new() -> Self {
        Self {
            cells: [None; CELLS],
            heights: [0; COLS],
            moves: 0,
        }
    }

    /// Drop a marker into a 1-based column.
    pub fn drop_in(&mut self, seat: Seat, column: usize) -> Result<(), InvalidMove> {
        if !(1..=COLS).contains(&column) {
            return Err(InvalidMove::ColumnOutOfRange { column });
        }
        let col = column - 1;
        let height = self.heights[col];
        if height >= ROWS {
            return Err(InvalidMove::ColumnFull { column });
        }
        self.cells[height * COLS + col] = Some(seat);
        self.heights[col] += 1;
        self.moves += 1;
        Ok(())
    }

    /// Marker at a flat cell index.
    pub fn cell(&self, index: usize) -> Option<Seat> {
        self.cells.get(index).copied().flatten()
    }
}

impl MatchEngine for FourInARow {
    fn apply(&mut self, seat: Seat, token: &str) -> Result<(), InvalidMove> {
        let token = token.trim();
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidMove::NotAColumn {
                token: token.to_string(),
            });
        }
        // All digits, so the only failure left is overflow.
        let column = token
            .parse()
            .map_err(|_| InvalidMove::NotAColumn {
                token: token.to_string(),
            })?;
        self.drop_in(seat, column)
    }

    fn legal_moves(&self) -> Vec<String> {
        (0..COLS)
            .filter(|&col| self.heights[col] < ROWS)
            .map(|col| (col + 1).to_string())
            .collect()
    }

    fn has_won(&self, seat: Seat) -> bool {
        if self.moves < FIRST_POSSIBLE_WIN {
            return false;
        }
        LINES
            .iter()
            .any(|line| line.iter().all(|&cell| self.cells[cell] == Some(seat)))
    }

    fn is_full(&self) -> bool {
        self.heights.iter().all(|&h| h >= ROWS)
    }
}
