//! Cell addressing on the 8×12 panel grid.
//!
//! Cells are named like microplate wells: a row letter `A`-`H` followed by a
//! column number `1`-`12` (`A01`, `D7`, `H12`). Internally a cell is a
//! zero-based `(row, column)` pair with a linear index of `row * 12 + column`.

use std::fmt;
use std::str::FromStr;

use crate::constants::{CELL_COUNT, COLUMNS, ROWS};
use crate::error::{ProtocolError, ProtocolResult};

/// A single addressable cell on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cell {
    row: u8,
    column: u8,
}

impl Cell {
    /// Create a cell from zero-based row and column indices.
    pub fn new(row: usize, column: usize) -> ProtocolResult<Cell> {
        if row >= ROWS {
            return Err(ProtocolError::InvalidCell(format!(
                "row index {} out of range 0..{}",
                row, ROWS
            )));
        }
        if column >= COLUMNS {
            return Err(ProtocolError::InvalidCell(format!(
                "column index {} out of range 0..{}",
                column, COLUMNS
            )));
        }
        Ok(Cell {
            row: row as u8,
            column: column as u8,
        })
    }

    /// Create a cell from a row letter (`A`-`H`, any case) and a one-based column.
    pub fn from_label(row: char, column: u8) -> ProtocolResult<Cell> {
        let upper = row.to_ascii_uppercase();
        if !('A'..='H').contains(&upper) {
            return Err(ProtocolError::InvalidCell(format!(
                "row {:?} is not a letter A-H",
                row
            )));
        }
        if column == 0 || column as usize > COLUMNS {
            return Err(ProtocolError::InvalidCell(format!(
                "column {} out of range 1-{}",
                column, COLUMNS
            )));
        }
        Cell::new((upper as u8 - b'A') as usize, column as usize - 1)
    }

    /// Create a cell from its linear index (`0..96`).
    pub fn from_index(index: usize) -> ProtocolResult<Cell> {
        if index >= CELL_COUNT {
            return Err(ProtocolError::InvalidCell(format!(
                "cell index {} out of range 0..{}",
                index, CELL_COUNT
            )));
        }
        Cell::new(index / COLUMNS, index % COLUMNS)
    }

    /// Zero-based row index.
    pub fn row(&self) -> usize {
        self.row as usize
    }

    /// Zero-based column index.
    pub fn column(&self) -> usize {
        self.column as usize
    }

    /// Row letter as sent on the wire.
    pub fn row_letter(&self) -> char {
        (b'A' + self.row) as char
    }

    /// One-based column number as sent on the wire.
    pub fn column_number(&self) -> u8 {
        self.column + 1
    }

    /// Linear index used for mask bits.
    pub fn index(&self) -> usize {
        self.row as usize * COLUMNS + self.column as usize
    }

    /// Iterate over all 96 cells in index order.
    pub fn all() -> impl Iterator<Item = Cell> {
        (0..CELL_COUNT).map(|i| Cell {
            row: (i / COLUMNS) as u8,
            column: (i % COLUMNS) as u8,
        })
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.row_letter(), self.column_number())
    }
}

impl FromStr for Cell {
    type Err = ProtocolError;

    /// Parse a well name such as `A01`, `a1` or `H12`.
    fn from_str(s: &str) -> ProtocolResult<Cell> {
        let s = s.trim();
        let mut chars = s.chars();
        let row = chars
            .next()
            .ok_or_else(|| ProtocolError::InvalidCell("empty cell name".to_string()))?;
        let digits = chars.as_str();
        if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::InvalidCell(format!(
                "{:?} is not a well name like A01",
                s
            )));
        }
        let column: u8 = digits
            .parse()
            .map_err(|_| ProtocolError::InvalidCell(format!("bad column in {:?}", s)))?;
        Cell::from_label(row, column)
    }
}

/// Parse a row given as a letter (`A`-`H`).
pub fn parse_row(s: &str) -> ProtocolResult<usize> {
    let mut chars = s.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Cell::from_label(c, 1).map(|cell| cell.row()),
        _ => Err(ProtocolError::InvalidCell(format!("{:?} is not a row letter", s))),
    }
}

/// Parse a one-based column number (`1`-`12`) into a zero-based index.
pub fn parse_column(s: &str) -> ProtocolResult<usize> {
    let column: u8 = s
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidCell(format!("{:?} is not a column number", s)))?;
    Cell::from_label('A', column).map(|cell| cell.column())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_names() {
        let a1: Cell = "A01".parse().unwrap();
        assert_eq!((a1.row(), a1.column()), (0, 0));
        assert_eq!(a1.index(), 0);

        let h12: Cell = "H12".parse().unwrap();
        assert_eq!((h12.row(), h12.column()), (7, 11));
        assert_eq!(h12.index(), 95);

        let d7: Cell = "d7".parse().unwrap();
        assert_eq!(d7.to_string(), "D07");
    }

    #[test]
    fn test_reject_bad_well_names() {
        assert!("".parse::<Cell>().is_err());
        assert!("I01".parse::<Cell>().is_err());
        assert!("A13".parse::<Cell>().is_err());
        assert!("A00".parse::<Cell>().is_err());
        assert!("A".parse::<Cell>().is_err());
        assert!("A123".parse::<Cell>().is_err());
        assert!("A-1".parse::<Cell>().is_err());
    }

    #[test]
    fn test_index_round_trip() {
        for cell in Cell::all() {
            assert_eq!(Cell::from_index(cell.index()).unwrap(), cell);
        }
        assert!(Cell::from_index(96).is_err());
        assert_eq!(Cell::all().count(), 96);
    }

    #[test]
    fn test_wire_labels() {
        let cell = Cell::new(2, 9).unwrap();
        assert_eq!(cell.row_letter(), 'C');
        assert_eq!(cell.column_number(), 10);
    }

    #[test]
    fn test_parse_row_and_column() {
        assert_eq!(parse_row("a").unwrap(), 0);
        assert_eq!(parse_row("H").unwrap(), 7);
        assert!(parse_row("AB").is_err());
        assert_eq!(parse_column("12").unwrap(), 11);
        assert!(parse_column("0").is_err());
    }
}
