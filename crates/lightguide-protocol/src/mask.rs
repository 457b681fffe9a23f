//! 96-bit cell masks.
//!
//! The mask is 12 bytes long. Cell index `i` lives in bit `i % 8` of byte
//! `i / 8` (LSB first), and the bytes are transmitted as 24 uppercase hex
//! characters in byte order.
//!
//! ```text
//! byte:   0        1             11
//! bits:   7......0 15.....8 ...  95....88
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::cell::Cell;
use crate::constants::{CELL_COUNT, COLUMNS, MASK_BYTES, MASK_HEX_LEN, ROWS};
use crate::error::{ProtocolError, ProtocolResult};

/// A set of selected cells, stored as the 12-byte wire bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellMask {
    bytes: [u8; MASK_BYTES],
}

impl CellMask {
    /// Create an empty mask.
    pub fn new() -> Self {
        CellMask::default()
    }

    /// Create a mask with every cell selected.
    pub fn full() -> Self {
        CellMask {
            bytes: [0xFF; MASK_BYTES],
        }
    }

    /// Build a mask from the raw wire bytes.
    pub fn from_bytes(bytes: [u8; MASK_BYTES]) -> Self {
        CellMask { bytes }
    }

    /// Build a mask from linear cell indices. Fails on any index outside `0..96`.
    pub fn from_indices<I>(indices: I) -> ProtocolResult<Self>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut mask = CellMask::new();
        for index in indices {
            mask.insert(Cell::from_index(index)?);
        }
        Ok(mask)
    }

    /// Raw wire bytes.
    pub fn as_bytes(&self) -> &[u8; MASK_BYTES] {
        &self.bytes
    }

    /// Select a cell.
    pub fn insert(&mut self, cell: Cell) {
        let index = cell.index();
        self.bytes[index / 8] |= 1 << (index % 8);
    }

    /// Deselect a cell.
    pub fn remove(&mut self, cell: Cell) {
        let index = cell.index();
        self.bytes[index / 8] &= !(1 << (index % 8));
    }

    /// Check whether a cell is selected.
    pub fn contains(&self, cell: Cell) -> bool {
        let index = cell.index();
        self.bytes[index / 8] & (1 << (index % 8)) != 0
    }

    /// Select every cell in a row (zero-based).
    pub fn select_row(&mut self, row: usize) -> ProtocolResult<()> {
        for column in 0..COLUMNS {
            self.insert(Cell::new(row, column)?);
        }
        Ok(())
    }

    /// Select every cell in a column (zero-based).
    pub fn select_column(&mut self, column: usize) -> ProtocolResult<()> {
        for row in 0..ROWS {
            self.insert(Cell::new(row, column)?);
        }
        Ok(())
    }

    /// Number of selected cells.
    pub fn len(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// True when no cell is selected.
    pub fn is_empty(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    /// Selected cells in index order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        Cell::all().filter(move |cell| self.contains(*cell))
    }

    /// Selected cell indices.
    pub fn indices(&self) -> BTreeSet<usize> {
        self.cells().map(|cell| cell.index()).collect()
    }

    /// Encode as 24 uppercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.bytes)
    }

    /// Decode from exactly 24 hex characters (either case).
    pub fn from_hex(text: &str) -> ProtocolResult<Self> {
        if text.len() != MASK_HEX_LEN {
            return Err(ProtocolError::InvalidMask {
                mask: text.to_string(),
                reason: format!("expected {} hex characters, got {}", MASK_HEX_LEN, text.len()),
            });
        }
        let mut bytes = [0u8; MASK_BYTES];
        hex::decode_to_slice(text, &mut bytes).map_err(|e| ProtocolError::InvalidMask {
            mask: text.to_string(),
            reason: e.to_string(),
        })?;
        Ok(CellMask { bytes })
    }
}

impl fmt::Display for CellMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for CellMask {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        CellMask::from_hex(s)
    }
}

impl FromIterator<Cell> for CellMask {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        let mut mask = CellMask::new();
        for cell in iter {
            mask.insert(cell);
        }
        mask
    }
}

/// Encode a set of cell indices (`0..96`) as a 24-character uppercase hex mask.
pub fn encode_mask(selected: &BTreeSet<usize>) -> ProtocolResult<String> {
    Ok(CellMask::from_indices(selected.iter().copied())?.to_hex())
}

/// Decode a 24-character hex mask back into the set of selected cell indices.
pub fn decode_mask(mask: &str) -> ProtocolResult<BTreeSet<usize>> {
    Ok(CellMask::from_hex(mask)?.indices())
}

const _: () = assert!(CELL_COUNT == MASK_BYTES * 8);

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[usize]) -> BTreeSet<usize> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_encode_first_and_last_cell() {
        let hex = encode_mask(&set(&[0, 95])).unwrap();
        assert_eq!(hex, "010000000000000000000080");
    }

    #[test]
    fn test_encode_a01_h12_by_name() {
        let mask: CellMask = ["A01", "H12"]
            .iter()
            .map(|name| name.parse::<Cell>().unwrap())
            .collect();
        assert_eq!(mask.to_hex(), "010000000000000000000080");
    }

    #[test]
    fn test_encode_empty_and_full() {
        assert_eq!(encode_mask(&BTreeSet::new()).unwrap(), "000000000000000000000000");
        let all: BTreeSet<usize> = (0..96).collect();
        assert_eq!(encode_mask(&all).unwrap(), "FFFFFFFFFFFFFFFFFFFFFFFF");
        assert_eq!(CellMask::full().len(), 96);
    }

    #[test]
    fn test_lsb_first_within_byte() {
        assert_eq!(encode_mask(&set(&[7])).unwrap(), "800000000000000000000000");
        assert_eq!(encode_mask(&set(&[8])).unwrap(), "000100000000000000000000");
        assert_eq!(encode_mask(&set(&[9, 10])).unwrap(), "000600000000000000000000");
    }

    #[test]
    fn test_round_trip_edge_sets() {
        let sets = [
            BTreeSet::new(),
            (0..96).collect(),
            set(&[0]),
            set(&[95]),
            (0..96).filter(|i| i % 2 == 0).collect(),
            (0..96).filter(|i| i % 7 == 3).collect(),
        ];
        for selected in sets {
            let hex = encode_mask(&selected).unwrap();
            assert_eq!(decode_mask(&hex).unwrap(), selected);
        }
    }

    #[test]
    fn test_round_trip_every_single_cell() {
        for i in 0..96 {
            let selected = set(&[i]);
            assert_eq!(decode_mask(&encode_mask(&selected).unwrap()).unwrap(), selected);
        }
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        assert!(encode_mask(&set(&[96])).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_length_and_chars() {
        assert!(matches!(
            decode_mask("FFFF"),
            Err(ProtocolError::InvalidMask { .. })
        ));
        assert!(decode_mask("GG0000000000000000000000").is_err());
        assert_eq!(decode_mask("ff0000000000000000000000").unwrap().len(), 8);
    }

    #[test]
    fn test_select_row_and_column() {
        let mut mask = CellMask::new();
        mask.select_row(0).unwrap();
        assert_eq!(mask.len(), 12);
        assert_eq!(mask.to_hex(), "FF0F00000000000000000000");

        let mut mask = CellMask::new();
        mask.select_column(11).unwrap();
        assert_eq!(mask.len(), 8);
        assert!(mask.contains("H12".parse().unwrap()));
        assert!(mask.contains("A12".parse().unwrap()));
        assert!(!mask.contains("A11".parse().unwrap()));

        assert!(mask.select_row(8).is_err());
    }

    #[test]
    fn test_insert_remove() {
        let cell: Cell = "C05".parse().unwrap();
        let mut mask = CellMask::new();
        mask.insert(cell);
        assert!(mask.contains(cell));
        mask.remove(cell);
        assert!(mask.is_empty());
    }
}
