//! Protocol constants
//!
//! Grid geometry, frame delimiters and fixed field values used by the
//! LightGuide panel firmware.

// ============================================================================
// Grid
// ============================================================================

/// Number of rows on the panel (`A`-`H`).
pub const ROWS: usize = 8;
/// Number of columns on the panel (`1`-`12`).
pub const COLUMNS: usize = 12;
/// Total number of addressable cells.
pub const CELL_COUNT: usize = ROWS * COLUMNS;
/// Size of an encoded cell mask in bytes.
pub const MASK_BYTES: usize = CELL_COUNT / 8;
/// Length of a hex-encoded cell mask.
pub const MASK_HEX_LEN: usize = MASK_BYTES * 2;

// ============================================================================
// Framing
// ============================================================================

/// Opening frame delimiter.
pub const FRAME_START: u8 = b'<';
/// Closing frame delimiter.
pub const FRAME_END: u8 = b'>';
/// Field separator inside a frame.
pub const FIELD_SEPARATOR: char = ',';
/// Acknowledgement token sent by the panel after processing a frame.
pub const ACK_TOKEN: &[u8] = b"<ACK>";
/// Placeholder used for unused text fields.
pub const EMPTY_FIELD: &str = "empty";

// ============================================================================
// Command Tags
// ============================================================================

/// Set global brightness.
pub const TAG_BRIGHTNESS: &str = "L";
/// Light every cell in a mask with one colour.
pub const TAG_MASK_COLOR: &str = "M";
/// Light a single cell and show a note.
pub const TAG_SINGLE_CELL: &str = "S";
/// Turn the panel off.
pub const TAG_OFF: &str = "X";

// ============================================================================
// Serial Line
// ============================================================================

/// Baud rate the panel firmware listens at.
pub const DEFAULT_BAUD_RATE: u32 = 500_000;
