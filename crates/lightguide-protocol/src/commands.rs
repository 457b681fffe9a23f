//! Commands that can be sent to the panel firmware.
//!
//! Each command encodes to exactly one `<`...`>` frame. Numeric fields are
//! clamped to `0..=255` when the command is built, so encoding itself never
//! fails; anything that cannot be clamped (a bad mask, a bad cell, a note
//! that would break the framing) is rejected with
//! [`ProtocolError::InvalidCommand`] before it can reach the wire.

use std::fmt;
use std::str::FromStr;

use log::trace;

use crate::cell::Cell;
use crate::codec::{encode_frame, split_frame};
use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::mask::CellMask;

/// Clamp an arbitrary integer into a protocol byte field.
pub fn clamp_u8(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

/// An 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Solid red.
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    /// Solid green.
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    /// Solid blue.
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);
    /// All channels off.
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    /// Create a colour from in-range channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Create a colour, clamping each channel to `0..=255`.
    pub fn clamped(r: i64, g: i64, b: i64) -> Self {
        Rgb {
            r: clamp_u8(r),
            g: clamp_u8(g),
            b: clamp_u8(b),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = ProtocolError;

    /// Parse `R,G,B`; each channel is clamped.
    fn from_str(s: &str) -> ProtocolResult<Self> {
        let parts: Vec<&str> = s.split(FIELD_SEPARATOR).map(str::trim).collect();
        if parts.len() != 3 {
            return Err(ProtocolError::InvalidCommand(format!(
                "colour {:?} is not R,G,B",
                s
            )));
        }
        let channel = |text: &str| {
            text.parse::<i64>().map_err(|_| {
                ProtocolError::InvalidCommand(format!("bad colour channel {:?}", text))
            })
        };
        Ok(Rgb::clamped(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?))
    }
}

/// Commands that can be sent to the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set global brightness.
    SetBrightness {
        /// Brightness level.
        level: u8,
    },

    /// Light every cell in the mask with one colour.
    SetMaskColor {
        /// Cells to light.
        mask: CellMask,
        /// Colour to use.
        color: Rgb,
    },

    /// Light one cell and show a note for it.
    SetSingleCellText {
        /// The cell to light.
        cell: Cell,
        /// Free text shown by the panel (no `,`, `<` or `>`).
        note: String,
        /// Colour to use.
        color: Rgb,
    },

    /// Turn the panel off.
    PanelOff,

    /// Clear all cells without powering the panel down.
    BlankPanel,
}

impl Command {
    /// Brightness command; `level` is clamped to `0..=255`.
    pub fn brightness(level: i64) -> Command {
        Command::SetBrightness {
            level: clamp_u8(level),
        }
    }

    /// Mask colour command from an already-built mask.
    pub fn mask_color(mask: CellMask, color: Rgb) -> Command {
        Command::SetMaskColor { mask, color }
    }

    /// Mask colour command from a 24-character hex mask.
    pub fn mask_color_hex(mask: &str, color: Rgb) -> ProtocolResult<Command> {
        let mask = CellMask::from_hex(mask)
            .map_err(|e| ProtocolError::InvalidCommand(e.to_string()))?;
        Ok(Command::SetMaskColor { mask, color })
    }

    /// Single-cell command. The note must be printable ASCII without frame
    /// delimiters or separators.
    pub fn single_cell(cell: Cell, note: impl Into<String>, color: Rgb) -> ProtocolResult<Command> {
        let note = note.into();
        validate_note(&note)?;
        Ok(Command::SetSingleCellText { cell, note, color })
    }

    /// Single-cell command addressed by row letter and one-based column.
    pub fn single_cell_at(
        row: char,
        column: u8,
        note: impl Into<String>,
        color: Rgb,
    ) -> ProtocolResult<Command> {
        let cell = Cell::from_label(row, column)
            .map_err(|e| ProtocolError::InvalidCommand(e.to_string()))?;
        Command::single_cell(cell, note, color)
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetBrightness { .. } => "SetBrightness",
            Command::SetMaskColor { .. } => "SetMaskColor",
            Command::SetSingleCellText { .. } => "SetSingleCellText",
            Command::PanelOff => "PanelOff",
            Command::BlankPanel => "BlankPanel",
        }
    }

    /// Encode the command as the bytes of one frame.
    pub fn encode(&self) -> Vec<u8> {
        let frame = self.to_frame_string();
        trace!("encoded {} as {}", self.name(), frame);
        frame.into_bytes()
    }

    /// Get the frame text, including delimiters.
    pub fn to_frame_string(&self) -> String {
        match self {
            Command::SetBrightness { level } => {
                let level = level.to_string();
                encode_frame(&["A", "1", TAG_BRIGHTNESS, EMPTY_FIELD, "0", "0", "0", &level])
            }
            Command::SetMaskColor { mask, color } => {
                let hex = mask.to_hex();
                let (r, g, b) = (color.r.to_string(), color.g.to_string(), color.b.to_string());
                encode_frame(&["A", "1", TAG_MASK_COLOR, &hex, &r, &g, &b])
            }
            Command::SetSingleCellText { cell, note, color } => {
                let row = cell.row_letter().to_string();
                let column = cell.column_number().to_string();
                let (r, g, b) = (color.r.to_string(), color.g.to_string(), color.b.to_string());
                encode_frame(&[&row, &column, TAG_SINGLE_CELL, note, &r, &g, &b])
            }
            Command::PanelOff => encode_frame(&["A", "1", TAG_OFF, EMPTY_FIELD]),
            Command::BlankPanel => encode_frame(&["A", "1", TAG_OFF, " "]),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_frame_string())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    /// Parse a single outbound frame back into a command.
    fn from_str(s: &str) -> ProtocolResult<Command> {
        let fields = split_frame(s)?;
        let tag = fields.get(2).copied().unwrap_or_default();
        let invalid = |reason: &str| ProtocolError::InvalidCommand(format!("{}: {}", reason, s));

        match tag {
            TAG_BRIGHTNESS => {
                if fields.len() != 8 {
                    return Err(invalid("brightness frame needs 8 fields"));
                }
                if fields[3] != EMPTY_FIELD || fields[4..7] != ["0", "0", "0"] {
                    return Err(invalid("brightness frame needs empty,0,0,0 before the level"));
                }
                let level = fields[7]
                    .parse::<u8>()
                    .map_err(|_| invalid("brightness out of range"))?;
                Ok(Command::SetBrightness { level })
            }
            TAG_MASK_COLOR => {
                if fields.len() != 7 {
                    return Err(invalid("mask frame needs 7 fields"));
                }
                Command::mask_color_hex(fields[3], parse_color(&fields[4..7])?)
            }
            TAG_SINGLE_CELL => {
                if fields.len() != 7 {
                    return Err(invalid("single-cell frame needs 7 fields"));
                }
                let mut row = fields[0].chars();
                let (Some(row), None) = (row.next(), row.next()) else {
                    return Err(invalid("row must be a single letter"));
                };
                let column = fields[1]
                    .parse::<u8>()
                    .map_err(|_| invalid("column is not a number"))?;
                Command::single_cell_at(row, column, fields[3], parse_color(&fields[4..7])?)
            }
            TAG_OFF => match fields.get(3).copied() {
                Some(EMPTY_FIELD) if fields.len() == 4 => Ok(Command::PanelOff),
                Some(" ") if fields.len() == 4 => Ok(Command::BlankPanel),
                _ => Err(invalid("malformed off frame")),
            },
            other => Err(ProtocolError::InvalidCommand(format!(
                "unknown command tag {:?} in {}",
                other, s
            ))),
        }
    }
}

fn parse_color(fields: &[&str]) -> ProtocolResult<Rgb> {
    let channel = |text: &str| {
        text.parse::<u8>()
            .map_err(|_| ProtocolError::InvalidCommand(format!("bad colour channel {:?}", text)))
    };
    Ok(Rgb::new(channel(fields[0])?, channel(fields[1])?, channel(fields[2])?))
}

fn validate_note(note: &str) -> ProtocolResult<()> {
    if let Some(bad) = note
        .chars()
        .find(|&c| {
            c == FIELD_SEPARATOR
                || c == FRAME_START as char
                || c == FRAME_END as char
                || !(c.is_ascii_graphic() || c == ' ')
        })
    {
        return Err(ProtocolError::InvalidCommand(format!(
            "note {:?} contains {:?}",
            note, bad
        )));
    }
    Ok(())
}
