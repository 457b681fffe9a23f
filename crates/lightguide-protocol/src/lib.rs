//! LightGuide Serial Protocol
//!
//! This crate provides types and utilities for talking to a LightGuide
//! lighting panel: an 8×12 grid of addressable cells (rows `A`-`H`,
//! columns `1`-`12`) driven over a serial link with a small ASCII protocol.
//!
//! # Protocol Overview
//!
//! Every outbound command is a single frame written in one piece:
//!
//! - **Frames** are delimited by `<` and `>` and hold comma-separated fields
//! - **Fields** are never escaped, so free-text fields must not contain `,`, `<` or `>`
//! - **ACK**: when enabled, the panel answers each frame with `<ACK>`
//!
//! | Command | Frame |
//! |---|---|
//! | Brightness | `<A,1,L,empty,0,0,0,BRIGHT>` |
//! | Mask colour | `<A,1,M,MASKHEX,R,G,B>` |
//! | Single cell | `<ROW,COL,S,NOTE,R,G,B>` |
//! | Panel off | `<A,1,X,empty>` |
//! | Blank panel | `<A,1,X, >` |
//!
//! # Cell Masks
//!
//! A mask selects any subset of the 96 cells. Cell `row * 12 + column` maps
//! to bit `index % 8` of byte `index / 8` (LSB first), and the 12 bytes are
//! sent as 24 uppercase hex characters.
//!
//! # Example
//!
//! ```rust
//! use lightguide_protocol::{Cell, CellMask, Command, Rgb};
//!
//! let mut mask = CellMask::new();
//! mask.insert("A01".parse::<Cell>()?);
//! mask.insert("H12".parse::<Cell>()?);
//! assert_eq!(mask.to_hex(), "010000000000000000000080");
//!
//! let cmd = Command::mask_color(mask, Rgb::new(255, 0, 0));
//! assert_eq!(cmd.to_frame_string(), "<A,1,M,010000000000000000000080,255,0,0>");
//! # Ok::<(), lightguide_protocol::ProtocolError>(())
//! ```

mod cell;
mod codec;
mod commands;
mod constants;
mod error;
mod mask;

pub use cell::*;
pub use codec::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use mask::*;
