//! Line-oriented command syntax for `lightguide shell`.
//!
//! ```text
//! brightness 80
//! mask A01,H12 255 0 0        # cells
//! mask A,C 0 0 255            # whole rows
//! mask 1,12 0 255 0           # whole columns
//! mask FFFFFFFFFFFFFFFFFFFFFFFF 255 255 255
//! cell B07 buffer only 0 255 0
//! blank
//! off
//! quit
//! ```

use lightguide_protocol::{
    parse_column, parse_row, Cell, CellMask, Command, ProtocolError, ProtocolResult, Rgb,
    MASK_HEX_LEN,
};

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Blank line or comment.
    Empty,
    /// Leave the shell.
    Quit,
    /// Commands to queue, in order.
    Send(Vec<Command>),
}

fn usage(message: &str) -> ProtocolError {
    ProtocolError::InvalidCommand(message.to_string())
}

/// Parse one line of shell input.
pub fn parse_line(line: &str) -> ProtocolResult<ShellCommand> {
    let line = line.split('#').next().unwrap_or_default().trim();
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = tokens.split_first() else {
        return Ok(ShellCommand::Empty);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "quit" | "exit" => return Ok(ShellCommand::Quit),
        "off" => vec![Command::PanelOff],
        "blank" => vec![Command::BlankPanel],
        "brightness" => {
            let [level] = args else {
                return Err(usage("usage: brightness <0-255>"));
            };
            let level = level
                .parse::<i64>()
                .map_err(|_| usage("brightness must be a number"))?;
            vec![Command::brightness(level)]
        }
        "mask" => {
            let [selection, r, g, b] = args else {
                return Err(usage("usage: mask <selection> <r> <g> <b>"));
            };
            vec![Command::mask_color(parse_selection(selection)?, parse_rgb(r, g, b)?)]
        }
        "cell" => {
            if args.len() < 5 {
                return Err(usage("usage: cell <well> <note...> <r> <g> <b>"));
            }
            let cell: Cell = args[0].parse()?;
            let (note, color) = args[1..].split_at(args.len() - 4);
            let color = parse_rgb(color[0], color[1], color[2])?;
            vec![
                Command::BlankPanel,
                Command::single_cell(cell, note.join(" "), color)?,
            ]
        }
        other => return Err(usage(&format!("unknown shell command {:?}", other))),
    };
    Ok(ShellCommand::Send(command))
}

fn parse_rgb(r: &str, g: &str, b: &str) -> ProtocolResult<Rgb> {
    let channel = |text: &str| {
        text.parse::<i64>()
            .map_err(|_| usage(&format!("bad colour channel {:?}", text)))
    };
    Ok(Rgb::clamped(channel(r)?, channel(g)?, channel(b)?))
}

/// Parse a comma-separated selection into a mask.
///
/// Each item is a well (`A01`), a row letter (`C`), a column number (`12`)
/// or, on its own, a 24-digit hex mask.
pub fn parse_selection(selection: &str) -> ProtocolResult<CellMask> {
    if selection.len() == MASK_HEX_LEN && !selection.contains(',') {
        return CellMask::from_hex(selection);
    }

    let mut mask = CellMask::new();
    for item in selection.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if item.chars().all(|c| c.is_ascii_digit()) {
            mask.select_column(parse_column(item)?)?;
        } else if item.len() == 1 {
            mask.select_row(parse_row(item)?)?;
        } else {
            mask.insert(item.parse()?);
        }
    }
    Ok(mask)
}

/// Combine the `mask` subcommand's selection flags into one mask.
pub fn build_mask(
    cells: &[Cell],
    rows: &[String],
    columns: &[String],
    hex: Option<&str>,
) -> ProtocolResult<CellMask> {
    let mut mask = match hex {
        Some(hex) => CellMask::from_hex(hex)?,
        None => CellMask::new(),
    };
    for cell in cells {
        mask.insert(*cell);
    }
    for row in rows {
        mask.select_row(parse_row(row)?)?;
    }
    for column in columns {
        mask.select_column(parse_column(column)?)?;
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(line: &str) -> Vec<String> {
        match parse_line(line).unwrap() {
            ShellCommand::Send(commands) => commands.iter().map(Command::to_frame_string).collect(),
            other => panic!("expected commands, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_and_quit() {
        assert_eq!(parse_line("").unwrap(), ShellCommand::Empty);
        assert_eq!(parse_line("   # comment").unwrap(), ShellCommand::Empty);
        assert_eq!(parse_line("quit").unwrap(), ShellCommand::Quit);
        assert_eq!(parse_line("EXIT").unwrap(), ShellCommand::Quit);
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(frames("off"), vec!["<A,1,X,empty>"]);
        assert_eq!(frames("blank"), vec!["<A,1,X, >"]);
        assert_eq!(frames("brightness 300"), vec!["<A,1,L,empty,0,0,0,255>"]);
    }

    #[test]
    fn test_mask_selections() {
        assert_eq!(
            frames("mask A01,H12 255 0 0"),
            vec!["<A,1,M,010000000000000000000080,255,0,0>"]
        );
        assert_eq!(
            frames("mask A 0 0 255"),
            vec!["<A,1,M,FF0F00000000000000000000,0,0,255>"]
        );
        assert_eq!(
            frames("mask ffffffffffffffffffffffff 1 2 3"),
            vec!["<A,1,M,FFFFFFFFFFFFFFFFFFFFFFFF,1,2,3>"]
        );
    }

    #[test]
    fn test_column_selection() {
        let mask = parse_selection("1").unwrap();
        assert_eq!(mask.len(), 8);
        assert!(mask.cells().all(|cell| cell.column() == 0));
    }

    #[test]
    fn test_cell_with_spaced_note() {
        assert_eq!(
            frames("cell B07 buffer only 0 255 0"),
            vec!["<A,1,X, >", "<B,7,S,buffer only,0,255,0>"]
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse_line("brightness").is_err());
        assert!(parse_line("brightness loud").is_err());
        assert!(parse_line("mask A01 255 0").is_err());
        assert!(parse_line("mask Z99 255 0 0").is_err());
        assert!(parse_line("cell A01 a,b 0 0 0").is_err());
        assert!(parse_line("dance").is_err());
    }

    #[test]
    fn test_build_mask_unions_flags() {
        let cells = vec!["H12".parse().unwrap()];
        let rows = vec!["A".to_string()];
        let columns = vec!["12".to_string()];
        let mask = build_mask(&cells, &rows, &columns, None).unwrap();
        // Row A (12) + column 12 (8, one shared with row A) + H12 (already in column 12).
        assert_eq!(mask.len(), 19);

        let from_hex = build_mask(&[], &[], &[], Some("010000000000000000000080")).unwrap();
        assert_eq!(from_hex.len(), 2);
        assert!(build_mask(&[], &[], &[], Some("00")).is_err());
    }
}
