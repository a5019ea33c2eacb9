//! Prefix formatting for merged output.
//!
//! Every command gets a label padded to the width of the longest label and painted
//! with a background color picked from its position in the command list.

use crate::process::ProcessHandle;

/// Number of usable background colors in the 256-color palette.
pub const PALETTE_SIZE: usize = 230;

/// 256-color background code that blends into a black terminal.
const SKIPPED_BACKGROUND: u8 = 16;

/// Background/foreground pair assigned to one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swatch {
    pub background: u8,
    /// `None` leaves the terminal's default foreground on dark backgrounds.
    pub foreground: Option<u8>,
}

/// Maps a command index to its swatch, wrapping around the palette.
pub fn swatch(index: usize) -> Swatch {
    let mut code = (index % PALETTE_SIZE) as u8 + 1;
    if code >= SKIPPED_BACKGROUND {
        code += 1;
    }
    Swatch {
        background: code,
        foreground: if is_dark(code) { None } else { Some(0) },
    }
}

// Blue, dark gray and the cube rows starting at 16, 52 and 88.
fn is_dark(code: u8) -> bool {
    let row = (i32::from(code) - 4) / 6;
    matches!(row, 2 | 8 | 14) || code == 4 || code == 8
}

/// Paints `text` with the swatch belonging to `index`.
pub fn colorize(text: &str, index: usize) -> String {
    let swatch = swatch(index);
    let fg = match swatch.foreground {
        Some(code) => format!("\u{1b}[3{}m", code),
        None => String::new(),
    };
    format!("\u{1b}[48;5;{}m{}{}\u{1b}[0m", swatch.background, fg, text)
}

/// Right-pads `text` with spaces to `width` characters; longer input is kept as is.
pub fn rpad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    let mut out = text.to_string();
    if len < width {
        out.push_str(&" ".repeat(width - len));
    }
    out
}

/// Formats every raw prefix against the widest one in the list.
pub fn format_prefixes<S: AsRef<str>>(prefixes: &[S], color: bool) -> Vec<String> {
    let width = prefixes
        .iter()
        .map(|p| p.as_ref().chars().count())
        .max()
        .unwrap_or(0);
    prefixes
        .iter()
        .enumerate()
        .map(|(index, prefix)| {
            let padded = rpad(prefix.as_ref(), width);
            if color {
                colorize(&padded, index)
            } else {
                padded
            }
        })
        .collect()
}

/// Sets the display prefix of every started process.
pub fn apply_prefixes(handles: &mut [ProcessHandle], color: bool) {
    let raw: Vec<&str> = handles.iter().map(|h| h.spec.prefix.as_str()).collect();
    let formatted = format_prefixes(&raw, color);
    for (handle, prefix) in handles.iter_mut().zip(formatted) {
        handle.prefix = prefix;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> String {
        String::from_utf8(strip_ansi_escapes::strip(text.as_bytes())).unwrap()
    }

    #[test]
    fn pads_to_widest_prefix() {
        let formatted = format_prefixes(&["a", "bb"], true);
        assert_eq!(plain(&formatted[0]), "a ");
        assert_eq!(plain(&formatted[1]), "bb");
        assert_ne!(swatch(0), swatch(1));
        assert_ne!(formatted[0], formatted[1]);
    }

    #[test]
    fn longer_prefix_is_not_truncated() {
        assert_eq!(rpad("service", 3), "service");
        assert_eq!(rpad("é", 3), "é  ");
    }

    #[test]
    fn formatting_is_deterministic() {
        let prefixes = ["api", "web", "worker"];
        assert_eq!(
            format_prefixes(&prefixes, true),
            format_prefixes(&prefixes, true)
        );
    }

    #[test]
    fn palette_skips_black_and_wraps() {
        assert_eq!(swatch(0).background, 1);
        assert_eq!(swatch(14).background, 15);
        assert_eq!(swatch(15).background, 17);
        assert_eq!(swatch(PALETTE_SIZE - 1).background, 231);
        assert_eq!(swatch(PALETTE_SIZE), swatch(0));
        assert!((0..PALETTE_SIZE).all(|i| swatch(i).background != SKIPPED_BACKGROUND));
    }

    #[test]
    fn dark_backgrounds_keep_default_foreground() {
        assert_eq!(swatch(0).foreground, Some(0));
        assert_eq!(swatch(3).foreground, None); // code 4
        assert_eq!(swatch(7).foreground, None); // code 8
        assert_eq!(swatch(15).foreground, None); // code 17
        assert_eq!(swatch(49).foreground, Some(0)); // code 51
        assert_eq!(swatch(50).foreground, None); // code 52
    }

    #[test]
    fn colorize_emits_background_and_reset() {
        assert_eq!(colorize("x", 0), "\u{1b}[48;5;1m\u{1b}[30mx\u{1b}[0m");
        assert_eq!(colorize("x", 3), "\u{1b}[48;5;4mx\u{1b}[0m");
    }

    #[test]
    fn color_can_be_disabled() {
        assert_eq!(format_prefixes(&["a", "bb"], false), vec!["a ", "bb"]);
        assert!(format_prefixes::<&str>(&[], true).is_empty());
    }
}
