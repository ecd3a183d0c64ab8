//! Standard-output symbol sink.

use std::io::Write;

use xkbmirror_core::{Keycode, SymbolSequence};

use crate::application::run_session::SymbolSink;

/// Prints one line per translated key press, in the classic interactive
/// format: `keycode [  38 ] keysyms [ a ] unicode [ a ]`.
pub struct StdoutSink;

fn format_line(keycode: Keycode, symbols: &SymbolSequence) -> String {
    format!("keycode [ {:3} ] {}", keycode.0, symbols)
}

impl SymbolSink for StdoutSink {
    fn emit(&mut self, keycode: Keycode, symbols: &SymbolSequence) {
        let mut out = std::io::stdout().lock();
        // A closed stdout is not worth dying over mid-session.
        let _ = writeln!(out, "{}", format_line(keycode, symbols));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xkbmirror_core::Symbol;

    #[test]
    fn test_line_format_matches_the_interactive_style() {
        let seq = SymbolSequence {
            symbols: vec![Symbol {
                keysym: 0x0061,
                name: "a".to_string(),
            }],
            text: "a".to_string(),
        };
        assert_eq!(
            format_line(Keycode(38), &seq),
            "keycode [  38 ] keysyms [ a ] unicode [ a ]"
        );
    }

    #[test]
    fn test_line_format_pads_short_keycodes() {
        let seq = SymbolSequence::default();
        assert_eq!(
            format_line(Keycode(9), &seq),
            "keycode [   9 ] keysyms [ ] unicode [  ]"
        );
    }
}
