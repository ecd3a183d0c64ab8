//! Physical key codes and symbolic translation output.

use serde::{Deserialize, Serialize};

/// A physical key identifier as delivered in key-press events.
///
/// Key codes name positions, not symbols: code 38 is the same physical key
/// whether the active layout prints it as `a` or `q`.  Translation through
/// the mirrored state is what turns a code into symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keycode(pub u32);

impl std::fmt::Display for Keycode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Keycode {
    fn from(raw: u32) -> Self {
        Keycode(raw)
    }
}

/// One keysym produced by a key translation: the raw protocol value plus the
/// resolved symbolic name (e.g. `0x0061` / `"a"`).
///
/// Name resolution is done by the keymap backend; this type just carries the
/// result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Raw keysym value.
    pub keysym: u32,
    /// Symbolic name as resolved by the backend.
    pub name: String,
}

/// The full symbolic output for one key press under the current state:
/// zero or more keysyms plus the UTF-8 text they compose to.
///
/// A key bound to nothing under the current modifiers yields an empty
/// sequence; that is a valid translation result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolSequence {
    /// The keysyms, in protocol order.
    pub symbols: Vec<Symbol>,
    /// UTF-8 text for the press; empty for non-printing keys.
    pub text: String,
}

impl SymbolSequence {
    /// Returns `true` if the press produced no symbols at all.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl std::fmt::Display for SymbolSequence {
    /// Formats the sequence the way the interactive session prints it:
    /// `keysyms [ a ] unicode [ a ]`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "keysyms [ ")?;
        for sym in &self.symbols {
            write!(f, "{} ", sym.name)?;
        }
        write!(f, "] unicode [ {} ]", self.text)
    }
}
