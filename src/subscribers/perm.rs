//! # Per-type subscriber permissions.
//!
//! | Bit       | Letter | Effect                                                        |
//! |-----------|--------|---------------------------------------------------------------|
//! | `READ`    | `r`    | receives the event                                            |
//! | `WRITE`   | `w`    | also receives the shared out-structure                        |
//! | `EXECUTE` | `x`    | a non-zero status on a gated type stops the chain             |
//!
//! `e` is accepted as an alias of `x`.

use bitflags::bitflags;

bitflags! {
    /// Permission bits a subscriber holds for one inbound event type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Perm: u8 {
        const READ = 0b100;
        const WRITE = 0b010;
        const EXECUTE = 0b001;
    }
}

impl Perm {
    /// Parses a letter string such as `"rwx"`.
    ///
    /// Returns `None` on an unknown letter.
    pub fn parse(letters: &str) -> Option<Perm> {
        letters.trim().chars().try_fold(Perm::empty(), |acc, ch| {
            let bit = match ch.to_ascii_lowercase() {
                'r' => Perm::READ,
                'w' => Perm::WRITE,
                'x' | 'e' => Perm::EXECUTE,
                _ => return None,
            };
            Some(acc | bit)
        })
    }

    /// Renders the bits as `rwx` letters, `-` for absent ones.
    pub fn letters(self) -> String {
        [
            (Perm::READ, 'r'),
            (Perm::WRITE, 'w'),
            (Perm::EXECUTE, 'x'),
        ]
        .iter()
        .map(|&(bit, ch)| if self.contains(bit) { ch } else { '-' })
        .collect()
    }
}

impl Default for Perm {
    fn default() -> Self {
        Perm::READ
    }
}
