//! Key identifiers and the hotkey binding
//!
//! Keys are named with DOM `KeyboardEvent.code` strings (`Space`, `KeyA`,
//! `Digit1`, `F9`) so hosts can forward key presses verbatim.

use std::str::FromStr;

/// A key that can be bound as the listening hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Space,
    Enter,
    Tab,
    Escape,
    /// Function key F1..F12
    F(u8),
    /// Letter key, uppercase ASCII
    Letter(char),
    Digit(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key code: {0}")]
pub struct KeyParseError(String);

impl FromStr for KeyCode {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let key = match s {
            "Space" => Some(KeyCode::Space),
            "Enter" => Some(KeyCode::Enter),
            "Tab" => Some(KeyCode::Tab),
            "Escape" => Some(KeyCode::Escape),
            _ => {
                if let Some(n) = s.strip_prefix('F') {
                    n.parse::<u8>()
                        .ok()
                        .filter(|n| (1..=12).contains(n))
                        .map(KeyCode::F)
                } else if let Some(c) = s.strip_prefix("Key") {
                    let mut chars = c.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) if c.is_ascii_alphabetic() => {
                            Some(KeyCode::Letter(c.to_ascii_uppercase()))
                        }
                        _ => None,
                    }
                } else if let Some(d) = s.strip_prefix("Digit") {
                    d.parse::<u8>().ok().filter(|d| *d <= 9).map(KeyCode::Digit)
                } else {
                    None
                }
            }
        };
        key.ok_or_else(|| KeyParseError(s.to_string()))
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyCode::Space => write!(f, "Space"),
            KeyCode::Enter => write!(f, "Enter"),
            KeyCode::Tab => write!(f, "Tab"),
            KeyCode::Escape => write!(f, "Escape"),
            KeyCode::F(n) => write!(f, "F{}", n),
            KeyCode::Letter(c) => write!(f, "Key{}", c),
            KeyCode::Digit(d) => write!(f, "Digit{}", d),
        }
    }
}

impl KeyCode {
    /// Map a macOS virtual key code (kVK_*) to a key
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    pub fn from_macos_keycode(code: u16) -> Option<Self> {
        let key = match code {
            49 => KeyCode::Space,
            36 => KeyCode::Enter,
            48 => KeyCode::Tab,
            53 => KeyCode::Escape,
            122 => KeyCode::F(1),
            120 => KeyCode::F(2),
            99 => KeyCode::F(3),
            118 => KeyCode::F(4),
            96 => KeyCode::F(5),
            97 => KeyCode::F(6),
            98 => KeyCode::F(7),
            100 => KeyCode::F(8),
            101 => KeyCode::F(9),
            109 => KeyCode::F(10),
            103 => KeyCode::F(11),
            111 => KeyCode::F(12),
            29 => KeyCode::Digit(0),
            18 => KeyCode::Digit(1),
            19 => KeyCode::Digit(2),
            20 => KeyCode::Digit(3),
            21 => KeyCode::Digit(4),
            23 => KeyCode::Digit(5),
            22 => KeyCode::Digit(6),
            26 => KeyCode::Digit(7),
            28 => KeyCode::Digit(8),
            25 => KeyCode::Digit(9),
            _ => return ANSI_LETTERS
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, letter)| KeyCode::Letter(*letter)),
        };
        Some(key)
    }
}

/// ANSI layout letter positions
const ANSI_LETTERS: [(u16, char); 26] = [
    (0, 'A'), (11, 'B'), (8, 'C'), (2, 'D'), (14, 'E'), (3, 'F'), (5, 'G'),
    (4, 'H'), (34, 'I'), (38, 'J'), (40, 'K'), (37, 'L'), (46, 'M'), (45, 'N'),
    (31, 'O'), (35, 'P'), (12, 'Q'), (15, 'R'), (1, 'S'), (17, 'T'), (32, 'U'),
    (9, 'V'), (13, 'W'), (7, 'X'), (16, 'Y'), (6, 'Z'),
];

/// The key that toggles always-listening mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBinding {
    key: KeyCode,
}

impl HotkeyBinding {
    pub fn new(key: KeyCode) -> Self {
        Self { key }
    }

    pub fn key(&self) -> KeyCode {
        self.key
    }

    pub fn rebind(&mut self, key: KeyCode) {
        self.key = key;
    }

    pub fn matches(&self, key: KeyCode) -> bool {
        self.key == key
    }
}

impl Default for HotkeyBinding {
    fn default() -> Self {
        Self::new(KeyCode::Space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dom_codes() {
        assert_eq!("Space".parse::<KeyCode>().unwrap(), KeyCode::Space);
        assert_eq!("F12".parse::<KeyCode>().unwrap(), KeyCode::F(12));
        assert_eq!("KeyM".parse::<KeyCode>().unwrap(), KeyCode::Letter('M'));
        assert_eq!("Digit7".parse::<KeyCode>().unwrap(), KeyCode::Digit(7));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("F13".parse::<KeyCode>().is_err());
        assert!("KeyAB".parse::<KeyCode>().is_err());
        assert!("Meta".parse::<KeyCode>().is_err());
    }

    #[test]
    fn test_display_round_trips_names() {
        for name in ["Space", "Escape", "F3", "KeyQ", "Digit0"] {
            assert_eq!(name.parse::<KeyCode>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn test_macos_keycodes() {
        assert_eq!(KeyCode::from_macos_keycode(49), Some(KeyCode::Space));
        assert_eq!(KeyCode::from_macos_keycode(101), Some(KeyCode::F(9)));
        assert_eq!(KeyCode::from_macos_keycode(0), Some(KeyCode::Letter('A')));
        assert_eq!(KeyCode::from_macos_keycode(255), None);
    }

    #[test]
    fn test_binding_matches() {
        let mut binding = HotkeyBinding::default();
        assert!(binding.matches(KeyCode::Space));
        binding.rebind(KeyCode::F(9));
        assert!(!binding.matches(KeyCode::Space));
        assert!(binding.matches(KeyCode::F(9)));
    }
}
