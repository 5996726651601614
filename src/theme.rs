//! Theme mode token carried in the session location.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
    Outrunner,
    Vaporwave,
}

impl ThemeMode {
    pub const ALL: [ThemeMode; 4] = [
        ThemeMode::Light,
        ThemeMode::Dark,
        ThemeMode::Outrunner,
        ThemeMode::Vaporwave,
    ];

    pub fn token(self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
            ThemeMode::Outrunner => "outrunner",
            ThemeMode::Vaporwave => "vaporwave",
        }
    }

    /// Unknown tokens read as light.
    pub fn from_token(token: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|m| m.token() == token)
            .unwrap_or_default()
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip() {
        for mode in ThemeMode::ALL {
            assert_eq!(ThemeMode::from_token(mode.token()), mode);
        }
    }

    #[test]
    fn unknown_is_light() {
        assert_eq!(ThemeMode::from_token("solarized"), ThemeMode::Light);
        assert_eq!(ThemeMode::from_token(""), ThemeMode::Light);
    }
}
