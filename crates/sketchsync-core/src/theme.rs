//! Light/dark surface colors.

use crate::stroke::SerializableColor;
use serde::{Deserialize, Serialize};

/// Surface theme. Only the background and default ink depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// Full-surface background; also the eraser color.
    pub fn background(self) -> SerializableColor {
        match self {
            Theme::Light => SerializableColor::white(),
            Theme::Dark => SerializableColor::rgb(0x1f, 0x29, 0x37),
        }
    }

    /// Default pencil color.
    pub fn default_ink(self) -> SerializableColor {
        match self {
            Theme::Light => SerializableColor::black(),
            Theme::Dark => SerializableColor::rgb(0x4a, 0xde, 0x80),
        }
    }
}
