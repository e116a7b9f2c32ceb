//! Minimal 2D vector used for spawn and respawn marker positions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in arena space, as reported by the arena geometry layer
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero() {
        assert_eq!(Vec2::default(), Vec2::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(Vec2::new(1.0, -2.5).to_string(), "(1.0, -2.5)");
    }
}
