/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Placement of the draggable local preview tile over the remote video.
//!
//! Pure geometry in container pixels; the presentation layer feeds it pointer
//! positions and renders the result.

/// Viewports narrower than this use the compact tile.
pub const COMPACT_BREAKPOINT: f64 = 768.0;

const TILE: Size = Size {
    width: 192.0,
    height: 144.0,
};
const COMPACT_TILE: Size = Size {
    width: 96.0,
    height: 128.0,
};

/// The tile may leave the container but this much of it stays visible.
const MIN_VISIBLE: f64 = 20.0;
const SNAP_DISTANCE: f64 = 50.0;
const CORNER_MARGIN: f64 = 16.0;
const COMPACT_BOTTOM_MARGIN: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfViewLayout {
    pub container: Size,
    pub compact: bool,
}

impl SelfViewLayout {
    /// Picks the compact tile from the viewport width.
    pub fn for_viewport(container: Size, viewport_width: f64) -> Self {
        Self {
            container,
            compact: viewport_width < COMPACT_BREAKPOINT,
        }
    }

    pub fn tile(&self) -> Size {
        if self.compact {
            COMPACT_TILE
        } else {
            TILE
        }
    }

    /// Bottom-right corner, where the tile starts when a call begins.
    pub fn initial_position(&self) -> Position {
        let tile = self.tile();
        let bottom = if self.compact {
            COMPACT_BOTTOM_MARGIN
        } else {
            CORNER_MARGIN
        };
        Position::new(
            self.container.width - tile.width - CORNER_MARGIN,
            self.container.height - tile.height - bottom,
        )
    }

    /// Clamps a dragged position so at least 20 px of the tile stay on screen.
    pub fn constrain(&self, pos: Position) -> Position {
        let tile = self.tile();
        Position::new(
            pos.x
                .min(self.container.width - MIN_VISIBLE)
                .max(-(tile.width - MIN_VISIBLE)),
            pos.y
                .min(self.container.height - MIN_VISIBLE)
                .max(-(tile.height - MIN_VISIBLE)),
        )
    }

    /// Snaps to the nearest corner within 50 px; otherwise returns `pos`.
    pub fn snap_to_corner(&self, pos: Position) -> Position {
        self.corners()
            .into_iter()
            .map(|corner| (corner.distance(&pos), corner))
            .filter(|(distance, _)| *distance < SNAP_DISTANCE)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map_or(pos, |(_, corner)| corner)
    }

    fn corners(&self) -> [Position; 4] {
        let tile = self.tile();
        let right = self.container.width - tile.width - CORNER_MARGIN;
        let bottom = self.container.height - tile.height - CORNER_MARGIN;
        [
            Position::new(CORNER_MARGIN, CORNER_MARGIN),
            Position::new(right, CORNER_MARGIN),
            Position::new(CORNER_MARGIN, bottom),
            Position::new(right, bottom),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop() -> SelfViewLayout {
        SelfViewLayout::for_viewport(
            Size {
                width: 1000.0,
                height: 600.0,
            },
            1280.0,
        )
    }

    #[test]
    fn test_initial_position_is_bottom_right() {
        assert_eq!(desktop().initial_position(), Position::new(792.0, 440.0));

        let phone = SelfViewLayout::for_viewport(
            Size {
                width: 375.0,
                height: 700.0,
            },
            375.0,
        );
        assert!(phone.compact);
        assert_eq!(phone.initial_position(), Position::new(263.0, 568.0));
    }

    #[test]
    fn test_constrain_keeps_a_sliver_visible() {
        let layout = desktop();
        assert_eq!(
            layout.constrain(Position::new(-500.0, -500.0)),
            Position::new(-172.0, -124.0)
        );
        assert_eq!(
            layout.constrain(Position::new(5000.0, 5000.0)),
            Position::new(980.0, 580.0)
        );
        assert_eq!(
            layout.constrain(Position::new(300.0, 200.0)),
            Position::new(300.0, 200.0)
        );
    }

    #[test]
    fn test_snap_to_nearest_corner_only_when_close() {
        let layout = desktop();
        assert_eq!(
            layout.snap_to_corner(Position::new(30.0, 40.0)),
            Position::new(16.0, 16.0)
        );
        assert_eq!(
            layout.snap_to_corner(Position::new(780.0, 430.0)),
            Position::new(792.0, 440.0)
        );
        let middle = Position::new(400.0, 300.0);
        assert_eq!(layout.snap_to_corner(middle), middle);
    }
}
