//! Seating layout: places an ordered player list on a circle around the table center.
//!
//! Seat 0 sits at the top; seats proceed clockwise in screen coordinates (y grows downward),
//! equally spaced, all at `0.75 * min(w/2, h/2)` from the center.

use std::f64::consts::{FRAC_PI_2, TAU};
use std::fmt;

/// Fraction of the half-extent used as the seating radius.
pub const RADIUS_FACTOR: f64 = 0.75;

/// Drawing surface size in pixels (or any unit).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
}

impl Surface {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// A surface is ready once both dimensions are known and positive.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point {
            x: self.width / 2.0,
            y: self.height / 2.0,
        }
    }

    #[must_use]
    pub fn radius(&self) -> f64 {
        RADIUS_FACTOR * (self.width / 2.0).min(self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Surface dimensions are not known yet; nothing should be drawn.
    SurfaceNotReady,
    /// The table is empty.
    NoSeats,
    SeatOutOfRange { index: usize, total: usize },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SurfaceNotReady => write!(f, "surface dimensions are not known yet"),
            Self::NoSeats => write!(f, "no seats to lay out"),
            Self::SeatOutOfRange { index, total } => {
                write!(f, "seat {index} is out of range for {total} seats")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

/// Angle of seat `index` in radians: `-π/2` (top) for seat 0, increasing clockwise.
///
/// # Errors
///
/// Returns an error for an empty table or an index past the end.
#[allow(clippy::cast_precision_loss)]
pub fn seat_angle(index: usize, total: usize) -> Result<f64, LayoutError> {
    if total == 0 {
        return Err(LayoutError::NoSeats);
    }
    if index >= total {
        return Err(LayoutError::SeatOutOfRange { index, total });
    }
    Ok((index as f64 / total as f64).mul_add(TAU, -FRAC_PI_2))
}

/// Position of seat `index` out of `total` on `surface`.
///
/// # Errors
///
/// Returns [`LayoutError::SurfaceNotReady`] before the surface has a size, rather than a
/// fabricated center point, and the [`seat_angle`] errors otherwise.
pub fn seat_position(index: usize, total: usize, surface: Surface) -> Result<Point, LayoutError> {
    if !surface.is_ready() {
        return Err(LayoutError::SurfaceNotReady);
    }
    let angle = seat_angle(index, total)?;
    let center = surface.center();
    let radius = surface.radius();
    Ok(Point {
        x: radius.mul_add(angle.cos(), center.x),
        y: radius.mul_add(angle.sin(), center.y),
    })
}

/// Positions of every seat. An empty table yields no positions.
///
/// # Errors
///
/// Returns [`LayoutError::SurfaceNotReady`] before the surface has a size.
pub fn seat_positions(total: usize, surface: Surface) -> Result<Vec<Point>, LayoutError> {
    if !surface.is_ready() {
        return Err(LayoutError::SurfaceNotReady);
    }
    (0..total)
        .map(|index| seat_position(index, total, surface))
        .collect()
}

/// Avatar initials: first two characters, uppercased.
#[must_use]
pub fn initials(name: &str) -> String {
    name.trim().chars().take(2).flat_map(char::to_uppercase).collect()
}
