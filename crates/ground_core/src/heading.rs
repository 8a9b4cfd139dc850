//! 16-bit headings and the fixed-point trigonometry behind them.
//!
//! A heading is a signed 16-bit angle: 0 points along +Z and one full turn is
//! 65536 discrete units, wrapping modulo the circle. Turn rates are expressed
//! in heading units per tick.
//!
//! The trig here is approximate but exact-deterministic: a Bhaskara ratio for
//! sine and an octant polynomial for the arctangent, both pure fixed-point.

use crate::math::{fixed_sqrt, Fixed, Vec3Fixed};

/// Signed 16-bit heading, 0 = +Z, wraps modulo [`CIRCLE_DIVS`].
pub type Heading = i16;

/// Heading units in one full circle.
pub const CIRCLE_DIVS: i32 = 65536;

/// Heading units in half a circle.
pub const HALF_CIRCLE: i32 = 32768;

/// π as a fixed-point constant.
#[must_use]
pub fn pi() -> Fixed {
    Fixed::from_num(core::f64::consts::PI)
}

/// Sine of an angle in radians.
///
/// Reduces into [−π, π] and applies the Bhaskara I ratio; the absolute error
/// stays below 0.002 over the whole circle.
#[must_use]
pub fn sin_rad(angle: Fixed) -> Fixed {
    let two_pi = pi() * Fixed::from_num(2);
    let turns: i64 = (angle / two_pi + Fixed::from_num(0.5)).floor().to_num();
    let r = angle - two_pi * Fixed::from_num(turns);

    let negative = r < Fixed::ZERO;
    let a = r.abs();

    let t = a * (pi() - a);
    let denom = Fixed::from_num(5) * pi() * pi() - Fixed::from_num(4) * t;
    let s = (Fixed::from_num(16) * t) / denom;

    if negative {
        -s
    } else {
        s
    }
}

/// Cosine of an angle in radians.
#[must_use]
pub fn cos_rad(angle: Fixed) -> Fixed {
    sin_rad(angle + pi() / Fixed::from_num(2))
}

/// Convert a heading to radians in (−π, π].
#[must_use]
pub fn heading_to_rad(heading: Heading) -> Fixed {
    Fixed::from_num(heading) * pi() / Fixed::from_num(HALF_CIRCLE)
}

/// Unit vector in the ground plane pointing along `heading`.
#[must_use]
pub fn vector_from_heading(heading: Heading) -> Vec3Fixed {
    let rad = heading_to_rad(heading);
    let v = Vec3Fixed::new(sin_rad(rad), Fixed::ZERO, cos_rad(rad));

    // renormalize so alignment dot-products stay trustworthy near 1.0
    let len = fixed_sqrt(v.sq_length2d());
    if len == Fixed::ZERO {
        Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, Fixed::ONE)
    } else {
        Vec3Fixed::new(v.x / len, Fixed::ZERO, v.z / len)
    }
}

/// Heading of the ground-plane vector (x, z); (0, 0) maps to heading 0.
#[must_use]
pub fn heading_from_vector(x: Fixed, z: Fixed) -> Heading {
    if x == Fixed::ZERO && z == Fixed::ZERO {
        return 0;
    }

    let ax = x.abs();
    let az = z.abs();
    let quarter_pi = pi() / Fixed::from_num(4);
    let half_pi = pi() / Fixed::from_num(2);

    let (t, swapped) = if ax <= az { (ax / az, false) } else { (az / ax, true) };
    let atan = t * (quarter_pi + Fixed::from_num(0.273) * (Fixed::ONE - t));

    let mut angle = if swapped { half_pi - atan } else { atan };
    if z < Fixed::ZERO {
        angle = pi() - angle;
    }
    if x < Fixed::ZERO {
        angle = -angle;
    }

    let units: i64 = (angle * Fixed::from_num(HALF_CIRCLE) / pi())
        .round()
        .to_num();
    units as i16
}

/// Orthonormal (front, right) pair for `heading` on a surface with `updir`.
///
/// Right-handed: `right = front₀ × up`, `front = up × right`.
#[must_use]
pub fn basis_from_heading(heading: Heading, updir: Vec3Fixed) -> (Vec3Fixed, Vec3Fixed) {
    let front0 = vector_from_heading(heading);
    let right = front0.cross(updir).normalize();
    if right == Vec3Fixed::ZERO {
        return (front0, front0.cross(Vec3Fixed::UP));
    }
    let front = updir.cross(right).normalize();
    (front, right)
}
