//! Fixed-point math for the deterministic simulation.
//!
//! All simulation state uses fixed-point arithmetic so that every host in a
//! lockstep session computes byte-identical results. Floating-point literals
//! appear only as conversion inputs to [`Fixed::from_num`], which is exact
//! and platform-independent.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// 32 integer bits, 32 fractional bits. Large enough for squared distances
/// across the map and for mass-weighted collision responses.
pub type Fixed = I32F32;

/// Serde support for fixed-point numbers.
///
/// Values are serialized as their raw bit representation (i64) so that
/// precision survives a round trip exactly.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Fixed-point 3D vector in world space (x east, y up, z south).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec3Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate (height).
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
    /// Z coordinate.
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
}

impl Vec3Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    /// World up axis.
    pub const UP: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ONE,
        z: Fixed::ZERO,
    };

    /// Construct from integer components.
    #[must_use]
    pub fn from_ints(x: i32, y: i32, z: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y), Fixed::from_num(z))
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Dot product over the ground plane only.
    #[must_use]
    pub fn dot2d(self, other: Self) -> Fixed {
        self.x * other.x + self.z * other.z
    }

    /// Cross product.
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    /// Squared length.
    #[must_use]
    pub fn sq_length(self) -> Fixed {
        self.dot(self)
    }

    /// Squared length over the ground plane.
    #[must_use]
    pub fn sq_length2d(self) -> Fixed {
        self.x * self.x + self.z * self.z
    }

    /// Length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.sq_length())
    }

    /// Length over the ground plane.
    #[must_use]
    pub fn length2d(self) -> Fixed {
        fixed_sqrt(self.sq_length2d())
    }

    /// Squared distance to another point.
    #[must_use]
    pub fn distance_sq(self, other: Self) -> Fixed {
        (self - other).sq_length()
    }

    /// Squared ground-plane distance to another point.
    #[must_use]
    pub fn distance_sq2d(self, other: Self) -> Fixed {
        (self - other).sq_length2d()
    }

    /// Distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_sq(other))
    }

    /// Ground-plane distance to another point.
    #[must_use]
    pub fn distance2d(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_sq2d(other))
    }

    /// Normalize; returns the zero vector when the input has zero length.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len, self.z / len)
    }

    /// Normalize over the ground plane, zeroing the y component.
    #[must_use]
    pub fn normalize2d(self) -> Self {
        let flat = Self::new(self.x, Fixed::ZERO, self.z);
        flat.normalize()
    }

    /// Copy with the y component set to zero.
    #[must_use]
    pub fn flat(self) -> Self {
        Self::new(self.x, Fixed::ZERO, self.z)
    }

    /// Copy with a replaced y component.
    #[must_use]
    pub fn with_y(self, y: Fixed) -> Self {
        Self::new(self.x, y, self.z)
    }

    /// Component-wise approximate equality against per-axis epsilons.
    #[must_use]
    pub fn equals_eps(self, other: Self, eps: Self) -> bool {
        (self.x - other.x).abs() <= eps.x
            && (self.y - other.y).abs() <= eps.y
            && (self.z - other.z).abs() <= eps.z
    }

    /// All components are finite by construction; checks the sanity bound
    /// used by the integration asserts instead.
    #[must_use]
    pub fn is_sane_speed(self, max_unit_speed: Fixed) -> bool {
        self.sq_length() < max_unit_speed * max_unit_speed * Fixed::from_num(100)
    }
}

impl std::ops::Add for Vec3Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Neg for Vec3Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl std::ops::Mul<Fixed> for Vec3Fixed {
    type Output = Self;

    fn mul(self, rhs: Fixed) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::ops::Div<Fixed> for Vec3Fixed {
    type Output = Self;

    fn div(self, rhs: Fixed) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl std::ops::AddAssign for Vec3Fixed {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::SubAssign for Vec3Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl std::ops::MulAssign<Fixed> for Vec3Fixed {
    fn mul_assign(&mut self, rhs: Fixed) {
        *self = *self * rhs;
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..32 {
        let mid = (low + high) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_sqrt_exact_squares() {
        assert_eq!(fixed_sqrt(fixed(0)), fixed(0));
        let r = fixed_sqrt(fixed(25));
        assert!((r - fixed(5)).abs() < Fixed::from_num(0.0001));
        let r = fixed_sqrt(fixed(2));
        assert!((r * r - fixed(2)).abs() < Fixed::from_num(0.0001));
    }

    #[test]
    fn test_vec3_cross_right_handed() {
        let x = Vec3Fixed::from_ints(1, 0, 0);
        let y = Vec3Fixed::from_ints(0, 1, 0);
        let z = Vec3Fixed::from_ints(0, 0, 1);
        assert_eq!(x.cross(y), z);
        assert_eq!(y.cross(z), x);
        assert_eq!(z.cross(x), y);
    }

    #[test]
    fn test_vec3_normalize_zero_is_zero() {
        assert_eq!(Vec3Fixed::ZERO.normalize(), Vec3Fixed::ZERO);
    }

    #[test]
    fn test_vec3_normalize_unit_length() {
        let v = Vec3Fixed::from_ints(3, 0, 4).normalize();
        let len_sq = v.sq_length();
        assert!((len_sq - Fixed::ONE).abs() < Fixed::from_num(0.0001));
    }

    #[test]
    fn test_vec3_distance2d_ignores_height() {
        let a = Vec3Fixed::from_ints(0, 100, 0);
        let b = Vec3Fixed::from_ints(3, -50, 4);
        assert!((a.distance2d(b) - fixed(5)).abs() < Fixed::from_num(0.0001));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::ONE / fixed(3);
        let b = Fixed::ONE / fixed(3);
        assert_eq!(a * fixed(7), b * fixed(7));
    }
}
