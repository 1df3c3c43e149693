use serde::{Serialize, Deserialize};
use std::hash::{Hash, Hasher};

// Basic 3D vector type. Doubles as the agent position and the occupancy key.
// Equality is exact per component, there is no tolerance.
#[derive(Copy, Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Agent location. Same representation as a displacement vector.
pub type Position = Vec3;

impl Vec3 {
    #[inline(always)]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline(always)]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline(always)]
    pub fn splat(v: f64) -> Self {
        Self::new(v, v, v)
    }

    #[inline(always)]
    pub fn from_array(a: [f64; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }

    #[inline(always)]
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    #[inline(always)]
    pub fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    #[inline(always)]
    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// True when every component lies in the closed box `[min, max]`.
    pub fn within(self, min: Self, max: Self) -> bool {
        (min.x..=max.x).contains(&self.x)
            && (min.y..=max.y).contains(&self.y)
            && (min.z..=max.z).contains(&self.z)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Bit-exact hash key. `-0.0` maps to `+0.0` so keys agree with `==`.
    #[inline(always)]
    pub fn key(self) -> PositionKey {
        PositionKey([canonical_bits(self.x), canonical_bits(self.y), canonical_bits(self.z)])
    }
}

#[inline(always)]
fn canonical_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

/// Hashable identity of a [`Position`]: the raw bit patterns of its components.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PositionKey([u64; 3]);

impl PositionKey {
    pub fn position(self) -> Position {
        Vec3::new(f64::from_bits(self.0[0]), f64::from_bits(self.0[1]), f64::from_bits(self.0[2]))
    }
}

// Same mixing as a boost-style hash_combine over the three components.
impl Hash for PositionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut seed: u64 = 0;
        for bits in self.0 {
            seed ^= bits
                .wrapping_add(0x9e37_79b9)
                .wrapping_add(seed << 6)
                .wrapping_add(seed >> 2);
        }
        state.write_u64(seed);
    }
}

#[inline(always)]
pub fn clamp(val: f64, min: f64, max: f64) -> f64 {
    val.max(min).min(max)
}

/// Wraps `val` into the half-open interval `[min, max)`.
#[inline(always)]
pub fn wrap(val: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if span <= 0.0 {
        return min;
    }
    let wrapped = (val - min).rem_euclid(span) + min;
    // rem_euclid can round up to exactly `span` for tiny negative offsets
    if wrapped >= max {
        min
    } else {
        wrapped
    }
}
