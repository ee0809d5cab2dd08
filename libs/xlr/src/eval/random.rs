use std::cmp::Ordering;
use std::f64::consts::TAU;

use fastrand::Rng;
use num_traits::{Float, ToPrimitive};

use crate::{ArrayData, Error, Result, RngDistribution};

/// Standard normal draw via the Box-Muller transform.
fn standard_normal(rng: &mut Rng) -> f64 {
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// Bounds are compared in their own type; NaN bounds compare as unordered
/// and are rejected.
fn check_range<T: PartialOrd + ToPrimitive>(lo: T, hi: T) -> Result<()> {
    if lo.partial_cmp(&hi) != Some(Ordering::Less) {
        return Err(Error::InvalidRngRange {
            lo: lo.to_f64().unwrap_or(f64::NAN),
            hi: hi.to_f64().unwrap_or(f64::NAN),
        });
    }
    Ok(())
}

fn check_float_range<T: Float>(lo: T, hi: T) -> Result<()> {
    if !lo.is_finite() || !hi.is_finite() {
        return Err(Error::InvalidRngRange {
            lo: lo.to_f64().unwrap_or(f64::NAN),
            hi: hi.to_f64().unwrap_or(f64::NAN),
        });
    }
    check_range(lo, hi)
}

/// Interpolates between the bounds without forming `hi - lo`. A draw that
/// rounds up to `hi` becomes the largest float below it.
macro_rules! uniform_float {
    ($name:ident, $t:ident) => {
        fn $name(rng: &mut Rng, lo: $t, hi: $t) -> $t {
            let r = rng.$t();
            let x = lo * (1.0 - r) + hi * r;
            if x < hi {
                return x.max(lo);
            }
            let below = if hi > 0.0 {
                <$t>::from_bits(hi.to_bits() - 1)
            } else if hi < 0.0 {
                <$t>::from_bits(hi.to_bits() + 1)
            } else {
                -<$t>::from_bits(1)
            };
            below.max(lo)
        }
    };
}

uniform_float!(uniform_f32, f32);
uniform_float!(uniform_f64, f64);

/// Draws `count` samples. Uniform draws cover `[a, b)`; normal draws use `a`
/// as the mean and `b` as the standard deviation.
pub(crate) fn sample(
    rng: &mut Rng,
    distribution: RngDistribution,
    a: &ArrayData,
    b: &ArrayData,
    count: usize,
) -> Result<ArrayData> {
    let data = match (distribution, a, b) {
        (RngDistribution::Normal, ArrayData::F32(mu), ArrayData::F32(sigma)) => {
            let (mu, sigma) = (mu[0], sigma[0]);
            ArrayData::F32(
                (0..count)
                    .map(|_| mu + sigma * standard_normal(rng) as f32)
                    .collect(),
            )
        }
        (RngDistribution::Normal, ArrayData::F64(mu), ArrayData::F64(sigma)) => {
            let (mu, sigma) = (mu[0], sigma[0]);
            ArrayData::F64((0..count).map(|_| mu + sigma * standard_normal(rng)).collect())
        }
        (RngDistribution::Uniform, ArrayData::F32(lo), ArrayData::F32(hi)) => {
            let (lo, hi) = (lo[0], hi[0]);
            check_float_range(lo, hi)?;
            ArrayData::F32((0..count).map(|_| uniform_f32(rng, lo, hi)).collect())
        }
        (RngDistribution::Uniform, ArrayData::F64(lo), ArrayData::F64(hi)) => {
            let (lo, hi) = (lo[0], hi[0]);
            check_float_range(lo, hi)?;
            ArrayData::F64((0..count).map(|_| uniform_f64(rng, lo, hi)).collect())
        }
        (RngDistribution::Uniform, ArrayData::S32(lo), ArrayData::S32(hi)) => {
            let (lo, hi) = (lo[0], hi[0]);
            check_range(lo, hi)?;
            ArrayData::S32((0..count).map(|_| rng.i32(lo..hi)).collect())
        }
        (RngDistribution::Uniform, ArrayData::S64(lo), ArrayData::S64(hi)) => {
            let (lo, hi) = (lo[0], hi[0]);
            check_range(lo, hi)?;
            ArrayData::S64((0..count).map(|_| rng.i64(lo..hi)).collect())
        }
        (RngDistribution::Uniform, ArrayData::U32(lo), ArrayData::U32(hi)) => {
            let (lo, hi) = (lo[0], hi[0]);
            check_range(lo, hi)?;
            ArrayData::U32((0..count).map(|_| rng.u32(lo..hi)).collect())
        }
        (RngDistribution::Uniform, ArrayData::U64(lo), ArrayData::U64(hi)) => {
            let (lo, hi) = (lo[0], hi[0]);
            check_range(lo, hi)?;
            ArrayData::U64((0..count).map(|_| rng.u64(lo..hi)).collect())
        }
        (_, a, _) => {
            return Err(Error::UnsupportedElementType {
                op: match distribution {
                    RngDistribution::Normal => "rng_normal",
                    RngDistribution::Uniform => "rng_uniform",
                },
                ty: a.element_type(),
            });
        }
    };
    Ok(data)
}
