#![forbid(unsafe_code)]

pub mod strategies;

use ox_core::{Literal, Shape, TensorValue, ValueError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Name of the enclosing function, e.g. `cast_00` when expanded inside
/// `fn cast_00()`. Inside a closure the closure's parent function is not
/// recovered, so expand it at function level.
#[macro_export]
macro_rules! test_name {
    () => {{
        fn here() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(here);
        let name = name.strip_suffix("::here").unwrap_or(name);
        name.rsplit("::").next().unwrap_or(name)
    }};
}

#[must_use]
pub fn property_test_case_count() -> u32 {
    if let Ok(raw) = std::env::var("OX_PROPTEST_CASES")
        && let Ok(parsed) = raw.parse::<u32>()
        && parsed > 0
    {
        return parsed;
    }

    if std::env::var_os("CI").is_some() {
        1024
    } else {
        256
    }
}

/// Seed for a named test: `OX_TEST_SEED` when set, otherwise derived from the
/// test name so every run of one test draws the same inputs.
#[must_use]
pub fn test_seed(test_name: &str) -> u64 {
    if let Ok(raw) = std::env::var("OX_TEST_SEED")
        && let Ok(seed) = raw.parse::<u64>()
    {
        return seed;
    }

    let digest = Sha256::digest(test_name.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[must_use]
pub fn seeded_rng(test_name: &str) -> StdRng {
    StdRng::seed_from_u64(test_seed(test_name))
}

/// Standard-normal `f32` tensor of the given shape (Box-Muller).
pub fn randn_f32(rng: &mut impl Rng, dims: &[u32]) -> Result<TensorValue, ValueError> {
    let shape = Shape::from_dims(dims);
    let count = shape
        .element_count()
        .ok_or_else(|| ValueError::ShapeOverflow {
            shape: shape.clone(),
        })?;
    let elements = (0..count)
        .map(|_| {
            let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
            let u2: f64 = rng.gen_range(0.0..1.0);
            let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
            Literal::from_f32(z as f32)
        })
        .collect();
    TensorValue::new(ox_core::DType::F32, shape, elements)
}

/// Installs a `tracing` subscriber that writes through the test harness's
/// captured output. Safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::{property_test_case_count, randn_f32, seeded_rng, test_seed};
    use ox_core::DType;

    #[test]
    fn test_name_macro_reports_enclosing_function() {
        assert_eq!(
            crate::test_name!(),
            "test_name_macro_reports_enclosing_function"
        );
    }

    #[test]
    fn property_case_count_has_default_floor() {
        assert!(property_test_case_count() >= 1);
    }

    #[test]
    fn seeds_are_stable_per_name() {
        if std::env::var_os("OX_TEST_SEED").is_some() {
            return;
        }
        assert_eq!(test_seed("cast_00"), test_seed("cast_00"));
        assert_ne!(test_seed("cast_00"), test_seed("cast_01"));
    }

    #[test]
    fn randn_has_requested_shape_and_plausible_moments() {
        let mut rng = seeded_rng("randn_moments");
        let tensor = randn_f32(&mut rng, &[40, 50]).expect("tensor");
        assert_eq!(tensor.dtype, DType::F32);
        assert_eq!(tensor.len(), 2000);
        let values = tensor.to_f64_vec();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        assert!(mean.abs() < 0.15, "mean {mean}");
        assert!((var - 1.0).abs() < 0.2, "variance {var}");
    }
}
