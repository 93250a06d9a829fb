//! Seeded input generation.
//!
//! Inputs for a contract are the configured seeds followed by randomly
//! generated argument lists. Generation uses a deterministic `ChaCha8Rng`, so
//! the same `random_seed` always produces the same inputs.
//!
//! Pointer parameters get a region sized by their recovery spec (one element
//! when there is none). Scalar parameters get a random value unless pinned in
//! [`DriverConfig::fixed_scalars`].

use calico_core::contract::{Contract, Parameter};
use calico_core::types::{CType, ScalarType, SizeResolver};
use indexmap::IndexMap;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::candidate::{Argument, Arguments};
use crate::driver::DriverConfig;
use crate::snapshot::{region_layout, SnapshotError};
use crate::value::{encode_elements, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("cannot generate values for parameter '{parameter}' of type '{declared_type}'")]
    UnsupportedType {
        parameter: String,
        declared_type: String,
    },

    #[error(transparent)]
    Layout(#[from] SnapshotError),

    #[error("fixture for '{parameter}' is not a number")]
    InvalidFixture { parameter: String },

    #[error("fixture names unknown parameter '{parameter}'")]
    UnknownFixture { parameter: String },
}

/// Generates a random value of the given type using the provided RNG.
///
/// Boundary values (0, 1, -1, MIN, MAX) are weighted into the mix to
/// increase edge-case coverage.
pub fn generate_random_value(ty: ScalarType, rng: &mut ChaCha8Rng) -> Value {
    // ~30% chance of a boundary value
    let boundary = rng.gen_ratio(3, 10);
    macro_rules! int {
        ($variant:ident, $t:ty, $bounds:expr) => {{
            if boundary {
                let bounds: &[$t] = $bounds;
                Value::$variant(bounds[rng.gen_range(0..bounds.len())])
            } else {
                Value::$variant(rng.gen())
            }
        }};
    }
    match ty {
        ScalarType::I8 => int!(I8, i8, &[0, 1, -1, i8::MIN, i8::MAX]),
        ScalarType::U8 => int!(U8, u8, &[0, 1, u8::MAX]),
        ScalarType::I16 => int!(I16, i16, &[0, 1, -1, i16::MIN, i16::MAX]),
        ScalarType::U16 => int!(U16, u16, &[0, 1, u16::MAX]),
        ScalarType::I32 => int!(I32, i32, &[0, 1, -1, i32::MIN, i32::MAX]),
        ScalarType::U32 => int!(U32, u32, &[0, 1, u32::MAX]),
        ScalarType::I64 => int!(I64, i64, &[0, 1, -1, i64::MIN, i64::MAX]),
        ScalarType::U64 => int!(U64, u64, &[0, 1, u64::MAX]),
        ScalarType::F32 => {
            if boundary {
                let bounds: &[f32] = &[0.0, -0.0, 1.0, -1.0];
                Value::F32(bounds[rng.gen_range(0..bounds.len())])
            } else {
                Value::F32(rng.gen_range(-1e6f32..1e6f32))
            }
        }
        ScalarType::F64 => {
            if boundary {
                let bounds: &[f64] = &[0.0, -0.0, 1.0, -1.0];
                Value::F64(bounds[rng.gen_range(0..bounds.len())])
            } else {
                Value::F64(rng.gen_range(-1e12f64..1e12f64))
            }
        }
    }
}

/// Generates one argument list for `contract`.
pub fn generate_arguments(
    contract: &Contract,
    resolver: &dyn SizeResolver,
    fixed: &IndexMap<String, Value>,
    rng: &mut ChaCha8Rng,
) -> Result<Arguments, InputError> {
    let mut args = Arguments::new();
    for param in &contract.parameters {
        let ty = param.c_type().ok_or_else(|| unsupported(param))?;
        let argument = match ty {
            CType::Pointer(_) => Argument::Region(generate_region(contract, param, &ty, resolver, rng)?),
            CType::Scalar(scalar) => Argument::Scalar(match fixed.get(&param.name) {
                Some(v) => v.cast(scalar),
                None => generate_random_value(scalar, rng),
            }),
            CType::Void => return Err(unsupported(param)),
        };
        args.push(param.name.clone(), argument);
    }
    Ok(args)
}

fn generate_region(
    contract: &Contract,
    param: &Parameter,
    ty: &CType,
    resolver: &dyn SizeResolver,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<u8>, InputError> {
    let (element_size, len) = match contract.recovery_spec(&param.name) {
        Some(spec) => region_layout(spec, resolver)?,
        None => {
            let size = ty
                .element_type()
                .map(ScalarType::size)
                .ok_or_else(|| unsupported(param))?;
            (size, size)
        }
    };

    // Typed regions get per-element boundary weighting; untyped ones are raw bytes.
    match ty.element_type() {
        Some(elem) if elem.size() == element_size => {
            let values: Vec<Value> = (0..len / element_size)
                .map(|_| generate_random_value(elem, rng))
                .collect();
            Ok(encode_elements(&values))
        }
        _ => Ok((0..len).map(|_| rng.gen()).collect()),
    }
}

fn unsupported(param: &Parameter) -> InputError {
    InputError::UnsupportedType {
        parameter: param.name.clone(),
        declared_type: param.declared_type.clone(),
    }
}

/// Seeds first, then `config.iterations` generated inputs. Fixed scalars
/// apply to seeds as well.
pub fn build_inputs(
    contract: &Contract,
    resolver: &dyn SizeResolver,
    config: &DriverConfig,
) -> Result<Vec<Arguments>, InputError> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.random_seed);
    let mut inputs = config.seeds.clone();
    for seed in &mut inputs {
        for (name, value) in &config.fixed_scalars {
            seed.pin_scalar(name, *value);
        }
    }
    for _ in 0..config.iterations {
        inputs.push(generate_arguments(
            contract,
            resolver,
            &config.fixed_scalars,
            &mut rng,
        )?);
    }
    Ok(inputs)
}

/// Reads `{ "<param>": <number>, ... }` into typed fixed scalars.
pub fn fixed_scalars_from_json(
    contract: &Contract,
    fixtures: &serde_json::Map<String, serde_json::Value>,
) -> Result<IndexMap<String, Value>, InputError> {
    let mut fixed = IndexMap::new();
    for (name, json) in fixtures {
        let param = contract
            .parameter(name)
            .ok_or_else(|| InputError::UnknownFixture {
                parameter: name.clone(),
            })?;
        let scalar = match param.c_type() {
            Some(CType::Scalar(s)) => s,
            _ => return Err(unsupported(param)),
        };
        let value = Value::from_json(scalar, json).ok_or_else(|| InputError::InvalidFixture {
            parameter: name.clone(),
        })?;
        fixed.insert(name.clone(), value);
    }
    Ok(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calico_core::parser::parse_block;
    use calico_core::types::PrimitiveSizes;

    const ARRAY: &str = "/**\n\
        * @fun-info { multiply_int_array, \"void\" } ;\n\
        * @param-info { a, \"int*\" } ;\n\
        * @param-info { factor, \"int\" } ;\n\
        * @param-info { length, \"int\" } ;\n\
        * @state-recover { a, \"sizeof(int)\", 4 } ;\n\
        */";

    #[test]
    fn generate_random_value_produces_correct_types() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for ty in [
            ScalarType::I8,
            ScalarType::U16,
            ScalarType::I32,
            ScalarType::U64,
            ScalarType::F32,
            ScalarType::F64,
        ] {
            assert_eq!(generate_random_value(ty, &mut rng).scalar_type(), Some(ty));
        }
    }

    #[test]
    fn regions_follow_recovery_spec() {
        let contract = parse_block(ARRAY, 1).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut fixed = IndexMap::new();
        fixed.insert("length".to_string(), Value::I64(4));
        let args = generate_arguments(&contract, &PrimitiveSizes::new(), &fixed, &mut rng).unwrap();

        assert_eq!(args.names().collect::<Vec<_>>(), vec!["a", "factor", "length"]);
        assert_eq!(args.region("a").unwrap().len(), 16);
        assert!(matches!(args.scalar_at(1), Ok(Value::I32(_))));
        assert_eq!(args.scalar_at(2), Ok(Value::I32(4)));
    }

    #[test]
    fn same_seed_same_inputs() {
        let contract = parse_block(ARRAY, 1).unwrap();
        let config = DriverConfig {
            iterations: 20,
            random_seed: 99999,
            ..DriverConfig::default()
        };
        let a = build_inputs(&contract, &PrimitiveSizes::new(), &config).unwrap();
        let b = build_inputs(&contract, &PrimitiveSizes::new(), &config).unwrap();
        assert_eq!(a.len(), 20);
        assert_eq!(a, b);

        let other = DriverConfig {
            random_seed: 1,
            ..config
        };
        let c = build_inputs(&contract, &PrimitiveSizes::new(), &other).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn seeds_run_first() {
        let contract = parse_block(ARRAY, 1).unwrap();
        let seed = Arguments::new()
            .with_region("a", &[Value::I32(1); 4])
            .with_scalar("factor", Value::I32(2))
            .with_scalar("length", Value::I32(4));
        let config = DriverConfig {
            seeds: vec![seed.clone()],
            iterations: 3,
            ..DriverConfig::default()
        };
        let inputs = build_inputs(&contract, &PrimitiveSizes::new(), &config).unwrap();
        assert_eq!(inputs.len(), 4);
        assert_eq!(inputs[0], seed);
    }

    #[test]
    fn void_pointer_regions_are_raw_bytes() {
        let text = "/**\n* @fun-info { id, \"void\" } ;\n* @param-info { a, \"void*\" } ;\n\
                    * @state-recover { a, \"sizeof(long)\", 2 } ;\n*/";
        let contract = parse_block(text, 1).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let args =
            generate_arguments(&contract, &PrimitiveSizes::new(), &IndexMap::new(), &mut rng).unwrap();
        assert_eq!(args.region("a").unwrap().len(), 16);
    }

    #[test]
    fn fixtures_are_typed_by_parameter() {
        let contract = parse_block(ARRAY, 1).unwrap();
        let json = serde_json::json!({ "length": 4, "factor": -3 });
        let fixed = fixed_scalars_from_json(&contract, json.as_object().unwrap()).unwrap();
        assert_eq!(fixed.get("factor"), Some(&Value::I32(-3)));

        let bad = serde_json::json!({ "width": 1 });
        assert_eq!(
            fixed_scalars_from_json(&contract, bad.as_object().unwrap()).unwrap_err(),
            InputError::UnknownFixture {
                parameter: "width".into()
            }
        );
        let region = serde_json::json!({ "a": 1 });
        assert!(matches!(
            fixed_scalars_from_json(&contract, region.as_object().unwrap()).unwrap_err(),
            InputError::UnsupportedType { .. }
        ));
    }
}
