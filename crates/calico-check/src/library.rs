//! Built-in subjects: the calico arithmetic helpers and their mutants.
//!
//! Each subject is a native implementation of one helper function working on
//! [`Arguments`] by position, the way the C function would see its
//! parameters. Mutants apply one [`MutationOperator`] to the same kernel.

use std::fmt;
use std::sync::Arc;

use calico_core::contract::Contract;
use calico_core::types::{ScalarType, SizeResolver};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::batch::{Subject, SubjectProvider};
use crate::candidate::{Argument, Arguments, Candidate, CandidateId, InvokeError};
use crate::snapshot::region_layout;
use crate::value::{encode_elements, Value};

/// A single source-level change applied to a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationOperator {
    /// `x *= factor` becomes `x *= -factor`.
    NegateFactor,
    /// `x *= factor` becomes `x *= 1`.
    UnitFactor,
    /// `x *= factor` becomes `x += factor`.
    AddFactor,
    /// `i < length` becomes `i < length - 1`.
    ShortenLoop,
    /// Empty body.
    NoOp,
    /// Every element is set to zero.
    ZeroFill,
}

impl MutationOperator {
    pub fn name(&self) -> &'static str {
        match self {
            MutationOperator::NegateFactor => "negate-factor",
            MutationOperator::UnitFactor => "unit-factor",
            MutationOperator::AddFactor => "add-factor",
            MutationOperator::ShortenLoop => "shorten-loop",
            MutationOperator::NoOp => "no-op",
            MutationOperator::ZeroFill => "zero-fill",
        }
    }
}

impl fmt::Display for MutationOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const SCALAR_OPS: &[MutationOperator] = &[
    MutationOperator::NegateFactor,
    MutationOperator::UnitFactor,
    MutationOperator::AddFactor,
    MutationOperator::NoOp,
    MutationOperator::ZeroFill,
];

const ARRAY_OPS: &[MutationOperator] = &[
    MutationOperator::NegateFactor,
    MutationOperator::UnitFactor,
    MutationOperator::AddFactor,
    MutationOperator::ShortenLoop,
    MutationOperator::NoOp,
    MutationOperator::ZeroFill,
];

const ID_OPS: &[MutationOperator] = &[MutationOperator::NoOp, MutationOperator::ZeroFill];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    DoubleIntPtr,
    MultiplyInt,
    MultiplyIntArray,
    MultiplyDouble,
    MultiplyDoubleArray,
    Id,
}

const KERNELS: &[Kernel] = &[
    Kernel::DoubleIntPtr,
    Kernel::MultiplyInt,
    Kernel::MultiplyIntArray,
    Kernel::MultiplyDouble,
    Kernel::MultiplyDoubleArray,
    Kernel::Id,
];

impl Kernel {
    fn lookup(name: &str) -> Option<Kernel> {
        KERNELS.iter().copied().find(|k| k.name() == name)
    }

    fn name(self) -> &'static str {
        match self {
            Kernel::DoubleIntPtr => "double_int_ptr",
            Kernel::MultiplyInt => "multiply_int",
            Kernel::MultiplyIntArray => "multiply_int_array",
            Kernel::MultiplyDouble => "multiply_double",
            Kernel::MultiplyDoubleArray => "multiply_double_array",
            Kernel::Id => "id",
        }
    }

    fn arity(self) -> usize {
        match self {
            Kernel::DoubleIntPtr | Kernel::Id => 1,
            Kernel::MultiplyInt | Kernel::MultiplyDouble => 2,
            Kernel::MultiplyIntArray | Kernel::MultiplyDoubleArray => 3,
        }
    }

    fn operators(self) -> &'static [MutationOperator] {
        match self {
            Kernel::DoubleIntPtr | Kernel::MultiplyInt | Kernel::MultiplyDouble => SCALAR_OPS,
            Kernel::MultiplyIntArray | Kernel::MultiplyDoubleArray => ARRAY_OPS,
            Kernel::Id => ID_OPS,
        }
    }

    fn element_type(self) -> Option<ScalarType> {
        match self {
            Kernel::DoubleIntPtr | Kernel::MultiplyInt | Kernel::MultiplyIntArray => {
                Some(ScalarType::I32)
            }
            Kernel::MultiplyDouble | Kernel::MultiplyDoubleArray => Some(ScalarType::F64),
            Kernel::Id => None,
        }
    }

    fn run(self, args: &mut Arguments, op: Option<MutationOperator>) -> Result<Value, InvokeError> {
        if op == Some(MutationOperator::NoOp) {
            return Ok(Value::Unit);
        }
        let Some(ty) = self.element_type() else {
            // id(void *a): only zero-fill changes anything.
            if op == Some(MutationOperator::ZeroFill) {
                if let Some(region) = args.region_at_mut(0) {
                    region.fill(0);
                }
            }
            return Ok(Value::Unit);
        };

        let (factor, count) = match self {
            Kernel::DoubleIntPtr => (Value::I32(2), 1),
            Kernel::MultiplyInt | Kernel::MultiplyDouble => (args.scalar_at(1)?, 1),
            _ => (args.scalar_at(1)?, loop_count(args.scalar_at(2)?)),
        };
        scale(args, ty, factor, count, op)
    }
}

/// Iterations of `for (i = 0; i < length; i++)` with an `int` counter.
fn loop_count(length: Value) -> usize {
    match length.as_f64() {
        Some(len) if len > 0.0 => len.ceil() as usize,
        _ => 0,
    }
}

fn scale(
    args: &mut Arguments,
    ty: ScalarType,
    factor: Value,
    count: usize,
    op: Option<MutationOperator>,
) -> Result<Value, InvokeError> {
    let mut values = args.read_elements(0, ty)?;
    if count > values.len() {
        return Err(InvokeError::Trap {
            message: format!(
                "loop writes {count} elements into a region of {}",
                values.len()
            ),
        });
    }
    let count = match op {
        Some(MutationOperator::ShortenLoop) => count.saturating_sub(1),
        _ => count,
    };
    for v in values.iter_mut().take(count) {
        *v = match op {
            Some(MutationOperator::NegateFactor) => v.mul(factor.negated()),
            Some(MutationOperator::UnitFactor) => v.mul(Value::I32(1)),
            Some(MutationOperator::AddFactor) => v.add(factor),
            Some(MutationOperator::ZeroFill) => Value::I32(0).cast(ty),
            _ => v.mul(factor),
        };
    }
    args.write_elements(0, &values)?;
    Ok(Value::Unit)
}

struct KernelCandidate {
    id: CandidateId,
    kernel: Kernel,
    op: Option<MutationOperator>,
}

impl Candidate for KernelCandidate {
    fn id(&self) -> &CandidateId {
        &self.id
    }

    fn invoke(&self, args: &mut Arguments) -> Result<Value, InvokeError> {
        self.kernel.run(args, self.op)
    }
}

/// Names of every built-in subject.
pub fn subject_names() -> impl Iterator<Item = &'static str> {
    KERNELS.iter().map(|k| k.name())
}

/// Mutation operators applied to the named subject.
pub fn operators(name: &str) -> Option<&'static [MutationOperator]> {
    Kernel::lookup(name).map(Kernel::operators)
}

/// Baseline and mutants for the named subject, with no inputs attached.
pub fn subject(name: &str) -> Option<Subject> {
    let kernel = Kernel::lookup(name)?;
    let baseline: Arc<dyn Candidate> = Arc::new(KernelCandidate {
        id: CandidateId::Baseline,
        kernel,
        op: None,
    });
    let mutants = kernel
        .operators()
        .iter()
        .map(|op| {
            Arc::new(KernelCandidate {
                id: CandidateId::mutant(op.name()),
                kernel,
                op: Some(*op),
            }) as Arc<dyn Candidate>
        })
        .collect();
    Some(Subject {
        baseline,
        mutants,
        seeds: Vec::new(),
        fixed_scalars: IndexMap::new(),
    })
}

/// Provides built-in subjects for contracts whose function name and
/// parameter count match a helper.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinSubjects;

impl SubjectProvider for BuiltinSubjects {
    fn subject_for(&self, contract: &Contract, resolver: &dyn SizeResolver) -> Option<Subject> {
        let kernel = Kernel::lookup(&contract.function_name)?;
        if contract.parameters.len() != kernel.arity() {
            warn!(
                function = %contract.function_name,
                expected = kernel.arity(),
                found = contract.parameters.len(),
                "contract does not match built-in subject"
            );
            return None;
        }
        let mut subject = subject(kernel.name())?;

        let spec = contract.recovery_spec(&contract.parameters[0].name);
        let count = spec.map_or(1, |spec| spec.element_count);
        if let Some(length) = contract.parameters.get(2) {
            subject
                .fixed_scalars
                .insert(length.name.clone(), Value::I64(count as i64));
        }

        let region_len = match spec {
            Some(spec) => match region_layout(spec, resolver) {
                Ok((_, len)) => len,
                Err(error) => {
                    warn!(function = %contract.function_name, %error, "no seed input");
                    return Some(subject);
                }
            },
            None => kernel.element_type().map_or(1, ScalarType::size),
        };
        subject
            .seeds
            .push(seed_input(kernel, contract, count, region_len));
        Some(subject)
    }
}

/// Alternating-sign elements `1, -2, 3, ...` with a factor of 3.
fn seed_input(kernel: Kernel, contract: &Contract, count: usize, region_len: usize) -> Arguments {
    let mut args = Arguments::new();
    for (index, param) in contract.parameters.iter().enumerate() {
        let argument = match (index, kernel.element_type()) {
            (0, Some(ty)) => {
                let values: Vec<Value> = (1..=(region_len / ty.size()) as i64)
                    .map(|i| Value::I64(if i % 2 == 0 { -i } else { i }).cast(ty))
                    .collect();
                let mut bytes = encode_elements(&values);
                bytes.resize(region_len, 0);
                Argument::Region(bytes)
            }
            (0, None) => {
                Argument::Region((0..region_len).map(|i| (i % 251) as u8 + 1).collect())
            }
            (1, Some(ty)) => Argument::Scalar(Value::I32(3).cast(ty)),
            (_, ty) => Argument::Scalar(Value::I64(count as i64).cast(
                param
                    .c_type()
                    .and_then(|t| t.element_type())
                    .or(ty)
                    .unwrap_or(ScalarType::I32),
            )),
        };
        args.push(param.name.clone(), argument);
    }
    args
}
