//! The candidate invocation interface.
//!
//! A candidate is anything callable with a contract's parameters: the
//! baseline implementation or one of its mutants. The driver only ever sees
//! the [`Candidate`] trait and hands it an [`Arguments`] value holding the
//! live storage of every pointer parameter.

use std::fmt;

use calico_core::types::ScalarType;
use serde::{Deserialize, Serialize};

use crate::value::{decode_elements, encode_elements, Value};

/// Identity of a candidate within one contract's run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateId {
    Baseline,
    Mutant(String),
}

impl CandidateId {
    pub fn mutant(name: impl Into<String>) -> Self {
        CandidateId::Mutant(name.into())
    }

    pub fn is_baseline(&self) -> bool {
        matches!(self, CandidateId::Baseline)
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateId::Baseline => f.write_str("baseline"),
            CandidateId::Mutant(name) => write!(f, "mutant:{name}"),
        }
    }
}

/// One argument passed to a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// Storage a pointer parameter points at. Candidates may rewrite the
    /// bytes but not change the length.
    Region(Vec<u8>),
    Scalar(Value),
}

/// Ordered, named arguments for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    entries: Vec<(String, Argument)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, argument: Argument) {
        self.entries.push((name.into(), argument));
    }

    /// Builder form of [`push`](Self::push) for a region holding `values`.
    pub fn with_region(mut self, name: impl Into<String>, values: &[Value]) -> Self {
        self.push(name, Argument::Region(encode_elements(values)));
        self
    }

    /// Builder form of [`push`](Self::push) for a scalar.
    pub fn with_scalar(mut self, name: impl Into<String>, value: Value) -> Self {
        self.push(name, Argument::Scalar(value));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, arg)| arg)
    }

    pub fn at(&self, index: usize) -> Option<(&str, &Argument)> {
        self.entries
            .get(index)
            .map(|(name, arg)| (name.as_str(), arg))
    }

    pub fn region(&self, name: &str) -> Option<&[u8]> {
        match self.get(name)? {
            Argument::Region(bytes) => Some(bytes),
            Argument::Scalar(_) => None,
        }
    }

    pub fn region_mut(&mut self, name: &str) -> Option<&mut [u8]> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n.as_str() == name)
            .and_then(|(_, arg)| match arg {
                Argument::Region(bytes) => Some(bytes.as_mut_slice()),
                Argument::Scalar(_) => None,
            })
    }

    /// Replaces the scalar named `name`, keeping its type. Returns whether a
    /// scalar with that name existed.
    pub fn pin_scalar(&mut self, name: &str, value: Value) -> bool {
        let Some((_, Argument::Scalar(old))) =
            self.entries.iter_mut().find(|(n, _)| n.as_str() == name)
        else {
            return false;
        };
        *old = match old.scalar_type() {
            Some(ty) => value.cast(ty),
            None => value,
        };
        true
    }

    pub fn region_at_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        match self.entries.get_mut(index) {
            Some((_, Argument::Region(bytes))) => Some(bytes.as_mut_slice()),
            _ => None,
        }
    }

    /// Scalar argument at position `index`.
    pub fn scalar_at(&self, index: usize) -> Result<Value, InvokeError> {
        match self.at(index) {
            Some((_, Argument::Scalar(v))) => Ok(*v),
            Some((name, Argument::Region(_))) => Err(InvokeError::NotAScalar {
                name: name.to_string(),
            }),
            None => Err(InvokeError::MissingArgument { index }),
        }
    }

    /// Decodes the region at position `index` as elements of `ty`.
    pub fn read_elements(&self, index: usize, ty: ScalarType) -> Result<Vec<Value>, InvokeError> {
        match self.at(index) {
            Some((name, Argument::Region(bytes))) => {
                decode_elements(bytes, ty).map_err(|e| InvokeError::Trap {
                    message: format!("argument '{name}': {e}"),
                })
            }
            Some((name, Argument::Scalar(_))) => Err(InvokeError::NotARegion {
                name: name.to_string(),
            }),
            None => Err(InvokeError::MissingArgument { index }),
        }
    }

    /// Overwrites the start of the region at position `index` with `values`.
    pub fn write_elements(&mut self, index: usize, values: &[Value]) -> Result<(), InvokeError> {
        let bytes = encode_elements(values);
        match self.entries.get_mut(index) {
            Some((_, Argument::Region(region))) => {
                if bytes.len() > region.len() {
                    return Err(InvokeError::RegionTooSmall {
                        needed: bytes.len(),
                        available: region.len(),
                    });
                }
                region[..bytes.len()].copy_from_slice(&bytes);
                Ok(())
            }
            Some((name, Argument::Scalar(_))) => Err(InvokeError::NotARegion { name: name.clone() }),
            None => Err(InvokeError::MissingArgument { index }),
        }
    }
}

/// A candidate could not run to completion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("missing argument at position {index}")]
    MissingArgument { index: usize },

    #[error("argument '{name}' is not a pointer region")]
    NotARegion { name: String },

    #[error("argument '{name}' is not a scalar")]
    NotAScalar { name: String },

    #[error("region too small: need {needed} bytes, have {available}")]
    RegionTooSmall { needed: usize, available: usize },

    /// The candidate hit a condition that would be undefined behaviour in C.
    #[error("trap: {message}")]
    Trap { message: String },
}

/// A callable implementation under test.
pub trait Candidate: Send + Sync {
    fn id(&self) -> &CandidateId;

    /// Runs the candidate, mutating pointer regions in place.
    fn invoke(&self, args: &mut Arguments) -> Result<Value, InvokeError>;
}

/// A [`Candidate`] backed by a closure.
pub struct FnCandidate<F> {
    id: CandidateId,
    f: F,
}

impl<F> FnCandidate<F>
where
    F: Fn(&mut Arguments) -> Result<Value, InvokeError> + Send + Sync,
{
    pub fn new(id: CandidateId, f: F) -> Self {
        FnCandidate { id, f }
    }
}

impl<F> Candidate for FnCandidate<F>
where
    F: Fn(&mut Arguments) -> Result<Value, InvokeError> + Send + Sync,
{
    fn id(&self) -> &CandidateId {
        &self.id
    }

    fn invoke(&self, args: &mut Arguments) -> Result<Value, InvokeError> {
        (self.f)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_id_display() {
        assert_eq!(CandidateId::Baseline.to_string(), "baseline");
        assert_eq!(CandidateId::mutant("negate-factor").to_string(), "mutant:negate-factor");
        assert!(CandidateId::Baseline.is_baseline());
    }

    #[test]
    fn argument_accessors() {
        let mut args = Arguments::new()
            .with_region("a", &[Value::I32(1), Value::I32(2)])
            .with_scalar("factor", Value::I32(3));

        assert_eq!(args.len(), 2);
        assert_eq!(args.names().collect::<Vec<_>>(), vec!["a", "factor"]);
        assert_eq!(args.region("a").map(|r| r.len()), Some(8));
        assert!(args.region("factor").is_none());
        assert_eq!(args.scalar_at(1), Ok(Value::I32(3)));
        assert_eq!(
            args.scalar_at(0),
            Err(InvokeError::NotAScalar { name: "a".into() })
        );
        assert_eq!(args.scalar_at(5), Err(InvokeError::MissingArgument { index: 5 }));

        args.write_elements(0, &[Value::I32(9)]).unwrap();
        assert_eq!(
            args.read_elements(0, ScalarType::I32).unwrap(),
            vec![Value::I32(9), Value::I32(2)]
        );
    }

    #[test]
    fn pin_scalar_keeps_declared_type() {
        let mut args = Arguments::new()
            .with_region("a", &[Value::I32(1)])
            .with_scalar("length", Value::I32(3));
        assert!(args.pin_scalar("length", Value::I64(8)));
        assert_eq!(args.scalar_at(1), Ok(Value::I32(8)));
        assert!(!args.pin_scalar("a", Value::I32(0)));
        assert!(!args.pin_scalar("missing", Value::I32(0)));
    }

    #[test]
    fn write_elements_never_grows_region() {
        let mut args = Arguments::new().with_region("a", &[Value::I32(1)]);
        let err = args
            .write_elements(0, &[Value::I32(1), Value::I32(2)])
            .unwrap_err();
        assert_eq!(err, InvokeError::RegionTooSmall { needed: 8, available: 4 });
        assert_eq!(args.region("a").unwrap().len(), 4);
    }

    #[test]
    fn fn_candidate_invokes_closure() {
        let candidate = FnCandidate::new(CandidateId::Baseline, |args: &mut Arguments| {
            let v = args.read_elements(0, ScalarType::I32)?;
            args.write_elements(0, &[v[0].mul(Value::I32(2))])?;
            Ok(Value::Unit)
        });
        let mut args = Arguments::new().with_region("in", &[Value::I32(5)]);
        assert_eq!(candidate.invoke(&mut args), Ok(Value::Unit));
        assert_eq!(
            args.read_elements(0, ScalarType::I32).unwrap(),
            vec![Value::I32(10)]
        );
        assert_eq!(candidate.id(), &CandidateId::Baseline);
    }
}
