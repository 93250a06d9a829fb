//! State snapshots: owned byte copies of parameter storage.
//!
//! [`capture`] copies exactly `element_count * size_of(element)` bytes out of
//! a caller-supplied region and [`restore`] writes a snapshot back. Neither
//! ever touches bytes beyond that length; the driver is responsible for
//! handing in the right region.

use std::fmt;

use calico_core::contract::RecoverySpec;
use calico_core::error::ResolveError;
use calico_core::types::SizeResolver;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// When a snapshot was taken relative to the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tick {
    Before,
    After,
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tick::Before => f.write_str("before"),
            Tick::After => f.write_str("after"),
        }
    }
}

/// Bytes of one parameter's storage at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    parameter: String,
    tick: Tick,
    element_size: usize,
    bytes: Vec<u8>,
}

impl Snapshot {
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Snapshots of every recovered parameter at one tick, keyed by parameter
/// name in recovery-spec order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotSet {
    snapshots: IndexMap<String, Snapshot>,
}

impl SnapshotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: Snapshot) {
        self.snapshots.insert(snapshot.parameter.clone(), snapshot);
    }

    pub fn get(&self, parameter: &str) -> Option<&Snapshot> {
        self.snapshots.get(parameter)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.values()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Errors from capturing or restoring a region.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("cannot resolve element size of '{parameter}': {source}")]
    UnresolvedSize {
        parameter: String,
        #[source]
        source: ResolveError,
    },

    #[error("region of '{parameter}' is out of bounds: need {requested} bytes, have {available}")]
    OutOfBounds {
        parameter: String,
        requested: usize,
        available: usize,
    },

    #[error("snapshot of '{parameter}' has {actual} bytes, region expects {expected}")]
    SizeMismatch {
        parameter: String,
        expected: usize,
        actual: usize,
    },
}

/// Element size and total byte length described by `spec`.
pub fn region_layout(
    spec: &RecoverySpec,
    resolver: &dyn SizeResolver,
) -> Result<(usize, usize), SnapshotError> {
    let element_size = resolver
        .resolve_size(&spec.element_size_expr)
        .map_err(|source| SnapshotError::UnresolvedSize {
            parameter: spec.parameter_name.clone(),
            source,
        })?;
    let total = element_size
        .checked_mul(spec.element_count)
        .ok_or_else(|| SnapshotError::OutOfBounds {
            parameter: spec.parameter_name.clone(),
            requested: usize::MAX,
            available: 0,
        })?;
    Ok((element_size, total))
}

/// Copies the region described by `spec` out of `region`.
pub fn capture(
    spec: &RecoverySpec,
    region: &[u8],
    tick: Tick,
    resolver: &dyn SizeResolver,
) -> Result<Snapshot, SnapshotError> {
    let (element_size, len) = region_layout(spec, resolver)?;
    if len > region.len() {
        return Err(SnapshotError::OutOfBounds {
            parameter: spec.parameter_name.clone(),
            requested: len,
            available: region.len(),
        });
    }
    Ok(Snapshot {
        parameter: spec.parameter_name.clone(),
        tick,
        element_size,
        bytes: region[..len].to_vec(),
    })
}

/// Writes `snapshot` back into `region` byte for byte.
pub fn restore(
    snapshot: &Snapshot,
    spec: &RecoverySpec,
    region: &mut [u8],
    resolver: &dyn SizeResolver,
) -> Result<(), SnapshotError> {
    let (_, expected) = region_layout(spec, resolver)?;
    if snapshot.bytes.len() != expected {
        return Err(SnapshotError::SizeMismatch {
            parameter: spec.parameter_name.clone(),
            expected,
            actual: snapshot.bytes.len(),
        });
    }
    if expected > region.len() {
        return Err(SnapshotError::OutOfBounds {
            parameter: spec.parameter_name.clone(),
            requested: expected,
            available: region.len(),
        });
    }
    region[..expected].copy_from_slice(&snapshot.bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calico_core::types::PrimitiveSizes;
    use proptest::prelude::*;

    fn spec(expr: &str, count: usize) -> RecoverySpec {
        RecoverySpec {
            parameter_name: "a".into(),
            element_size_expr: expr.into(),
            element_count: count,
        }
    }

    #[test]
    fn capture_copies_exact_length() {
        let region: Vec<u8> = (0..12).collect();
        let snap = capture(&spec("sizeof(int)", 2), &region, Tick::Before, &PrimitiveSizes::new())
            .unwrap();
        assert_eq!(snap.bytes(), &region[..8]);
        assert_eq!(snap.element_size(), 4);
        assert_eq!(snap.tick(), Tick::Before);
        assert_eq!(snap.parameter(), "a");
    }

    #[test]
    fn capture_rejects_short_region() {
        let region = [0u8; 4];
        let err = capture(&spec("sizeof(int)", 2), &region, Tick::Before, &PrimitiveSizes::new())
            .unwrap_err();
        assert_eq!(
            err,
            SnapshotError::OutOfBounds {
                parameter: "a".into(),
                requested: 8,
                available: 4
            }
        );
    }

    #[test]
    fn capture_rejects_unresolved_size() {
        let err = capture(&spec("sizeof(struct s)", 1), &[0u8; 64], Tick::Before, &PrimitiveSizes::new())
            .unwrap_err();
        assert!(matches!(err, SnapshotError::UnresolvedSize { .. }));
    }

    #[test]
    fn capture_rejects_overflowing_layout() {
        let err = capture(&spec("sizeof(long)", usize::MAX), &[0u8; 8], Tick::Before, &PrimitiveSizes::new())
            .unwrap_err();
        assert!(matches!(err, SnapshotError::OutOfBounds { .. }));
    }

    #[test]
    fn restore_rejects_size_mismatch() {
        let sizes = PrimitiveSizes::new();
        let region = [1u8; 8];
        let snap = capture(&spec("sizeof(int)", 1), &region, Tick::Before, &sizes).unwrap();
        let mut live = [0u8; 8];
        let err = restore(&snap, &spec("sizeof(int)", 2), &mut live, &sizes).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::SizeMismatch {
                parameter: "a".into(),
                expected: 8,
                actual: 4
            }
        );
        assert_eq!(live, [0u8; 8]);
    }

    #[test]
    fn restore_rejects_short_live_region() {
        let sizes = PrimitiveSizes::new();
        let snap = capture(&spec("sizeof(int)", 2), &[7u8; 8], Tick::Before, &sizes).unwrap();
        let mut live = [0u8; 4];
        let err = restore(&snap, &spec("sizeof(int)", 2), &mut live, &sizes).unwrap_err();
        assert!(matches!(err, SnapshotError::OutOfBounds { requested: 8, available: 4, .. }));
    }

    #[test]
    fn restore_undoes_mutation_and_leaves_tail() {
        let sizes = PrimitiveSizes::new();
        let mut live: Vec<u8> = vec![1, 2, 3, 4, 9, 9];
        let snap = capture(&spec("sizeof(int)", 1), &live, Tick::Before, &sizes).unwrap();
        live.iter_mut().for_each(|b| *b = 0);
        restore(&snap, &spec("sizeof(int)", 1), &mut live, &sizes).unwrap();
        assert_eq!(live, vec![1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn snapshot_set_keeps_spec_order() {
        let sizes = PrimitiveSizes::new();
        let mut set = SnapshotSet::new();
        let mut b = spec("sizeof(char)", 1);
        b.parameter_name = "b".into();
        set.insert(capture(&b, &[1], Tick::After, &sizes).unwrap());
        set.insert(capture(&spec("sizeof(char)", 1), &[2], Tick::After, &sizes).unwrap());
        let names: Vec<&str> = set.iter().map(Snapshot::parameter).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(set.get("a").unwrap().bytes(), &[2]);
        assert_eq!(set.len(), 2);
    }

    proptest! {
        #[test]
        fn capture_then_restore_is_identity(
            bytes in proptest::collection::vec(any::<u8>(), 4..64),
            count in 1usize..16,
        ) {
            let sizes = PrimitiveSizes::new();
            let spec = spec("sizeof(int)", count);
            let original = bytes.clone();
            let mut live = bytes;
            match capture(&spec, &live, Tick::Before, &sizes) {
                Ok(snap) => {
                    restore(&snap, &spec, &mut live, &sizes).unwrap();
                    prop_assert_eq!(live, original);
                }
                Err(SnapshotError::OutOfBounds { requested, available, .. }) => {
                    prop_assert!(requested > available);
                    prop_assert_eq!(live, original);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }
    }
}
