//! State equality strategies.
//!
//! Strategies are looked up by the name given in `@equality-op`. Only
//! `memcmp` is built in; anything else must be registered first.

use std::fmt;
use std::sync::Arc;

use calico_core::contract::DEFAULT_EQUALITY_OP;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::snapshot::{Snapshot, SnapshotSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EqualityVerdict {
    Equal,
    Unequal,
    UnknownStrategy(String),
}

pub type StrategyFn = dyn Fn(&Snapshot, &Snapshot) -> bool + Send + Sync;

/// Name → comparison strategy table.
#[derive(Clone)]
pub struct EqualityRegistry {
    strategies: IndexMap<String, Arc<StrategyFn>>,
}

impl fmt::Debug for EqualityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EqualityRegistry")
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for EqualityRegistry {
    fn default() -> Self {
        let mut reg = EqualityRegistry {
            strategies: IndexMap::new(),
        };
        reg.register(DEFAULT_EQUALITY_OP, |a, b| a.bytes() == b.bytes());
        reg
    }
}

impl EqualityRegistry {
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Snapshot, &Snapshot) -> bool + Send + Sync + 'static,
    {
        self.strategies.insert(name.into(), Arc::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    /// Compares two snapshots of the same parameter.
    pub fn compare(&self, op: &str, a: &Snapshot, b: &Snapshot) -> EqualityVerdict {
        match self.strategies.get(op) {
            None => EqualityVerdict::UnknownStrategy(op.to_string()),
            Some(f) if f(a, b) => EqualityVerdict::Equal,
            Some(_) => EqualityVerdict::Unequal,
        }
    }

    /// Compares every parameter in `a` with its counterpart in `b`.
    ///
    /// A parameter present on only one side is unequal.
    pub fn compare_all(&self, op: &str, a: &SnapshotSet, b: &SnapshotSet) -> EqualityVerdict {
        if !self.contains(op) {
            return EqualityVerdict::UnknownStrategy(op.to_string());
        }
        if a.len() != b.len() {
            return EqualityVerdict::Unequal;
        }
        for left in a.iter() {
            let Some(right) = b.get(left.parameter()) else {
                return EqualityVerdict::Unequal;
            };
            if self.compare(op, left, right) == EqualityVerdict::Unequal {
                return EqualityVerdict::Unequal;
            }
        }
        EqualityVerdict::Equal
    }
}
