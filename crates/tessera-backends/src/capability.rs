//! Capability table for fused device kernels
//!
//! Vendor bindings ship kernels for some operation/precision pairs and not
//! others. The table is probed once per device and consulted before every
//! launch, so a missing kernel is reported as an error or routed to a host
//! fallback instead of reaching the backend.

use crate::backend::{Backend, DType, KernelOp};
use std::collections::BTreeSet;
use std::fmt;

/// Set of (operation, precision) pairs a backend can launch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityTable {
    entries: BTreeSet<(KernelOp, DType)>,
}

impl CapabilityTable {
    /// Table with no capabilities
    pub fn empty() -> Self {
        Self::default()
    }

    /// Query the backend for every known pair
    #[tracing::instrument(skip(backend), fields(backend = backend.name()))]
    pub fn probe(backend: &dyn Backend) -> Self {
        let entries: BTreeSet<_> = KernelOp::ALL
            .iter()
            .flat_map(|&op| DType::ALL.iter().map(move |&dtype| (op, dtype)))
            .filter(|&(op, dtype)| backend.supports(op, dtype))
            .collect();

        tracing::debug!(kernels = entries.len(), "capabilities_probed");
        Self { entries }
    }

    /// Build a table from an explicit list of pairs
    pub fn from_pairs(pairs: impl IntoIterator<Item = (KernelOp, DType)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    pub fn supports(&self, op: KernelOp, dtype: DType) -> bool {
        self.entries.contains(&(op, dtype))
    }

    /// Remove a pair, as if the binding had been built without it
    pub fn disable(&mut self, op: KernelOp, dtype: DType) -> bool {
        self.entries.remove(&(op, dtype))
    }

    pub fn iter(&self) -> impl Iterator<Item = (KernelOp, DType)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for CapabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (op, dtype) in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{op}<{dtype}>")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CpuBackend;

    #[test]
    fn test_probe_cpu_backend() {
        let backend = CpuBackend::new();
        let table = CapabilityTable::probe(&backend);

        // Every float kernel plus four integer kernels per integer precision
        assert_eq!(table.len(), KernelOp::ALL.len() * 2 + 4 * 2);
        assert!(table.supports(KernelOp::Softplus, DType::F32));
        assert!(table.supports(KernelOp::Scale, DType::I64));
        assert!(!table.supports(KernelOp::Softplus, DType::I32));
    }

    #[test]
    fn test_disable_pair() {
        let mut table = CapabilityTable::from_pairs([(KernelOp::Axpy, DType::F32)]);
        assert!(table.disable(KernelOp::Axpy, DType::F32));
        assert!(!table.supports(KernelOp::Axpy, DType::F32));
        assert!(table.is_empty());
    }

    #[test]
    fn test_display() {
        let table = CapabilityTable::from_pairs([(KernelOp::Scale, DType::F64), (KernelOp::Axpy, DType::F32)]);
        assert_eq!(table.to_string(), "axpy<f32>, scal<f64>");
    }
}
