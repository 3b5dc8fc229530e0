//! Atom graph storage seam.
//!
//! The kernel never loads or persists atoms itself. A host loads a
//! snapshot from its storage layer and hands it over behind
//! [`AtomStore`]; every kernel operation only reads from it.

pub mod memory;

use crate::types::{Atom, AtomId, EdgeKind};

/// Read access to a resident atom graph snapshot.
///
/// Implementations must guarantee deterministic ordering of results.
/// The snapshot must not change while kernel calls are in flight.
pub trait AtomStore: Send + Sync {
    /// Fetch an atom by ID.
    fn get_atom(&self, id: &AtomId) -> Option<&Atom>;

    /// All atoms, ordered by AtomId.
    fn atoms(&self) -> Vec<&Atom>;

    /// Atoms holding an edge of `kind` that targets `id`, ordered by AtomId.
    fn incoming(&self, id: &AtomId, kind: EdgeKind) -> Vec<&Atom>;

    /// Whether an atom exists.
    fn contains(&self, id: &AtomId) -> bool {
        self.get_atom(id).is_some()
    }

    /// Number of atoms in the snapshot.
    fn len(&self) -> usize {
        self.atoms().len()
    }

    /// Whether the snapshot is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub use memory::InMemoryAtomStore;
