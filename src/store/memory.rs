//! In-memory atom store.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Atom, AtomId, EdgeKind};
use super::AtomStore;

/// In-memory atom graph snapshot.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order. Edges may
/// point at atoms that were never added; those dangle until the validator
/// reports them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAtomStore {
    /// Atoms by ID.
    atoms: BTreeMap<AtomId, Atom>,
    /// Target -> (edge kind, source) index.
    incoming: BTreeMap<AtomId, BTreeSet<(EdgeKind, AtomId)>>,
}

impl InMemoryAtomStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a collection of atoms.
    pub fn from_atoms(atoms: impl IntoIterator<Item = Atom>) -> Self {
        let mut store = Self::new();
        for atom in atoms {
            store.add_atom(atom);
        }
        store
    }

    /// Add or replace an atom.
    pub fn add_atom(&mut self, atom: Atom) {
        if let Some(previous) = self.atoms.remove(&atom.id) {
            self.unindex(&previous);
        }
        for edge in &atom.edges {
            self.incoming
                .entry(edge.target.clone())
                .or_default()
                .insert((edge.kind, atom.id.clone()));
        }
        self.atoms.insert(atom.id.clone(), atom);
    }

    /// Remove an atom, returning it if present.
    ///
    /// Edges other atoms hold toward it are left in place.
    pub fn remove_atom(&mut self, id: &AtomId) -> Option<Atom> {
        let atom = self.atoms.remove(id)?;
        self.unindex(&atom);
        Some(atom)
    }

    /// Total number of edges.
    pub fn num_edges(&self) -> usize {
        self.atoms.values().map(|a| a.edges.len()).sum()
    }

    fn unindex(&mut self, atom: &Atom) {
        for edge in &atom.edges {
            if let Some(sources) = self.incoming.get_mut(&edge.target) {
                sources.remove(&(edge.kind, atom.id.clone()));
                if sources.is_empty() {
                    self.incoming.remove(&edge.target);
                }
            }
        }
    }
}

impl AtomStore for InMemoryAtomStore {
    fn get_atom(&self, id: &AtomId) -> Option<&Atom> {
        self.atoms.get(id)
    }

    fn atoms(&self) -> Vec<&Atom> {
        self.atoms.values().collect()
    }

    fn incoming(&self, id: &AtomId, kind: EdgeKind) -> Vec<&Atom> {
        let Some(sources) = self.incoming.get(id) else {
            return Vec::new();
        };
        let ids: BTreeSet<&AtomId> = sources
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, source)| source)
            .collect();
        ids.into_iter().filter_map(|sid| self.atoms.get(sid)).collect()
    }

    fn len(&self) -> usize {
        self.atoms.len()
    }
}
