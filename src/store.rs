// Numan Thabit 2026
// store.rs - held-piece bookkeeping

use std::sync::Mutex;

use bitvec::prelude::*;

/// Tracks which pieces of the download are held locally.
#[derive(Debug)]
pub struct PieceStore {
    held: Mutex<BitVec>,
}

impl PieceStore {
    pub fn new(num_pieces: usize) -> Self {
        Self {
            held: Mutex::new(bitvec![0; num_pieces]),
        }
    }

    pub fn num_pieces(&self) -> usize {
        self.held.lock().expect("piece store lock").len()
    }

    /// Marks a piece as held. Returns false when the index is out of range or
    /// the piece was already held.
    pub fn mark_held(&self, index: usize) -> bool {
        let mut held = self.held.lock().expect("piece store lock");
        if index >= held.len() {
            return false;
        }
        let was_held = held[index];
        held.set(index, true);
        !was_held
    }

    pub fn has(&self, index: usize) -> bool {
        let held = self.held.lock().expect("piece store lock");
        held.get(index).map(|bit| *bit).unwrap_or(false)
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().expect("piece store lock").count_ones()
    }

    pub fn is_complete(&self) -> bool {
        let held = self.held.lock().expect("piece store lock");
        !held.is_empty() && held.all()
    }
}
