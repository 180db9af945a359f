//! Object id allocation.
//!
//! Collaborative sessions carve the id space into per-client ranges so
//! concurrent creation never collides; solo sessions scan sequentially.

use shared::{ObjectId, Scene};

/// Width of each client's id range
pub const CLIENT_ID_SHIFT: u64 = 1 << 21;

/// Allocates scene object and step-payload ids for one session
#[derive(Debug)]
pub enum IdAllocator {
    Solo(SoloAllocator),
    Collab(CollabAllocator),
}

impl IdAllocator {
    pub fn solo() -> Self {
        IdAllocator::Solo(SoloAllocator::default())
    }

    /// Partitioned allocator for the client id handed out by the transport
    pub fn collab(client_id: u64) -> Self {
        IdAllocator::Collab(CollabAllocator::new(client_id))
    }

    pub fn is_collab(&self) -> bool {
        matches!(self, IdAllocator::Collab(_))
    }

    /// Next unique id. The solo path consults `scene` for occupied ids;
    /// the collab path never needs to.
    pub fn allocate(&mut self, scene: &Scene) -> ObjectId {
        match self {
            IdAllocator::Solo(solo) => solo.allocate(scene),
            IdAllocator::Collab(collab) => collab.allocate(),
        }
    }
}

/// Sequential-scan allocator for non-collaborative sessions
#[derive(Debug, Default)]
pub struct SoloAllocator {
    // Monotonic cursor so a batch never hands out the same id twice
    next: ObjectId,
}

impl SoloAllocator {
    pub fn allocate(&mut self, scene: &Scene) -> ObjectId {
        let mut id = self.next.max(scene.next_id).max(1);
        while scene.contains_id(id) {
            id += 1;
        }
        self.next = id + 1;
        id
    }
}

/// Coordination-free allocator: `client_id * SHIFT + seq`
#[derive(Debug)]
pub struct CollabAllocator {
    client_id: u64,
    seq: u64,
}

impl CollabAllocator {
    pub fn new(client_id: u64) -> Self {
        Self { client_id, seq: 0 }
    }

    pub fn allocate(&mut self) -> ObjectId {
        let id = self.client_id * CLIENT_ID_SHIFT + self.seq;
        self.seq += 1;
        id
    }
}
