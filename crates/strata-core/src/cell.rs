//! The per-cell layout descriptor.
//!
//! A mesh collaborator describes every cell with a [`CellInfo`]: four face
//! types, the face-neighbour ids and a raw [`Provision`] saying which time
//! representation the cell exposes to its neighbours. The layout engine
//! repairs ghost cells, rejects everything that is not exclusive, and
//! freezes the result into a [`CellLayout`] whose storage kind is a plain
//! [`StorageKind`] for the rest of the run.

use crate::id::CellId;

/// Number of faces of a tetrahedral cell.
pub const FACES_PER_CELL: usize = 4;

/// Boundary classification of a single face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaceType {
    /// Interior face shared with another cell.
    Regular,
    /// Face glued to a cell on the opposite side of a periodic domain.
    Periodic,
    /// Interior face carrying a dynamic rupture interface.
    DynamicRupture,
    /// Free-surface boundary, evaluated against the cell itself.
    FreeSurface,
    /// Absorbing boundary. No flux term is evaluated.
    Outflow,
}

impl FaceType {
    /// Whether the face couples the cell to a different cell.
    pub fn has_neighbor(self) -> bool {
        matches!(self, Self::Regular | Self::Periodic | Self::DynamicRupture)
    }
}

/// Time representation a cell exposes to its face neighbours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKind {
    /// Time-integrated degrees of freedom over one (possibly accumulated)
    /// sub-interval.
    Buffer,
    /// Taylor coefficients of the time prediction, evaluable at any sub-time.
    Derivatives,
}

/// Raw provisioning flags as delivered by the mesh collaborator.
///
/// Ghost cells may arrive with [`Provision::Both`] because the remote rank
/// offers both representations; only one of them is ever communicated, so
/// the layout engine resolves them. Local cells must be exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Provision {
    /// The cell provides a buffer only.
    Buffer,
    /// The cell provides derivatives only.
    Derivatives,
    /// Both flags set.
    Both,
    /// Neither flag set.
    Neither,
}

impl Provision {
    /// Build a provision from the two raw flags.
    pub fn from_flags(buffer: bool, derivatives: bool) -> Self {
        match (buffer, derivatives) {
            (true, false) => Self::Buffer,
            (false, true) => Self::Derivatives,
            (true, true) => Self::Both,
            (false, false) => Self::Neither,
        }
    }

    /// Whether the flag for `kind` is set.
    pub fn provides(self, kind: StorageKind) -> bool {
        match (self, kind) {
            (Self::Both, _) => true,
            (Self::Buffer, StorageKind::Buffer) => true,
            (Self::Derivatives, StorageKind::Derivatives) => true,
            _ => false,
        }
    }

    /// The storage kind if exactly one flag is set.
    pub fn exclusive(self) -> Option<StorageKind> {
        match self {
            Self::Buffer => Some(StorageKind::Buffer),
            Self::Derivatives => Some(StorageKind::Derivatives),
            Self::Both | Self::Neither => None,
        }
    }
}

impl From<StorageKind> for Provision {
    fn from(kind: StorageKind) -> Self {
        match kind {
            StorageKind::Buffer => Self::Buffer,
            StorageKind::Derivatives => Self::Derivatives,
        }
    }
}

/// Cell description as produced by the mesh/partition collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct CellInfo {
    /// Boundary classification of each face.
    pub face_types: [FaceType; FACES_PER_CELL],
    /// Neighbour across each face, in the concatenated cell index space.
    ///
    /// `None` for boundary faces and for faces of ghost cells that point
    /// outside the local halo.
    pub face_neighbors: [Option<CellId>; FACES_PER_CELL],
    /// What this cell exposes to its neighbours.
    pub provision: Provision,
    /// What the neighbour across each face exposes.
    ///
    /// Ignored for outflow faces; for free-surface faces it names the
    /// cell's own representation.
    pub face_provisions: [StorageKind; FACES_PER_CELL],
}

impl CellInfo {
    /// A cell with four outflow faces and the given provision.
    pub fn new(provision: Provision) -> Self {
        Self {
            face_types: [FaceType::Outflow; FACES_PER_CELL],
            face_neighbors: [None; FACES_PER_CELL],
            provision,
            face_provisions: [StorageKind::Buffer; FACES_PER_CELL],
        }
    }

    /// Set one face, returning the updated descriptor.
    pub fn with_face(
        mut self,
        face: usize,
        face_type: FaceType,
        neighbor: Option<CellId>,
        neighbor_provides: StorageKind,
    ) -> Self {
        self.face_types[face] = face_type;
        self.face_neighbors[face] = neighbor;
        self.face_provisions[face] = neighbor_provides;
        self
    }
}

/// Frozen, exclusive layout of one cell.
///
/// Produced by the layout engine once ghost regions are corrected; the
/// storage kind never changes afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellLayout {
    face_types: [FaceType; FACES_PER_CELL],
    face_neighbors: [Option<CellId>; FACES_PER_CELL],
    storage: StorageKind,
    face_provisions: [StorageKind; FACES_PER_CELL],
}

impl CellLayout {
    /// Freeze a descriptor with an already-resolved storage kind.
    pub fn freeze(info: &CellInfo, storage: StorageKind) -> Self {
        Self {
            face_types: info.face_types,
            face_neighbors: info.face_neighbors,
            storage,
            face_provisions: info.face_provisions,
        }
    }

    /// The representation this cell provides.
    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    /// Boundary classification of `face`.
    pub fn face_type(&self, face: usize) -> FaceType {
        self.face_types[face]
    }

    /// All four face types.
    pub fn face_types(&self) -> &[FaceType; FACES_PER_CELL] {
        &self.face_types
    }

    /// Neighbour across `face`.
    pub fn face_neighbor(&self, face: usize) -> Option<CellId> {
        self.face_neighbors[face]
    }

    /// What the neighbour across `face` provides.
    pub fn face_provision(&self, face: usize) -> StorageKind {
        self.face_provisions[face]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_flags_round_trip() {
        assert_eq!(Provision::from_flags(true, false), Provision::Buffer);
        assert_eq!(Provision::from_flags(false, true), Provision::Derivatives);
        assert_eq!(Provision::from_flags(true, true), Provision::Both);
        assert_eq!(Provision::from_flags(false, false), Provision::Neither);
    }

    #[test]
    fn only_single_flag_provisions_are_exclusive() {
        assert_eq!(Provision::Buffer.exclusive(), Some(StorageKind::Buffer));
        assert_eq!(
            Provision::Derivatives.exclusive(),
            Some(StorageKind::Derivatives)
        );
        assert_eq!(Provision::Both.exclusive(), None);
        assert_eq!(Provision::Neither.exclusive(), None);
    }

    #[test]
    fn both_provides_either_kind() {
        assert!(Provision::Both.provides(StorageKind::Buffer));
        assert!(Provision::Both.provides(StorageKind::Derivatives));
        assert!(!Provision::Neither.provides(StorageKind::Buffer));
        assert!(!Provision::Buffer.provides(StorageKind::Derivatives));
    }

    #[test]
    fn boundary_faces_have_no_neighbor() {
        assert!(FaceType::Regular.has_neighbor());
        assert!(FaceType::Periodic.has_neighbor());
        assert!(FaceType::DynamicRupture.has_neighbor());
        assert!(!FaceType::FreeSurface.has_neighbor());
        assert!(!FaceType::Outflow.has_neighbor());
    }

    #[test]
    fn freeze_keeps_faces_and_sets_kind() {
        let info = CellInfo::new(Provision::Both).with_face(
            2,
            FaceType::Regular,
            Some(CellId(9)),
            StorageKind::Derivatives,
        );
        let layout = CellLayout::freeze(&info, StorageKind::Buffer);
        assert_eq!(layout.storage(), StorageKind::Buffer);
        assert_eq!(layout.face_type(2), FaceType::Regular);
        assert_eq!(layout.face_neighbor(2), Some(CellId(9)));
        assert_eq!(layout.face_provision(2), StorageKind::Derivatives);
        assert_eq!(layout.face_type(0), FaceType::Outflow);
    }
}
