use std::fmt;

/// Kind discriminator of a GPU-resident object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Program,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Program => "program",
        })
    }
}

/// Opaque, stable reference to a registry slot.
///
/// A handle stays valid until its object is destroyed. The slot may later be
/// reused, but only under a strictly greater generation, so an old handle can
/// never alias the new object.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ResourceHandle {
    index: u32,
    generation: u32,
    epoch: u32,
    kind: ResourceKind,
}

impl ResourceHandle {
    pub(crate) const fn new(index: u32, generation: u32, epoch: u32, kind: ResourceKind) -> Self {
        Self {
            index,
            generation,
            epoch,
            kind,
        }
    }

    #[inline]
    pub fn kind(self) -> ResourceKind {
        self.kind
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Epoch of the context that issued the handle.
    #[inline]
    pub fn epoch(self) -> u32 {
        self.epoch
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}v{}]", self.kind, self.index, self.generation)
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}v{}@{}]",
            self.kind, self.index, self.generation, self.epoch
        )
    }
}
