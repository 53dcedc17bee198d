//! Waypoint nodes and segment keys.

/// Opaque 16-bit waypoint identifier. Only equality and ordering matter.
pub type Node = u16;

/// An ordered (origin, destination) pair packed into 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey(u32);

impl SegmentKey {
    pub fn new(origin: Node, destination: Node) -> Self {
        Self((u32::from(origin) << 16) | u32::from(destination))
    }

    pub fn origin(self) -> Node {
        (self.0 >> 16) as Node
    }

    pub fn destination(self) -> Node {
        (self.0 & 0xFFFF) as Node
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.origin(), self.destination())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_origin_high() {
        let key = SegmentKey::new(0x000A, 0x0014);
        assert_eq!(key.as_u32(), 0x000A_0014);
        assert_eq!(key.origin(), 10);
        assert_eq!(key.destination(), 20);
    }

    #[test]
    fn direction_matters() {
        assert_ne!(SegmentKey::new(1, 2), SegmentKey::new(2, 1));
    }
}
