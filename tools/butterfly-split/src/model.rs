//! Fixed-width record types and flag bitsets shared by every phase.
//!
//! Layouts follow `spec.md` §3. Records are little-endian and packed without
//! padding beyond natural field alignment; encoding/decoding lives next to
//! each type so the on-disk shape and the in-memory shape never drift apart.

use crate::io::FixedRecord;

pub const NO_NODE: u32 = u32::MAX;
pub const NO_WAY: u32 = u32::MAX;
pub const NO_SEGMENT: u32 = u32::MAX;
pub const NO_RELATION: u32 = u32::MAX;

/// Transport / vehicle classes, stored as a bitset (`allow` fields).
pub mod transports {
    pub const FOOT: u16 = 1 << 0;
    pub const BICYCLE: u16 = 1 << 1;
    pub const MOPED: u16 = 1 << 2;
    pub const MOTORCYCLE: u16 = 1 << 3;
    pub const MOTORCAR: u16 = 1 << 4;
    pub const GOODS: u16 = 1 << 5;
    pub const HGV: u16 = 1 << 6;
    pub const PSV: u16 = 1 << 7;
    pub const WHEELCHAIR: u16 = 1 << 8;

    pub const NONE: u16 = 0;

    pub const ALL_VEHICLES: u16 =
        BICYCLE | MOPED | MOTORCYCLE | MOTORCAR | GOODS | HGV | PSV;
}

/// Route-relation-derived way properties (`props` field).
pub mod properties {
    pub const FOOT_ROUTE: u16 = 1 << 0;
    pub const BICYCLE_ROUTE: u16 = 1 << 1;
    pub const PAVED: u16 = 1 << 2;
}

/// `Way::highway_type` bits: the low 6 bits are the highway classification,
/// the top 2 are the oneway/area flags (`ways.c`'s single packed `Type`
/// byte, `WaysCompare`'s first ordering key).
pub mod way_flags {
    pub const HIGHWAY_MASK: u8 = 0x3F;
    pub const ONEWAY: u8 = 1 << 6;
    pub const AREA: u8 = 1 << 7;
}

/// Node flag bits (`NodeX::flags`).
pub mod node_flags {
    pub const TURNRSTRCT: u16 = 1 << 0;
    pub const TURNRSTRCT2: u16 = 1 << 1;
    pub const SUPER: u16 = 1 << 2;
    pub const PRUNED: u16 = 1 << 3;
}

/// Segment distance-field high-bit flags. The low 28 bits hold the length in
/// metres (`spec.md` §3); `ONEWAY_1TO2`/`ONEWAY_2TO1`/`AREA` share the top
/// nibble. `SEGMENT_NORMAL`/`SEGMENT_SUPER` and the two incline bits don't
/// fit alongside them in one `u32` (35 bits of flags plus a 28-bit length is
/// more than 32), so they live in `SegmentX::kind` and `SegmentX::incline`
/// instead — two extra bytes per segment rather than a cramped bitfield.
pub mod segment_flags {
    pub const DISTANCE_MASK: u32 = 0x0FFF_FFFF;
    pub const ONEWAY_1TO2: u32 = 1 << 28;
    pub const ONEWAY_2TO1: u32 = 1 << 29;
    pub const AREA: u32 = 1 << 30;

    pub const SEGMENT_NORMAL: u8 = 1 << 0;
    pub const SEGMENT_SUPER: u8 = 1 << 1;

    pub const INCLINEUP_1TO2: u8 = 1 << 0;
    pub const INCLINEUP_2TO1: u8 = 1 << 1;
}

/// The packed distance+flags value carried by a segment. Kept as a thin
/// newtype instead of a bare `u32` so the one-way/area/incline bit-twiddling
/// in `spec.md` §3/§4.E only has one place to go wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Distance(pub u32);

impl Distance {
    pub fn metres(self) -> u32 {
        self.0 & segment_flags::DISTANCE_MASK
    }

    pub fn with_metres(self, metres: u32) -> Self {
        debug_assert!(metres <= segment_flags::DISTANCE_MASK);
        Distance((self.0 & !segment_flags::DISTANCE_MASK) | (metres & segment_flags::DISTANCE_MASK))
    }

    pub fn flag(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn set_flag(self, bit: u32, value: bool) -> Self {
        if value {
            Distance(self.0 | bit)
        } else {
            Distance(self.0 & !bit)
        }
    }

    /// Swap the one-way flags, used when `AppendSegmentList` normalizes
    /// `node1 <= node2` by swapping the endpoints (`spec.md` invariant 3).
    pub fn swap_oneway(self) -> Self {
        let mut d = self.0;
        let from = d & segment_flags::ONEWAY_1TO2 != 0;
        let to = d & segment_flags::ONEWAY_2TO1 != 0;
        d &= !(segment_flags::ONEWAY_1TO2 | segment_flags::ONEWAY_2TO1);
        if from {
            d |= segment_flags::ONEWAY_2TO1;
        }
        if to {
            d |= segment_flags::ONEWAY_1TO2;
        }
        Distance(d)
    }
}

/// Extended node (`NodeX`, `spec.md` §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeX {
    pub id: u64,
    pub allow: u16,
    pub flags: u16,
    pub lat: i32,
    pub lon: i32,
}

pub const NODEX_SIZE: usize = 8 + 2 + 2 + 4 + 4;

impl NodeX {
    pub fn to_bytes(&self) -> [u8; NODEX_SIZE] {
        let mut buf = [0u8; NODEX_SIZE];
        buf[0..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..10].copy_from_slice(&self.allow.to_le_bytes());
        buf[10..12].copy_from_slice(&self.flags.to_le_bytes());
        buf[12..16].copy_from_slice(&self.lat.to_le_bytes());
        buf[16..20].copy_from_slice(&self.lon.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        NodeX {
            id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            allow: u16::from_le_bytes(buf[8..10].try_into().unwrap()),
            flags: u16::from_le_bytes(buf[10..12].try_into().unwrap()),
            lat: i32::from_le_bytes(buf[12..16].try_into().unwrap()),
            lon: i32::from_le_bytes(buf[16..20].try_into().unwrap()),
        }
    }

    pub fn has_flag(&self, bit: u16) -> bool {
        self.flags & bit != 0
    }
}

/// Way payload shared between `WayX` and the final `ways.mem` record
/// (`spec.md` §3: `Way = { name, type, allow, props, speed, weight, height,
/// width, length, incline }`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Way {
    pub name: u32,
    pub highway_type: u8,
    pub allow: u16,
    pub props: u16,
    pub speed: u8,
    pub weight: u8,
    pub height: u8,
    pub width: u8,
    pub length: u8,
    pub incline: i8,
}

pub const WAY_SIZE: usize = 4 + 1 + 2 + 2 + 1 + 1 + 1 + 1 + 1 + 1;

impl Way {
    pub fn to_bytes(&self) -> [u8; WAY_SIZE] {
        let mut buf = [0u8; WAY_SIZE];
        buf[0..4].copy_from_slice(&self.name.to_le_bytes());
        buf[4] = self.highway_type;
        buf[5..7].copy_from_slice(&self.allow.to_le_bytes());
        buf[7..9].copy_from_slice(&self.props.to_le_bytes());
        buf[9] = self.speed;
        buf[10] = self.weight;
        buf[11] = self.height;
        buf[12] = self.width;
        buf[13] = self.length;
        buf[14] = self.incline as u8;
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        Way {
            name: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            highway_type: buf[4],
            allow: u16::from_le_bytes(buf[5..7].try_into().unwrap()),
            props: u16::from_le_bytes(buf[7..9].try_into().unwrap()),
            speed: buf[9],
            weight: buf[10],
            height: buf[11],
            width: buf[12],
            length: buf[13],
            incline: buf[14] as i8,
        }
    }

    /// Total ordering on `(type, allow, props, speed, weight, height, width,
    /// length)`. Two ways are "the same class" iff this compares equal
    /// (`spec.md` §4.H, §GLOSSARY "WaysCompare").
    pub fn compare(&self, other: &Way) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        (self.highway_type, self.allow, self.props, self.speed, self.weight, self.height, self.width, self.length)
            .cmp(&(
                other.highway_type,
                other.allow,
                other.props,
                other.speed,
                other.weight,
                other.height,
                other.width,
                other.length,
            ))
            .then(Equal)
    }

    pub fn same_class(&self, other: &Way) -> bool {
        self.compare(other) == std::cmp::Ordering::Equal
    }

    pub fn is_oneway(&self) -> bool {
        self.highway_type & way_flags::ONEWAY != 0
    }

    pub fn is_area(&self) -> bool {
        self.highway_type & way_flags::AREA != 0
    }
}

/// Extended way (`WayX`, `spec.md` §3): original OSM id plus the packed
/// `Way` payload. `id` becomes the sorted index after `SortWayList`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WayX {
    pub id: u64,
    pub way: Way,
}

pub const WAYX_SIZE: usize = 8 + WAY_SIZE;

impl WayX {
    pub fn to_bytes(&self) -> [u8; WAYX_SIZE] {
        let mut buf = [0u8; WAYX_SIZE];
        buf[0..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..].copy_from_slice(&self.way.to_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        WayX {
            id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            way: Way::from_bytes(&buf[8..8 + WAY_SIZE]),
        }
    }
}

/// Extended segment (`SegmentX`, `spec.md` §3). `node1 <= node2` is an
/// invariant maintained by `AppendSegmentList` (see `entities::segmentsx`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentX {
    pub node1: u32,
    pub node2: u32,
    pub next2: u32,
    pub way: u32,
    pub distance: Distance,
    /// `SEGMENT_NORMAL` / `SEGMENT_SUPER` (`spec.md` §4.H).
    pub kind: u8,
    /// `INCLINEUP_1TO2` / `INCLINEUP_2TO1` (`spec.md` §9 Design Note 4).
    pub incline: u8,
}

pub const SEGMENTX_SIZE: usize = 4 + 4 + 4 + 4 + 4 + 1 + 1;

impl SegmentX {
    pub fn to_bytes(&self) -> [u8; SEGMENTX_SIZE] {
        let mut buf = [0u8; SEGMENTX_SIZE];
        buf[0..4].copy_from_slice(&self.node1.to_le_bytes());
        buf[4..8].copy_from_slice(&self.node2.to_le_bytes());
        buf[8..12].copy_from_slice(&self.next2.to_le_bytes());
        buf[12..16].copy_from_slice(&self.way.to_le_bytes());
        buf[16..20].copy_from_slice(&self.distance.0.to_le_bytes());
        buf[20] = self.kind;
        buf[21] = self.incline;
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        SegmentX {
            node1: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            node2: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            next2: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            way: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            distance: Distance(u32::from_le_bytes(buf[16..20].try_into().unwrap())),
            kind: buf[20],
            incline: buf[21],
        }
    }

    pub fn is_super(&self) -> bool {
        self.kind & segment_flags::SEGMENT_SUPER != 0
    }

    /// Incline climbing `node1 -> node2`, as seen from `from`.
    pub fn inclines_up_from(&self, from: u32) -> bool {
        if self.node1 == from {
            self.incline & segment_flags::INCLINEUP_1TO2 != 0
        } else {
            self.incline & segment_flags::INCLINEUP_2TO1 != 0
        }
    }

    pub fn other_node(&self, node: u32) -> u32 {
        if self.node1 == node {
            self.node2
        } else {
            self.node1
        }
    }

    /// True if travel were to start *at* `node` and this segment disallows
    /// leaving in that direction (used by turn-restriction + super-segment
    /// traversal checks).
    pub fn is_oneway_from(&self, node: u32) -> bool {
        if self.node1 == node {
            self.distance.flag(segment_flags::ONEWAY_2TO1)
        } else {
            self.distance.flag(segment_flags::ONEWAY_1TO2)
        }
    }

    /// True if travel *toward* `node` along this segment is against the
    /// one-way direction.
    pub fn is_oneway_to(&self, node: u32) -> bool {
        if self.node1 == node {
            self.distance.flag(segment_flags::ONEWAY_1TO2)
        } else {
            self.distance.flag(segment_flags::ONEWAY_2TO1)
        }
    }

    /// Swap `node1`/`node2` and flip every direction-dependent bit to match,
    /// restoring the `node1 <= node2` invariant (`AppendSegmentList`).
    pub fn swap_nodes(&mut self) {
        std::mem::swap(&mut self.node1, &mut self.node2);
        self.distance = self.distance.swap_oneway();
        let up_1to2 = self.incline & segment_flags::INCLINEUP_1TO2 != 0;
        let up_2to1 = self.incline & segment_flags::INCLINEUP_2TO1 != 0;
        self.incline = 0;
        if up_1to2 {
            self.incline |= segment_flags::INCLINEUP_2TO1;
        }
        if up_2to1 {
            self.incline |= segment_flags::INCLINEUP_1TO2;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnRestriction {
    NoRightTurn,
    NoLeftTurn,
    NoUTurn,
    NoStraightOn,
    OnlyRightTurn,
    OnlyLeftTurn,
    OnlyStraightOn,
    /// A prescriptive (`only_*`) restriction after it has been expanded into
    /// its per-alternative prohibitive records (`spec.md` §4.F). The
    /// original `only_*` code names one permitted direction, not the
    /// forbidden one each expanded record actually represents, so there is
    /// no single `No*Turn` variant to carry over.
    Prohibited,
}

impl TurnRestriction {
    pub fn is_prohibitive(self) -> bool {
        matches!(
            self,
            TurnRestriction::NoRightTurn
                | TurnRestriction::NoLeftTurn
                | TurnRestriction::NoUTurn
                | TurnRestriction::NoStraightOn
                | TurnRestriction::Prohibited
        )
    }
}

/// A route relation, in its raw (pre-propagation) form (`RouteRelX`).
#[derive(Clone, Debug)]
pub struct RouteRelX {
    pub id: u64,
    pub routes: u16,
    pub nodes: Vec<u64>,
    pub ways: Vec<u64>,
    pub relations: Vec<u64>,
}

/// A turn relation, before (way ids) or after (segment indexes) resolution
/// against the graph (`TurnRelX`).
#[derive(Clone, Copy, Debug)]
pub struct TurnRelX {
    pub id: u64,
    pub from: u32,
    pub via: u32,
    pub to: u32,
    pub restriction: TurnRestriction,
    pub except: u16,
}

/// Final on-disk turn relation record (`relations.mem`, `spec.md` §6):
/// `from`/`to` have been mapped from way index to segment index.
#[derive(Clone, Copy, Debug)]
pub struct TurnRelation {
    pub from: u32,
    pub via: u32,
    pub to: u32,
    pub except: u8,
}

impl FixedRecord for NodeX {
    const SIZE: usize = NODEX_SIZE;
    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_bytes());
    }
    fn decode(buf: &[u8]) -> Self {
        NodeX::from_bytes(buf)
    }
}

impl FixedRecord for WayX {
    const SIZE: usize = WAYX_SIZE;
    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_bytes());
    }
    fn decode(buf: &[u8]) -> Self {
        WayX::from_bytes(buf)
    }
}

impl FixedRecord for SegmentX {
    const SIZE: usize = SEGMENTX_SIZE;
    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_bytes());
    }
    fn decode(buf: &[u8]) -> Self {
        SegmentX::from_bytes(buf)
    }
}
