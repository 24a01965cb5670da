use core::{fmt, str::FromStr};

/// Number of bits reserved for the worker identity.
pub const WORKER_ID_BITS: u32 = 10;

/// Number of bits reserved for the per-millisecond sequence.
pub const SEQUENCE_BITS: u32 = 12;

/// Highest identity a coordinator may assign.
pub const MAX_WORKER_ID: u16 = (1 << WORKER_ID_BITS) - 1;

/// Highest sequence value before the generator must wait for the next
/// millisecond.
pub const SEQUENCE_MASK: u16 = (1 << SEQUENCE_BITS) - 1;

/// Left shift applied to the timestamp delta in every layout.
pub const TIMESTAMP_SHIFT: u32 = 22;

/// Bit packing of a generated id.
///
/// The timestamp delta always occupies the bits above [`TIMESTAMP_SHIFT`]. The
/// layouts differ in where the identity lands:
///
/// ```text
/// STANDARD  | timestamp delta (42) | identity (10) | sequence (12) |
/// COMPAT    | timestamp delta (42) | .. identity << 10, sequence OR-ed below .. |
/// ```
///
/// [`IdLayout::COMPAT`] reproduces ids issued by older deployments
/// (`delta << 22 | identity << 10 | sequence`). Its identity and sequence
/// fields overlap, so only the low 10 sequence bits can be decoded and two
/// workers whose identities differ in their low two bits may collide once a
/// millisecond carries more than 1024 ids. Prefer [`IdLayout::STANDARD`]
/// unless compatibility with existing ids matters.
///
/// No layout guards the timestamp delta against outgrowing its 42 bits; bits
/// shifted past the top of the `u64` are discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdLayout {
    name: &'static str,
    identity_shift: u32,
    sequence_mask: u64,
}

impl IdLayout {
    /// Non-overlapping 42/10/12 packing.
    pub const STANDARD: Self = Self {
        name: "standard",
        identity_shift: SEQUENCE_BITS,
        sequence_mask: SEQUENCE_MASK as u64,
    };

    /// Packing used by older deployments; identity shifted by 10.
    pub const COMPAT: Self = Self {
        name: "compat",
        identity_shift: WORKER_ID_BITS,
        sequence_mask: (1 << WORKER_ID_BITS) - 1,
    };

    /// Short name accepted by [`FromStr`].
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Packs the three fields into an id.
    ///
    /// ```
    /// use flockid::IdLayout;
    ///
    /// let id = IdLayout::COMPAT.encode(100, 5, 0);
    /// assert_eq!(id, 419_435_520);
    /// ```
    pub const fn encode(&self, timestamp_delta: u64, identity: u16, sequence: u16) -> u64 {
        (timestamp_delta << TIMESTAMP_SHIFT)
            | ((identity as u64) << self.identity_shift)
            | sequence as u64
    }

    /// Splits an id back into its fields.
    pub const fn decode(&self, id: u64) -> IdParts {
        IdParts {
            timestamp_delta: id >> TIMESTAMP_SHIFT,
            identity: ((id >> self.identity_shift) & MAX_WORKER_ID as u64) as u16,
            sequence: (id & self.sequence_mask) as u16,
        }
    }
}

impl Default for IdLayout {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl fmt::Display for IdLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for IdLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::STANDARD),
            "compat" => Ok(Self::COMPAT),
            other => Err(format!(
                "unknown id layout `{other}` (expected `standard` or `compat`)"
            )),
        }
    }
}

/// The decoded fields of an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdParts {
    /// Milliseconds since the generator's epoch origin.
    pub timestamp_delta: u64,
    /// Identity of the worker that issued the id.
    pub identity: u16,
    /// Position within the millisecond.
    pub sequence: u16,
}
