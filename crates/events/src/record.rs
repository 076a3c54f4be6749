use core::fmt;
use core::str::FromStr;

/// Position of a record within one partition.
///
/// Rendered as `{millis}-{seq}`, which is also the Redis stream entry id.
/// [`Offset::ZERO`] sorts before every real record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset {
    millis: u64,
    seq: u64,
}

impl Offset {
    pub const ZERO: Offset = Offset { millis: 0, seq: 0 };

    pub const fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid offset `{0}`")]
pub struct OffsetParseError(pub String);

impl FromStr for Offset {
    type Err = OffsetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || OffsetParseError(s.to_string());
        let (millis, seq) = s.split_once('-').ok_or_else(err)?;
        Ok(Self {
            millis: millis.parse().map_err(|_| err())?,
            seq: seq.parse().map_err(|_| err())?,
        })
    }
}

/// Out-of-band metadata attached to every record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordHeaders {
    pub event_type: String,
    pub producer_id: String,
}

/// Record handed to [`crate::EventLog::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRecord {
    pub key: String,
    pub headers: RecordHeaders,
    pub payload: Vec<u8>,
}

/// Acknowledged position of an appended record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendAck {
    pub partition: u32,
    pub offset: Offset,
}

/// Record read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub partition: u32,
    pub offset: Offset,
    pub key: String,
    pub headers: RecordHeaders,
    pub payload: Vec<u8>,
}

impl LogRecord {
    /// Approximate wire size used for fetch byte budgets.
    pub fn size_bytes(&self) -> usize {
        self.key.len()
            + self.headers.event_type.len()
            + self.headers.producer_id.len()
            + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_order_by_millis_then_seq() {
        assert!(Offset::new(1, 9) < Offset::new(2, 0));
        assert!(Offset::new(2, 0) < Offset::new(2, 1));
        assert!(Offset::ZERO < Offset::new(0, 1));
    }

    #[test]
    fn offsets_parse_stream_ids() {
        let offset: Offset = "1700000000000-3".parse().unwrap();
        assert_eq!(offset, Offset::new(1_700_000_000_000, 3));
        assert_eq!(offset.to_string(), "1700000000000-3");
        assert!("17".parse::<Offset>().is_err());
        assert!("a-b".parse::<Offset>().is_err());
    }
}
