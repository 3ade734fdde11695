use crate::cursor::types::{ContinuationKey, CursorId, ENGINE_KEEP_ALIVE};
use crate::search::types::MediaItem;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How long the engine keeps a cursor alive, in the engine's own notation (`5m`, `30s`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive(Duration);

#[derive(Debug, Error)]
#[error("invalid keep-alive value '{0}' (expected e.g. 500ms, 30s, 5m, 1h, 1d)")]
pub struct InvalidKeepAlive(pub String);

const UNITS: &[(&str, u64)] = &[
    ("d", 86_400_000),
    ("h", 3_600_000),
    ("m", 60_000),
    ("s", 1_000),
    ("ms", 1),
];

impl KeepAlive {
    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    pub fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self(ENGINE_KEEP_ALIVE)
    }
}

impl FromStr for KeepAlive {
    type Err = InvalidKeepAlive;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let invalid = || InvalidKeepAlive(raw.to_string());

        let split = raw.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        let (amount, unit) = raw.split_at(split);
        let amount: u64 = amount.parse().map_err(|_| invalid())?;
        let factor = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, factor)| *factor)
            .ok_or_else(invalid)?;

        let millis = amount.checked_mul(factor).ok_or_else(invalid)?;
        if millis == 0 {
            return Err(invalid());
        }
        Ok(Self(Duration::from_millis(millis)))
    }
}

impl fmt::Display for KeepAlive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.as_millis();
        let (unit, factor) = UNITS
            .iter()
            .find(|(_, factor)| millis % factor == 0)
            .copied()
            .unwrap_or(("ms", 1));
        write!(f, "{}{}", millis / factor, unit)
    }
}

/// One page request sent through an open cursor.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub cursor_id: CursorId,
    pub limit: usize,
    pub continuation_key: Option<ContinuationKey>,
    pub query: String,
    pub type_filter: Option<String>,
}

/// One page of engine results.
#[derive(Debug, Clone)]
pub struct BackendPage {
    pub items: Vec<MediaItem>,
    /// Total matches for the query scope.
    pub total: u64,
    /// Sort values of the last item; `None` for an empty page.
    pub continuation_key: Option<ContinuationKey>,
    /// Latest cursor id (may differ from the one queried).
    pub cursor_id: CursorId,
}
