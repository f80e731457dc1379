//! Correlation identifiers (strongly-typed ULIDs).
//!
//! `Id<T>` は PhantomData のマーカー型で種類を区別する ULID ラッパーです。
//! CycleId と SessionId は混同できません（コンパイル時に弾かれる）。
//!
//! These ids never leave the process: they exist so that every log line of
//! one loop cycle, or of one rendering session, can be correlated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait providing the Display prefix of an id kind.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// One pass of the control loop (fetch → dispatch → scrape/backoff/recover).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cycle {}

impl IdMarker for Cycle {
    fn prefix() -> &'static str {
        "cycle-"
    }
}

/// One acquired rendering session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Session {}

impl IdMarker for Session {
    fn prefix() -> &'static str {
        "session-"
    }
}

pub type CycleId = Id<Cycle>;
pub type SessionId = Id<Session>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let cycle = CycleId::from_ulid(Ulid::new());
        let session = SessionId::from_ulid(Ulid::new());

        assert!(cycle.to_string().starts_with("cycle-"));
        assert!(session.to_string().starts_with("session-"));
        // let _: CycleId = session; // <- does not compile
    }

    #[test]
    fn marker_costs_no_memory() {
        assert_eq!(std::mem::size_of::<CycleId>(), std::mem::size_of::<Ulid>());
    }
}
