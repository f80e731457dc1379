//! IdGenerator port - ID 生成の抽象化
//!
//! Clock を使って ULID を作るので、FixedClock なら timestamp 部分が決定的になる。

use ulid::Ulid;

use crate::domain::ids::{CycleId, SessionId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_cycle_id(&self) -> CycleId;

    fn generate_session_id(&self) -> SessionId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_cycle_id(&self) -> CycleId {
        CycleId::from(self.next_ulid())
    }

    fn generate_session_id(&self) -> SessionId {
        SessionId::from(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);
        assert_ne!(id_gen.generate_cycle_id(), id_gen.generate_cycle_id());
    }

    #[test]
    fn fixed_clock_pins_the_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let a = id_gen.generate_cycle_id();
        let b = id_gen.generate_session_id();

        assert_eq!(a.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(b.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
