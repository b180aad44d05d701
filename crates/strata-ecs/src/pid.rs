//! Permanent id assignment.

use hashbrown::HashMap;
use rand::{RngCore, SeedableRng, rngs::StdRng};
use rustc_hash::FxBuildHasher;

use crate::{
    config::PidStrategy,
    entity::{EntityId, Pid},
};

/// Assigns pids and resolves them back to ids.
#[derive(Debug)]
pub(crate) enum PidAllocator {
    UsePidAsId,
    Random {
        rng: Box<StdRng>,
        by_pid: HashMap<Pid, EntityId, FxBuildHasher>,
    },
}

impl PidAllocator {
    pub(crate) fn new(strategy: PidStrategy, seed: Option<u64>) -> Self {
        match strategy {
            PidStrategy::UsePidAsId => Self::UsePidAsId,
            PidStrategy::RandomPids => {
                let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
                Self::Random {
                    rng: Box::new(rng),
                    by_pid: HashMap::default(),
                }
            }
        }
    }

    /// Pick the pid of a newly created entity.
    pub(crate) fn assign(&mut self, id: EntityId) -> Pid {
        match self {
            Self::UsePidAsId => Pid::from_raw(u64::from(id.as_raw())),
            Self::Random { rng, by_pid } => loop {
                let pid = Pid::from_raw(rng.next_u64());
                if pid.as_raw() == 0 || by_pid.contains_key(&pid) {
                    continue;
                }
                by_pid.insert(pid, id);
                return pid;
            },
        }
    }

    pub(crate) fn release(&mut self, pid: Pid) {
        if let Self::Random { by_pid, .. } = self {
            by_pid.remove(&pid);
        }
    }

    /// Id of the entity with `pid`. Liveness is checked by the caller.
    pub(crate) fn lookup(&self, pid: Pid) -> Option<EntityId> {
        match self {
            Self::UsePidAsId => u32::try_from(pid.as_raw()).ok().map(EntityId::from_raw),
            Self::Random { by_pid, .. } => by_pid.get(&pid).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_as_id() {
        let mut pids = PidAllocator::new(PidStrategy::UsePidAsId, None);
        let pid = pids.assign(EntityId::from_raw(9));

        assert_eq!(pid.as_raw(), 9);
        assert_eq!(pids.lookup(pid), Some(EntityId::from_raw(9)));
        assert_eq!(pids.lookup(Pid::from_raw(u64::from(u32::MAX) + 1)), None);
    }

    #[test]
    fn test_random_pids_are_seeded_and_unique() {
        let mut a = PidAllocator::new(PidStrategy::RandomPids, Some(7));
        let mut b = PidAllocator::new(PidStrategy::RandomPids, Some(7));

        let from_a: Vec<_> = (1..=100).map(|i| a.assign(EntityId::from_raw(i))).collect();
        let from_b: Vec<_> = (1..=100).map(|i| b.assign(EntityId::from_raw(i))).collect();
        assert_eq!(from_a, from_b);

        let mut sorted = from_a.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 100);
        assert!(from_a.iter().all(|pid| pid.as_raw() != 0 && pid.as_raw() <= Pid::MASK));

        assert_eq!(a.lookup(from_a[41]), Some(EntityId::from_raw(42)));
        a.release(from_a[41]);
        assert_eq!(a.lookup(from_a[41]), None);
    }
}
