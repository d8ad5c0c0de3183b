//! Proptest generators for property-based testing.

use proptest::prelude::*;

use mergehub_core::{Mutation, Replica, StoreId};

/// A valid store id.
pub fn store_id() -> impl Strategy<Value = StoreId> {
    "[a-z][a-z0-9_.-]{0,31}".prop_map(|s| StoreId::new(s).expect("pattern is a valid id"))
}

/// A small key space so that concurrent writers collide.
pub fn key() -> impl Strategy<Value = String> {
    prop_oneof![Just("a"), Just("b"), Just("c")].prop_map(String::from)
}

/// Keys reserved for counters, disjoint from [`key`].
pub fn counter_key() -> impl Strategy<Value = String> {
    prop_oneof![Just("counter"), Just("hits")].prop_map(String::from)
}

/// Any single mutation.
///
/// Counter keys only ever see counter operations, so increments never land
/// on a plain value.
pub fn mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        3 => (counter_key(), -5i64..=5).prop_map(|(key, by)| Mutation::increment(key, by)),
        1 => (key(), "[a-z]{0,8}").prop_map(|(key, value)| Mutation::put(key, value)),
    ]
}

/// Up to `max` mutations.
pub fn mutations(max: usize) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(mutation(), 0..=max)
}

/// Per-peer mutation lists for a multi-writer scenario.
#[derive(Debug, Clone)]
pub struct MutationPlan {
    pub peers: Vec<Vec<Mutation>>,
}

impl MutationPlan {
    /// Sum of all increments on `key` across every peer.
    pub fn total(&self, key: &str) -> i64 {
        self.peers
            .iter()
            .flatten()
            .filter_map(|m| match m {
                Mutation::Increment { key: k, by } if k == key => Some(*by),
                _ => None,
            })
            .sum()
    }
}

impl Arbitrary for MutationPlan {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop::collection::vec(mutations(8), 2..=4)
            .prop_map(|peers| MutationPlan { peers })
            .boxed()
    }
}

/// Apply every mutation, panicking on engine errors.
pub fn apply_all<R: Replica>(replica: &mut R, mutations: &[Mutation]) {
    for mutation in mutations {
        replica.apply(mutation).expect("generated mutation applies");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mergehub_core::AutomergeReplica;

    proptest! {
        #[test]
        fn generated_store_ids_are_valid(id in store_id()) {
            prop_assert!(StoreId::new(id.as_str()).is_ok());
        }

        #[test]
        fn generated_mutations_apply(ops in mutations(20)) {
            let mut replica = AutomergeReplica::empty();
            apply_all(&mut replica, &ops);
            let loaded = AutomergeReplica::load(&replica.save()).unwrap();
            prop_assert_eq!(loaded.heads(), replica.heads());
        }

        #[test]
        fn plan_total_matches_single_replica(plan: MutationPlan) {
            let mut replica = AutomergeReplica::empty();
            for ops in &plan.peers {
                apply_all(&mut replica, ops);
            }
            let counter = replica.counter("counter").unwrap().unwrap_or(0);
            prop_assert_eq!(counter, plan.total("counter"));
        }
    }
}
