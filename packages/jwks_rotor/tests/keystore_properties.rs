//! Keystore invariants over arbitrary generate/remove sequences

use jwks_rotor::{Algorithm, KeyId, KeySpec, KeyStatus, Keystore, RotationError};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Generate(Algorithm),
    /// Remove the n-th held key (modulo the key count)
    Remove(usize),
    RemoveUnknown,
}

fn arb_algorithm() -> impl Strategy<Value = Algorithm> {
    prop_oneof![
        Just(Algorithm::Es256),
        Just(Algorithm::Es384),
        Just(Algorithm::Es512),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => arb_algorithm().prop_map(Op::Generate),
        2 => any::<usize>().prop_map(Op::Remove),
        1 => Just(Op::RemoveUnknown),
    ]
}

fn held_ids(store: &Keystore) -> Vec<KeyId> {
    store.snapshot().iter().map(|e| e.key().id().clone()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// At most one active key, no private member in the export, and removes
    /// never touch the active key.
    #[test]
    fn invariants_hold_after_every_step(ops in proptest::collection::vec(arb_op(), 1..16)) {
        let store = Keystore::new();
        let mut issued: Vec<KeyId> = Vec::new();

        for op in ops {
            match op {
                Op::Generate(alg) => {
                    let generated = store.generate(&KeySpec::signing(alg)).unwrap();
                    prop_assert!(!issued.contains(generated.key.id()));
                    issued.push(generated.key.id().clone());
                }
                Op::Remove(n) => {
                    let held = held_ids(&store);
                    if held.is_empty() {
                        continue;
                    }
                    let id = &held[n % held.len()];
                    match store.status(id) {
                        Some(KeyStatus::Active) => prop_assert_eq!(
                            store.remove(id).unwrap_err(),
                            RotationError::IllegalTransition {
                                from: KeyStatus::Active,
                                to: KeyStatus::Removed,
                            }
                        ),
                        _ => {
                            prop_assert!(store.remove(id).unwrap().is_some());
                            prop_assert!(store.remove(id).unwrap().is_none());
                        }
                    }
                }
                Op::RemoveUnknown => {
                    prop_assert!(store.remove(&KeyId::from("never-issued")).unwrap().is_none());
                }
            }

            let snapshot = store.snapshot();
            prop_assert!(snapshot.active_count() <= 1);
            prop_assert_eq!(snapshot.active_count(), usize::from(!issued.is_empty()));

            let json: serde_json::Value =
                serde_json::from_str(&store.export_public_set().to_json().unwrap()).unwrap();
            for key in json["keys"].as_array().unwrap() {
                prop_assert!(key.get("d").is_none());
            }

            // Export order follows issue order.
            let exported: Vec<KeyId> = store.export_public_set().ids().cloned().collect();
            let expected: Vec<KeyId> = issued
                .iter()
                .filter(|id| store.status(id).is_some())
                .cloned()
                .collect();
            prop_assert_eq!(exported, expected);
        }
    }
}
