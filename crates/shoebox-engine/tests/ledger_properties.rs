//! Property tests: the ledger equals a recomputation after every operation,
//! and tiers only ever move forward.

use proptest::prelude::*;
use shoebox_domain::{GoverningAction, ManualClock, OwnerId, PhotoId, StorageTier};
use shoebox_engine::{
    EngineConfig, InMemoryStorage, LifecycleEngine, LifecycleError, PolicyConfig, RetryConfig,
};
use shoebox_store::SqliteStore;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Upload { original: u64, thumbnail: u64 },
    Freeze(usize),
    Unfreeze(usize),
    Apply { photo: usize, delete: bool },
    AdvanceDays(u64),
    BackendOutage,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..5_000, 0u64..500).prop_map(|(original, thumbnail)| Op::Upload {
            original,
            thumbnail
        }),
        (0usize..8).prop_map(Op::Freeze),
        (0usize..8).prop_map(Op::Unfreeze),
        (0usize..8, any::<bool>()).prop_map(|(photo, delete)| Op::Apply { photo, delete }),
        (0u64..40).prop_map(Op::AdvanceDays),
        Just(Op::BackendOutage),
    ]
}

fn tolerated(result: Result<(), LifecycleError>) {
    match result {
        Ok(())
        | Err(LifecycleError::AlreadyFrozen(_))
        | Err(LifecycleError::NotFrozen(_))
        | Err(LifecycleError::CooldownActive { .. })
        | Err(LifecycleError::PhotoDeleted(_))
        | Err(LifecycleError::CollaboratorUnavailable { .. }) => {}
        Err(e) => panic!("unexpected error: {}", e),
    }
}

async fn run_ops(ops: Vec<Op>) {
    let config = EngineConfig {
        policy: PolicyConfig {
            cold_cost_percent: 40,
            ..Default::default()
        },
        retry: RetryConfig::immediate(),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let storage = Arc::new(InMemoryStorage::new());
    let engine = LifecycleEngine::new(
        Arc::new(SqliteStore::new(":memory:").unwrap()),
        storage.clone(),
        &config,
    )
    .unwrap()
    .with_clock(clock.clone());

    let owner = OwnerId::new();
    let mut photos: Vec<PhotoId> = Vec::new();
    let mut last_tier: HashMap<PhotoId, StorageTier> = HashMap::new();

    for op in ops {
        let pick = |i: usize| (!photos.is_empty()).then(|| photos[i % photos.len()]);

        match op {
            Op::Upload {
                original,
                thumbnail,
            } => {
                let photo = engine
                    .register_upload(owner, original, thumbnail, [])
                    .unwrap();
                photos.push(photo.id);
            }
            Op::Freeze(i) => {
                if let Some(id) = pick(i) {
                    tolerated(engine.freeze(id).await.map(|_| ()));
                }
            }
            Op::Unfreeze(i) => {
                if let Some(id) = pick(i) {
                    tolerated(engine.unfreeze(id).await.map(|_| ()));
                }
            }
            Op::Apply { photo, delete } => {
                if let Some(id) = pick(photo) {
                    let current = engine.get_photo(id).unwrap();
                    let action = if delete {
                        GoverningAction::Delete
                    } else {
                        GoverningAction::MoveToColdTier
                    };
                    tolerated(engine.apply(&current, action, None).await.map(|_| ()));
                }
            }
            Op::AdvanceDays(days) => clock.advance_days(days),
            Op::BackendOutage => storage.fail_next(3),
        }

        let drift = engine.check_ledger().unwrap();
        assert!(drift.is_empty(), "ledger drifted: {:?}", drift);

        for id in &photos {
            let tier = engine.get_photo(*id).unwrap().storage_tier;
            if let Some(previous) = last_tier.insert(*id, tier) {
                assert!(tier >= previous, "photo {} went {} -> {}", id, previous, tier);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: used_space == recompute(owner, photos) after any operation sequence
    #[test]
    fn test_ledger_matches_recompute(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run_ops(ops));
    }
}
