use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use cladari_lineage::config::LineageConfig;
use cladari_lineage::{
    BreedingRecord, EntityKind, ErrorKind, FixedClock, FloweringPatch, FloweringStage, LineageError,
    LineageService, MemoryStore, NewCross, NewHarvest, NewPlant, NewSeedBatch, NewSeedling, PlantPromotion,
    SeedlingFilter, SeedlingUpdate, SelectionStatus, SequenceId,
};

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).unwrap()
}

fn service_at(store: Arc<MemoryStore>, now: DateTime<Utc>) -> Arc<LineageService<MemoryStore>> {
    Arc::new(LineageService::new(store, &LineageConfig::default()).with_clock(Arc::new(FixedClock(now))))
}

fn service() -> Arc<LineageService<MemoryStore>> {
    service_at(Arc::new(MemoryStore::new()), at(2025, 5, 10))
}

async fn cross(service: &LineageService<MemoryStore>) -> BreedingRecord {
    let mother = service.register_plant(NewPlant::default()).await.unwrap();
    let father = service.register_plant(NewPlant::default()).await.unwrap();
    service.create_cross(NewCross::new(mother.id, father.id)).await.unwrap()
}

#[tokio::test]
async fn test_harvest_numbering_scenario() {
    let service = service();
    let cross = cross(&service).await;
    assert_eq!(cross.cross_id.to_string(), "CLX-2025-001");

    let first = service.create_harvest(&cross.id, NewHarvest::default()).await.unwrap();
    assert_eq!(first.harvest_number, 1);

    let duplicate = service
        .create_harvest(
            &cross.id,
            NewHarvest {
                harvest_number: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(duplicate, LineageError::DuplicateHarvestNumber { number: 1, .. }));
    assert_eq!(duplicate.kind(), ErrorKind::Conflict);

    let second = service.create_harvest(&cross.id, NewHarvest::default()).await.unwrap();
    assert_eq!(second.harvest_number, 2);

    service.delete_harvest(&cross.id, &first.id).await.unwrap();
    let third = service.create_harvest(&cross.id, NewHarvest::default()).await.unwrap();
    assert_eq!(third.harvest_number, 3);

    let numbers: Vec<i32> = service
        .list_harvests(&cross.id)
        .await
        .unwrap()
        .iter()
        .map(|h| h.harvest_number)
        .collect();
    assert_eq!(numbers, vec![2, 3]);
}

#[tokio::test]
async fn test_explicit_numbers_may_skip_ahead() {
    let service = service();
    let cross = cross(&service).await;

    let fifth = service
        .create_harvest(
            &cross.id,
            NewHarvest {
                harvest_number: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(fifth.harvest_number, 5);

    // Gaps below the high-water mark can still be filled explicitly
    let second = service
        .create_harvest(
            &cross.id,
            NewHarvest {
                harvest_number: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(second.harvest_number, 2);

    let next = service.create_harvest(&cross.id, NewHarvest::default()).await.unwrap();
    assert_eq!(next.harvest_number, 6);
}

#[tokio::test]
async fn test_harvest_series_ending_at_the_largest_number() {
    let service = service();
    let cross = cross(&service).await;

    let last = service
        .create_harvest(
            &cross.id,
            NewHarvest {
                harvest_number: Some(i32::MAX),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(last.harvest_number, i32::MAX);

    let err = service.next_harvest_number(&cross.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = service
        .create_harvest(&cross.id, NewHarvest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Explicit numbers below the mark are still accepted
    let filled = service
        .create_harvest(
            &cross.id,
            NewHarvest {
                harvest_number: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(filled.harvest_number, 1);

    let numbers: Vec<i32> = service
        .list_harvests(&cross.id)
        .await
        .unwrap()
        .iter()
        .map(|h| h.harvest_number)
        .collect();
    assert_eq!(numbers, vec![1, i32::MAX]);
}

#[tokio::test]
async fn test_harvest_for_missing_cross() {
    let service = service();
    let err = service
        .create_harvest(&"missing".to_string(), NewHarvest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LineageError::NotFound { entity: "cross", .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_flowering_stage_scenario() {
    let service = service();
    let plant = service.register_plant(NewPlant::default()).await.unwrap();
    let day = |n: i64| at(2025, 5, 1) + Duration::days(n);

    let cycle = service
        .start_cycle(
            &plant.id,
            FloweringPatch {
                spathe_emergence: Some(day(0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    service
        .update_cycle(
            &plant.id,
            &cycle.id,
            FloweringPatch {
                female_start: Some(day(2)),
                female_end: Some(day(5)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = service
        .update_cycle(
            &plant.id,
            &cycle.id,
            FloweringPatch {
                male_start: Some(day(4)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LineageError::InvalidStageOrder { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);

    // No partial write happened
    let stored = service.get_cycle(&plant.id, &cycle.id).await.unwrap();
    assert_eq!(stored.male_start, None);
    assert_eq!(stored.version, 1);

    let updated = service
        .update_cycle(
            &plant.id,
            &cycle.id,
            FloweringPatch {
                male_start: Some(day(6)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.male_start, Some(day(6)));
    assert_eq!(updated.stage(), Some(FloweringStage::MaleShedding));
}

#[tokio::test]
async fn test_deleting_a_cycle_leaves_others_alone() {
    let service = service();
    let plant = service.register_plant(NewPlant::default()).await.unwrap();
    let first = service.start_cycle(&plant.id, FloweringPatch::default()).await.unwrap();
    let second = service.start_cycle(&plant.id, FloweringPatch::default()).await.unwrap();

    service.delete_cycle(&plant.id, &first.id).await.unwrap();
    let remaining = service.list_cycles(&plant.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.id);

    let err = service.get_cycle(&plant.id, &first.id).await.unwrap_err();
    assert!(matches!(err, LineageError::NotFound { entity: "flowering cycle", .. }));
}

#[tokio::test]
async fn test_reads_after_create_match_creation_response() {
    let service = service();
    let cross = cross(&service).await;

    let harvest = service
        .create_harvest(
            &cross.id,
            NewHarvest {
                seed_count: Some(64),
                berry_count: Some(9),
                seed_viability: Some(80.0),
                photos: Some(vec!["berries.jpg".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(service.get_harvest(&cross.id, &harvest.id).await.unwrap(), harvest);

    let batch = service
        .create_seed_batch(
            &harvest.id,
            NewSeedBatch {
                seed_count: Some(64),
                substrate: Some("sphagnum".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(service.get_seed_batch(&batch.id).await.unwrap(), batch);

    let plant = service.register_plant(NewPlant::default()).await.unwrap();
    let cycle = service.start_cycle(&plant.id, FloweringPatch::default()).await.unwrap();
    assert_eq!(service.get_cycle(&plant.id, &cycle.id).await.unwrap(), cycle);
}

#[tokio::test]
async fn test_allocation_year_rolls_over_with_the_clock() {
    let store = Arc::new(MemoryStore::new());
    let december = service_at(store.clone(), at(2025, 12, 31));
    let january = service_at(store, at(2026, 1, 1));

    let a = december.register_plant(NewPlant::default()).await.unwrap();
    let b = december.register_plant(NewPlant::default()).await.unwrap();
    let late = december
        .create_cross(NewCross::new(a.id.clone(), b.id.clone()))
        .await
        .unwrap();
    let early = january.create_cross(NewCross::new(a.id, b.id)).await.unwrap();

    assert_eq!(late.cross_id.to_string(), "CLX-2025-001");
    assert_eq!(early.cross_id.to_string(), "CLX-2026-001");
}

#[tokio::test]
async fn test_legacy_identifiers_are_never_collided_with() {
    let store = Arc::new(MemoryStore::new());
    let legacy = NewPlant::default().into_plant(SequenceId::new(EntityKind::Plant, 2025, 41), at(2024, 6, 1));
    store.import_plant(legacy).unwrap();

    let service = service_at(store, at(2025, 5, 10));
    let plant = service.register_plant(NewPlant::default()).await.unwrap();
    assert_eq!(plant.plant_id.to_string(), "ANT-2025-0042");
}

#[tokio::test]
async fn test_seed_batch_lifecycle() {
    let service = service();
    let cross = cross(&service).await;
    let harvest = service.create_harvest(&cross.id, NewHarvest::default()).await.unwrap();
    let batch = service
        .create_seed_batch(
            &harvest.id,
            NewSeedBatch {
                seed_count: Some(4),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(batch.batch_id.to_string(), "SDB-2025-001");

    service.create_seedling(&batch.id, NewSeedling::default()).await.unwrap();
    let reloaded = service.get_seed_batch(&batch.id).await.unwrap();
    assert_eq!(reloaded.seedling_count, 1);
    assert_eq!(reloaded.status.as_str(), "GERMINATING");
    assert_eq!(reloaded.germination_rate(), Some(25.0));

    // Batches with seedlings and their harvests are protected
    assert!(matches!(
        service.delete_seed_batch(&batch.id).await,
        Err(LineageError::Conflict(_))
    ));
    assert!(matches!(
        service.delete_harvest(&cross.id, &harvest.id).await,
        Err(LineageError::Conflict(_))
    ));

    let summary = service.queries().cross_lineage(&cross.id).await.unwrap();
    assert_eq!(summary.summary.total_seedlings, 1);
    assert_eq!(summary.harvests[0].seed_batches[0].id, batch.id);
}

#[tokio::test]
async fn test_seedling_selection_and_removal() {
    let service = service();
    let cross = cross(&service).await;
    let harvest = service.create_harvest(&cross.id, NewHarvest::default()).await.unwrap();
    let first_batch = service
        .create_seed_batch(&harvest.id, NewSeedBatch::default())
        .await
        .unwrap();
    let second_batch = service
        .create_seed_batch(&harvest.id, NewSeedBatch::default())
        .await
        .unwrap();

    let mut entries: Vec<_> = (0..4).map(|_| (first_batch.id.clone(), NewSeedling::default())).collect();
    entries.push((second_batch.id.clone(), NewSeedling::default()));
    let sown = service.create_seedlings(entries).await.unwrap();
    assert_eq!(sown.len(), 5);

    for (seedling, status) in sown.iter().zip([SelectionStatus::Keeper, SelectionStatus::Cull]) {
        service
            .update_seedling(
                &seedling.id,
                SeedlingUpdate {
                    selection_status: Some(status),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let in_first = service
        .list_seedlings(&SeedlingFilter::for_batch(first_batch.id.clone()))
        .await
        .unwrap();
    let numbers: Vec<i64> = in_first.iter().map(|s| s.seedling_id.seq).collect();
    assert_eq!(numbers, [1, 2, 3, 4]);

    let culls = service
        .list_seedlings(&SeedlingFilter {
            selection_status: Some(SelectionStatus::Cull),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(culls.len(), 1);
    assert_eq!(culls[0].id, sown[1].id);

    // Culled seedlings can be removed; the number is not handed out again
    service.delete_seedling(&sown[1].id).await.unwrap();
    let missing = service.delete_seedling(&sown[1].id).await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    let replacement = service.create_seedling(&first_batch.id, NewSeedling::default()).await.unwrap();
    assert_eq!(replacement.seedling_id.to_string(), "SDL-2025-0006");

    // A graduated keeper stays on record
    service.promote_seedling(&sown[0].id, PlantPromotion::default()).await.unwrap();
    let refused = service.delete_seedling(&sown[0].id).await.unwrap_err();
    assert_eq!(refused.kind(), ErrorKind::Conflict);
    assert!(service.get_seedling(&sown[0].id).await.is_ok());

    let graduated = service
        .list_seedlings(&SeedlingFilter {
            seed_batch_id: Some(first_batch.id.clone()),
            selection_status: Some(SelectionStatus::Graduated),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(graduated.len(), 1);
    assert_eq!(service.get_seed_batch(&first_batch.id).await.unwrap().seedling_count, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_crosses_get_distinct_identifiers() {
    let service = service();
    let mother = service.register_plant(NewPlant::default()).await.unwrap();
    let father = service.register_plant(NewPlant::default()).await.unwrap();

    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let service = service.clone();
            let cross = NewCross::new(mother.id.clone(), father.id.clone());
            tokio::spawn(async move { service.create_cross(cross).await })
        })
        .collect();

    let mut seqs = Vec::new();
    for task in tasks {
        let record = task.await.unwrap().unwrap();
        assert_eq!(record.cross_id.year, 2025);
        seqs.push(record.cross_id.seq);
    }

    let distinct: HashSet<i64> = seqs.iter().copied().collect();
    assert_eq!(distinct.len(), 64);
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=64).collect::<Vec<i64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_seedlings_share_one_yearly_series() {
    let service = service();
    let cross = cross(&service).await;
    let harvest = service.create_harvest(&cross.id, NewHarvest::default()).await.unwrap();
    let batch_a = service
        .create_seed_batch(&harvest.id, NewSeedBatch::default())
        .await
        .unwrap();
    let batch_b = service
        .create_seed_batch(&harvest.id, NewSeedBatch::default())
        .await
        .unwrap();

    let tasks: Vec<_> = (0..60)
        .map(|i| {
            let service = service.clone();
            let batch_id = if i % 2 == 0 { batch_a.id.clone() } else { batch_b.id.clone() };
            tokio::spawn(async move { service.create_seedling(&batch_id, NewSeedling::default()).await })
        })
        .collect();

    let mut identifiers = HashSet::new();
    for task in tasks {
        let seedling = task.await.unwrap().unwrap();
        assert!(identifiers.insert(seedling.seedling_id.to_string()));
    }
    assert_eq!(identifiers.len(), 60);
    assert!(identifiers.contains("SDL-2025-0001"));
    assert!(identifiers.contains("SDL-2025-0060"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_harvests_number_densely() {
    let service = service();
    let cross = cross(&service).await;

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let service = service.clone();
            let cross_id = cross.id.clone();
            tokio::spawn(async move { service.create_harvest(&cross_id, NewHarvest::default()).await })
        })
        .collect();

    let mut numbers = Vec::new();
    for task in tasks {
        numbers.push(task.await.unwrap().unwrap().harvest_number);
    }
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=50).collect::<Vec<i32>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_explicit_duplicates_admit_exactly_one() {
    let service = service();
    let cross = cross(&service).await;

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let service = service.clone();
            let cross_id = cross.id.clone();
            let harvest = NewHarvest {
                harvest_number: Some(7),
                ..Default::default()
            };
            tokio::spawn(async move { service.create_harvest(&cross_id, harvest).await })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(harvest) => {
                assert_eq!(harvest.harvest_number, 7);
                created += 1;
            }
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::Conflict);
                conflicts += 1;
            }
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 49);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cycle_updates_all_land() {
    let store = Arc::new(MemoryStore::new());
    let config = LineageConfig {
        max_allocation_attempts: 5,
        max_update_attempts: 1000,
    };
    let service = Arc::new(
        LineageService::new(store, &config).with_clock(Arc::new(FixedClock(at(2025, 5, 10)))),
    );
    let plant = service.register_plant(NewPlant::default()).await.unwrap();
    let cycle = service.start_cycle(&plant.id, FloweringPatch::default()).await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let service = service.clone();
            let plant_id = plant.id.clone();
            let cycle_id = cycle.id.clone();
            let patch = FloweringPatch {
                notes: Some(format!("observation {}", i)),
                ..Default::default()
            };
            tokio::spawn(async move { service.update_cycle(&plant_id, &cycle_id, patch).await })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = service.get_cycle(&plant.id, &cycle.id).await.unwrap();
    assert_eq!(stored.version, 16);
}
