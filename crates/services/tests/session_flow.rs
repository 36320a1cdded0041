use chrono::Duration;
use services::{Clock, SessionError, SessionRuntimeService, StartRequest};
use storage::repository::{InMemoryRepository, Storage};
use workout_core::Pointer;
use workout_core::model::{
    DayId, EventId, ExerciseId, ExerciseMeta, ExerciseSlot, GroupKind, ProgressUpdate, RepRange,
    RestOverrides, RestPlan, RoutineDay, RoutineGroup, RoutineId, SessionItemId, SessionStatus,
    SetUpdate,
};
use workout_core::pointer::{next, shape_of};
use workout_core::time::fixed_now;

const OWNER: u64 = 1;
const STRANGER: u64 = 2;

fn superset_day(routine: u64, day: u64) -> RoutineDay {
    RoutineDay {
        routine_id: RoutineId::new(routine),
        day_id: DayId::new(day),
        groups: vec![RoutineGroup {
            kind: GroupKind::Superset2,
            rounds_total: 3,
            rest: RestPlan {
                between_exercises_seconds: 15,
                after_round_seconds: 120,
                after_set_seconds: 90,
            },
            slots: vec![
                ExerciseSlot {
                    exercise_id: ExerciseId::new(10),
                    target_sets_per_round: 1,
                    rep_range: RepRange::new(8, 12).unwrap(),
                    notes: None,
                },
                ExerciseSlot {
                    exercise_id: ExerciseId::new(11),
                    target_sets_per_round: 1,
                    rep_range: RepRange::new(10, 15).unwrap(),
                    notes: None,
                },
            ],
        }],
    }
}

fn setup() -> (SessionRuntimeService, InMemoryRepository) {
    let repo = InMemoryRepository::new();
    repo.seed_day(workout_core::model::UserId::new(OWNER), superset_day(1, 1))
        .unwrap();
    repo.seed_day(workout_core::model::UserId::new(OWNER), superset_day(1, 2))
        .unwrap();
    repo.seed_exercise(ExerciseMeta {
        id: ExerciseId::new(10),
        name: "Bench Press".to_string(),
        description: None,
        media_url: Some("https://cdn.example/bench.mp4".to_string()),
    })
    .unwrap();
    repo.seed_exercise(ExerciseMeta {
        id: ExerciseId::new(11),
        name: "Bent-Over Row".to_string(),
        description: None,
        media_url: None,
    })
    .unwrap();

    let storage = Storage::from_in_memory(repo.clone());
    let service = SessionRuntimeService::from_storage(Clock::fixed(fixed_now()), &storage);
    (service, repo)
}

fn user(id: u64) -> workout_core::model::UserId {
    workout_core::model::UserId::new(id)
}

fn start_request(day: u64) -> StartRequest {
    StartRequest {
        routine_id: RoutineId::new(1),
        day_id: DayId::new(day),
        overrides: RestOverrides::default(),
    }
}

fn done_update(item_id: SessionItemId, set_number: u32) -> SetUpdate {
    SetUpdate {
        item_id,
        set_number,
        weight: Some(60.0),
        reps: Some(10),
        rpe: Some(7.5),
        is_done: true,
    }
}

#[tokio::test]
async fn start_builds_snapshot_and_joins_catalog_metadata() {
    let (service, _repo) = setup();

    let view = service.start(user(OWNER), start_request(1)).await.unwrap();

    assert_eq!(view.session.status, SessionStatus::Active);
    assert_eq!(view.session.pointer, Pointer::origin());
    assert_eq!(view.session.groups.len(), 1);
    let items = &view.session.groups[0].items;
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.sets.len() == 3));

    let names: Vec<&str> = view.exercises.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Bench Press", "Bent-Over Row"]);
}

#[tokio::test]
async fn stranger_cannot_start_someone_elses_routine() {
    let (service, _repo) = setup();

    let err = service
        .start(user(STRANGER), start_request(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Forbidden));
}

#[tokio::test]
async fn assigned_user_can_start() {
    let (service, repo) = setup();
    repo.seed_assignment(user(STRANGER), RoutineId::new(1))
        .unwrap();

    let view = service
        .start(user(STRANGER), start_request(1))
        .await
        .unwrap();
    assert_eq!(view.session.user_id, user(STRANGER));
}

#[tokio::test]
async fn missing_day_is_not_found() {
    let (service, _repo) = setup();

    let err = service
        .start(
            user(OWNER),
            StartRequest {
                routine_id: RoutineId::new(1),
                day_id: DayId::new(99),
                overrides: RestOverrides::default(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound));
}

#[tokio::test]
async fn starting_again_pauses_previous_session_without_finishing_it() {
    let (service, _repo) = setup();

    let first = service.start(user(OWNER), start_request(1)).await.unwrap();
    let second = service.start(user(OWNER), start_request(2)).await.unwrap();
    assert_ne!(first.session.id, second.session.id);

    let active = service.get_active(user(OWNER)).await.unwrap().unwrap();
    assert_eq!(active.session.id, second.session.id);

    // The first session is paused and resumable, not finished or gone.
    let resumed = service
        .resume(user(OWNER), first.session.id)
        .await
        .unwrap();
    assert_eq!(resumed.session.status, SessionStatus::Active);

    let active_now = service
        .patch_progress(
            user(OWNER),
            ProgressUpdate {
                event_id: None,
                current_pointer: Some(Pointer::origin()),
                set_update: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(active_now.session.id, first.session.id);
}

#[tokio::test]
async fn duplicate_event_id_returns_unchanged_state() {
    let (service, _repo) = setup();
    let view = service.start(user(OWNER), start_request(1)).await.unwrap();
    let item_id = view.session.groups[0].items[0].id;

    let event = EventId::generate();
    let update = ProgressUpdate {
        event_id: Some(event),
        current_pointer: None,
        set_update: Some(done_update(item_id, 2)),
    };

    let first = service
        .patch_progress(user(OWNER), update.clone())
        .await
        .unwrap();
    let completed_at = first
        .session
        .find_item(item_id)
        .unwrap()
        .sets
        .iter()
        .find(|s| s.set_number == 2)
        .unwrap()
        .completed_at;
    assert!(completed_at.is_some());

    let second = service.patch_progress(user(OWNER), update).await.unwrap();
    assert_eq!(second.session, first.session);
}

#[tokio::test]
async fn pointer_saves_without_event_id_always_apply() {
    let (service, _repo) = setup();
    let view = service.start(user(OWNER), start_request(1)).await.unwrap();

    let shapes = shape_of(&view.session.groups);
    let advanced = next(view.session.pointer, &shapes).unwrap();

    let save = ProgressUpdate {
        event_id: None,
        current_pointer: Some(advanced),
        set_update: None,
    };
    let once = service
        .patch_progress(user(OWNER), save.clone())
        .await
        .unwrap();
    assert_eq!(once.session.pointer, advanced);

    // Resending the identical save is harmless: last write wins.
    let twice = service.patch_progress(user(OWNER), save).await.unwrap();
    assert_eq!(twice.session.pointer, advanced);
}

#[tokio::test]
async fn set_update_for_foreign_item_is_forbidden() {
    let (service, repo) = setup();
    repo.seed_assignment(user(STRANGER), RoutineId::new(1))
        .unwrap();

    let owner_view = service.start(user(OWNER), start_request(1)).await.unwrap();
    let owner_item = owner_view.session.groups[0].items[0].id;

    service
        .start(user(STRANGER), start_request(1))
        .await
        .unwrap();

    let err = service
        .patch_progress(
            user(STRANGER),
            ProgressUpdate {
                event_id: None,
                current_pointer: None,
                set_update: Some(done_update(owner_item, 1)),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Forbidden));
}

#[tokio::test]
async fn empty_update_is_rejected_before_any_write() {
    let (service, _repo) = setup();
    service.start(user(OWNER), start_request(1)).await.unwrap();

    let err = service
        .patch_progress(
            user(OWNER),
            ProgressUpdate {
                event_id: Some(EventId::generate()),
                current_pointer: None,
                set_update: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
}

#[tokio::test]
async fn patch_without_active_session_is_not_found() {
    let (service, _repo) = setup();

    let err = service
        .patch_progress(
            user(OWNER),
            ProgressUpdate {
                event_id: None,
                current_pointer: Some(Pointer::origin()),
                set_update: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound));
}

#[tokio::test]
async fn finish_is_terminal_and_idempotent() {
    let (service, _repo) = setup();
    let view = service.start(user(OWNER), start_request(1)).await.unwrap();

    let finished = service
        .finish(user(OWNER), view.session.id)
        .await
        .unwrap();
    assert_eq!(finished.session.status, SessionStatus::Finished);
    assert_eq!(finished.session.ended_at, Some(fixed_now()));

    let again = service
        .finish(user(OWNER), view.session.id)
        .await
        .unwrap();
    assert_eq!(again.session, finished.session);

    // No active session remains, so further mutations are NotFound.
    let err = service
        .patch_progress(
            user(OWNER),
            ProgressUpdate {
                event_id: None,
                current_pointer: Some(Pointer::origin()),
                set_update: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound));
}

#[tokio::test]
async fn finish_checks_ownership_and_resume_rejects_finished() {
    let (service, _repo) = setup();
    let view = service.start(user(OWNER), start_request(1)).await.unwrap();

    let err = service
        .finish(user(STRANGER), view.session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Forbidden));

    service
        .finish(user(OWNER), view.session.id)
        .await
        .unwrap();
    let err = service
        .resume(user(OWNER), view.session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
}

#[tokio::test]
async fn full_walk_completes_every_set_exactly_once() {
    let (service, _repo) = setup();
    let view = service.start(user(OWNER), start_request(1)).await.unwrap();
    let shapes = shape_of(&view.session.groups);

    let mut pointer = Some(view.session.pointer);
    let mut latest = view;
    let mut steps = 0_u64;
    while let Some(p) = pointer {
        let item_id = latest.session.groups[p.group_index].items[p.exercise_index].id;
        let set_number = u32::try_from(p.round_index).unwrap() + 1;
        latest = service
            .patch_progress(
                user(OWNER),
                ProgressUpdate {
                    event_id: Some(EventId::generate()),
                    current_pointer: Some(p),
                    set_update: Some(done_update(item_id, set_number)),
                },
            )
            .await
            .unwrap();
        steps += 1;
        pointer = next(p, &shapes);
    }

    assert_eq!(steps, latest.session.total_steps());
    for item in latest.session.groups.iter().flat_map(|g| g.items.iter()) {
        assert!(item.sets.iter().all(|s| s.is_done));
    }

    let finished = service
        .finish(user(OWNER), latest.session.id)
        .await
        .unwrap();
    assert_eq!(finished.session.status, SessionStatus::Finished);
}

#[tokio::test]
async fn elapsed_clock_stamps_ended_at() {
    let repo = InMemoryRepository::new();
    repo.seed_day(user(OWNER), superset_day(1, 1)).unwrap();
    let storage = Storage::from_in_memory(repo);
    let later = fixed_now() + Duration::minutes(45);
    let service = SessionRuntimeService::from_storage(Clock::fixed(later), &storage);

    let view = service.start(user(OWNER), start_request(1)).await.unwrap();
    let finished = service
        .finish(user(OWNER), view.session.id)
        .await
        .unwrap();
    assert_eq!(finished.session.ended_at, Some(later));
}
