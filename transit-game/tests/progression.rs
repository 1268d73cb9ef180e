use transit_game::{
    Catalog, EngineConfig, MemoryStore, PreviewBoard, PreviewContext, ResearchEngine, RunStatus,
    SaveDoc, StartError, StartOutcome, Status, TransportId, preview_context, start_transport_unlock,
    transport_infos,
};

const T0: i64 = 1_755_000_000_000;

fn guest_engine() -> ResearchEngine<MemoryStore> {
    let mut engine = ResearchEngine::new(
        Catalog::builtin(),
        EngineConfig::default(),
        MemoryStore::new(),
    );
    engine.set_clock_offset(0);
    engine
}

fn complete_active(engine: &mut ResearchEngine<MemoryStore>) -> i64 {
    let ends = engine.active().expect("an active task").ends_at_ms;
    engine.tick(ends);
    ends
}

#[test]
fn full_progression_exercises_core_systems() {
    let mut engine = guest_engine();

    // Fresh state: everything gated behind the first-unlock choice.
    assert!(engine.needs_first_unlock_selection());
    assert_eq!(engine.first_unlock_candidates(), TransportId::ALL.to_vec());
    assert_eq!(
        engine.start_research("unlock_bus_t1", T0),
        Err(StartError::FirstUnlockRequired)
    );

    engine.set_first_unlock_transport(TransportId::Truck);
    assert!(engine.completed().contains("unlock_truck_t1"));
    assert_eq!(engine.derived().unlocked_tier(TransportId::Truck), 1);
    assert!(!transport_infos(&engine)[1].locked); // truck row

    // Research the bus unlock the slow way.
    assert_eq!(
        engine.start_research("unlock_bus_t1", T0),
        Ok(StartOutcome::Started)
    );
    assert_eq!(engine.status("unlock_bus_t1"), Status::Active);
    let halfway = T0 + 1_800_000;
    assert!((engine.progress("unlock_bus_t1", halfway) - 50.0).abs() < 1e-9);
    assert_eq!(engine.remaining_time("unlock_bus_t1", halfway), "30m 00s");

    let out = engine.tick(T0 + 3_600_000);
    assert_eq!(out.completed.as_deref(), Some("unlock_bus_t1"));
    assert_eq!(engine.status("unlock_bus_t1"), Status::Done);
    assert_eq!(engine.derived().unlocked_tier(TransportId::Bus), 1);

    // Preview research opens now that a starter transport is unlocked.
    assert_eq!(
        engine.status("sys_preview_starter_vehicles"),
        Status::Available
    );
    engine
        .start_research("sys_preview_starter_vehicles", T0 + 3_600_000)
        .unwrap();
    complete_active(&mut engine);
    assert!(engine.derived().preview_unlocked);

    // Drive the preview board from the derived context.
    let ctx = preview_context(&engine);
    assert!(!ctx.auto_unlocked);
    assert_eq!(ctx.active.len(), 2); // bus + truck unlocked, rail still locked

    let mut board = PreviewBoard::with_seed(0xC0FFEE);
    let mut now = T0 + 10_000_000;
    assert!(board.tick(now, &ctx));
    assert_eq!(board.run_list(&ctx).len(), 2);
    assert_eq!(board.status_of(TransportId::Bus, &ctx), RunStatus::Running);

    // Let the bus run finish: manual mode parks it at ready.
    let bus_end = board.run_list(&ctx)[0].ends_at_ms.unwrap();
    board.tick(bus_end, &ctx);
    assert_eq!(board.status_of(TransportId::Bus, &ctx), RunStatus::Ready);
    assert!(board.start_manual_run(TransportId::Bus, bus_end + 1_000, &ctx));

    // Automation research flips the board to self-chaining runs.
    now = bus_end + 2_000;
    engine.start_research("sys_preview_auto_assign", now).unwrap();
    complete_active(&mut engine);
    let ctx = preview_context(&engine);
    assert!(ctx.auto_unlocked);
    assert!(!board.start_manual_run(TransportId::Bus, now, &ctx));
    let bus_end = {
        board.tick(now, &ctx);
        board
            .run_list(&ctx)
            .iter()
            .find(|r| r.transport_id == TransportId::Bus)
            .unwrap()
            .ends_at_ms
            .unwrap()
    };
    board.tick(bus_end, &ctx);
    assert_eq!(board.status_of(TransportId::Bus, &ctx), RunStatus::Running);

    // Efficiency chain shortens later research.
    engine.start_research("rs_1", bus_end).unwrap();
    complete_active(&mut engine);
    assert_eq!(engine.derived().research_speed_level, 1);
    engine.start_research("rs_2", bus_end).unwrap();
    let active = engine.active().unwrap();
    // 2h at multiplier 0.95.
    assert_eq!(active.ends_at_ms - active.started_at_ms, 6_840_000);
}

#[test]
fn queueing_respects_the_reserve_limit() {
    let mut engine = guest_engine();
    engine.set_first_unlock_transport(TransportId::Bus);

    engine.start_research("unlock_truck_t1", T0).unwrap();
    assert_eq!(engine.queue_limit(), 1);
    assert_eq!(
        engine.start_research("unlock_rail_t1", T0),
        Ok(StartOutcome::Queued {
            already_queued: false
        })
    );
    assert!(engine.is_queue_full());
    assert_eq!(
        engine.start_research("rs_1", T0),
        Err(StartError::QueueFull)
    );
    assert_eq!(StartError::QueueFull.code(), "QUEUE_FULL");

    let out = engine.tick(T0 + 3_600_000);
    assert_eq!(out.completed.as_deref(), Some("unlock_truck_t1"));
    assert_eq!(out.promoted.as_deref(), Some("unlock_rail_t1"));
    assert!(engine.queue().is_empty());

    engine.cancel_all_queued();
    assert!(engine.queue().is_empty());
}

#[test]
fn signed_in_session_persists_through_the_store() {
    let mut engine = guest_engine();
    engine.store_mut().set_timestamp_ms(T0);

    engine.subscribe_for_user("user-1", "Prod", 0);
    assert_eq!(engine.current_world(), "prod");
    assert!(engine.is_hydrated());

    // First sign-in initializes an empty document.
    assert_eq!(engine.store().save_count(), 1);
    let doc = engine.store().doc("user-1", "prod").unwrap();
    assert_eq!(doc.last_save_reason.as_deref(), Some("init"));
    assert_eq!(doc.updated_at_ms, Some(T0));

    engine.set_first_unlock_transport(TransportId::Rail);
    let doc = engine.store().doc("user-1", "prod").unwrap();
    assert_eq!(doc.last_save_reason.as_deref(), Some("firstUnlock"));
    assert_eq!(doc.first_unlock_transport_id.as_deref(), Some("rail"));
    assert_eq!(doc.completed_research_ids, ["unlock_rail_t1"]);

    engine.start_research("rs_1", T0).unwrap();
    let doc = engine.store().doc("user-1", "prod").unwrap();
    assert_eq!(doc.last_save_reason.as_deref(), Some("startResearch"));
    assert_eq!(doc.active_research.as_ref().unwrap().id, "rs_1");

    engine.tick(T0 + 3_600_000);
    let doc = engine.store().doc("user-1", "prod").unwrap().clone();
    assert_eq!(doc.last_save_reason.as_deref(), Some("researchComplete"));
    assert!(doc.completed_research_ids.contains(&"rs_1".to_string()));
    assert!(doc.active_research.is_none());

    // A new session for the same user restores the state from the store.
    let mut fresh = ResearchEngine::new(
        Catalog::builtin(),
        EngineConfig::default(),
        MemoryStore::new(),
    );
    fresh.set_clock_offset(0);
    fresh.apply_remote(&doc, 0);
    assert_eq!(fresh.first_unlock_transport(), Some(TransportId::Rail));
    assert!(fresh.completed().contains("rs_1"));
    assert_eq!(fresh.derived().research_speed_level, 1);
}

#[test]
fn unsubscribe_keeps_state_but_stops_saving() {
    let mut engine = guest_engine();
    engine.subscribe_for_user("user-2", "prod", 0);
    engine.set_first_unlock_transport(TransportId::Bus);
    let saves_before = engine.store().save_count();

    engine.unsubscribe();
    assert!(engine.current_uid().is_none());
    // Progression survives sign-out...
    assert!(engine.completed().contains("unlock_bus_t1"));
    // ...but nothing commits anymore.
    engine.start_research("rs_1", T0).unwrap();
    engine.save_now(transit_game::SaveReason::Manual);
    assert_eq!(engine.store().save_count(), saves_before);

    engine.clear_user_state();
    assert!(engine.completed().is_empty());
}

#[test]
fn debounced_saves_coalesce_into_one_commit() {
    let mut engine = guest_engine();
    engine.subscribe_for_user("user-3", "prod", 0);
    let base = engine.store().save_count();

    engine.schedule_save(T0);
    engine.schedule_save(T0 + 300);
    engine.tick(T0 + 500);
    assert_eq!(engine.store().save_count(), base);

    engine.tick(T0 + 300 + 800);
    assert_eq!(engine.store().save_count(), base + 1);
    let doc = engine.store().doc("user-3", "prod").unwrap();
    assert_eq!(doc.last_save_reason.as_deref(), Some("debounced"));

    // Disabling background saves cancels a pending debounce.
    engine.schedule_save(T0 + 2_000);
    engine.set_save_enabled(false, T0 + 2_000);
    engine.tick(T0 + 10_000);
    assert_eq!(engine.store().save_count(), base + 1);
}

#[test]
fn autosave_fires_on_kst_boundaries_and_rearms() {
    let mut engine = guest_engine();
    // Epoch is 09:00 KST, so boundaries land every interval from 0.
    engine.subscribe_for_user("user-4", "prod", 0);
    engine.set_autosave_enabled(true, 0);
    assert!(engine.is_autosave_running());
    assert_eq!(engine.autosave_settings().interval_min(), 10);

    let base = engine.store().save_count();
    let boundary = 10 * 60 * 1000;
    assert!(!engine.tick(boundary - 1).autosaved);
    let out = engine.tick(boundary);
    assert!(out.autosaved);
    assert_eq!(engine.store().save_count(), base + 1);
    assert_eq!(
        engine
            .store()
            .doc("user-4", "prod")
            .unwrap()
            .last_save_reason
            .as_deref(),
        Some("autosave")
    );

    // Re-armed for the next boundary.
    assert!(engine.is_autosave_running());
    assert!(engine.tick(2 * boundary).autosaved);

    engine.set_autosave_enabled(false, 2 * boundary);
    assert!(!engine.is_autosave_running());
    assert!(!engine.tick(3 * boundary).autosaved);
}

#[test]
fn hydration_never_echoes_back_to_the_store() {
    let mut engine = guest_engine();
    engine.subscribe_for_user("user-5", "prod", 0);
    let base = engine.store().save_count();

    let mut doc = SaveDoc::new();
    doc.first_unlock_transport_id = Some("bus".to_string());
    doc.completed_research_ids = vec!["unlock_bus_t1".to_string(), "rs_1".to_string()];
    engine.apply_remote(&doc, 0);

    assert_eq!(engine.store().save_count(), base);
    assert_eq!(engine.first_unlock_transport(), Some(TransportId::Bus));
    assert_eq!(engine.derived().research_speed_level, 1);
}

#[test]
fn stale_hard_locked_work_is_evicted_after_hydration() {
    let mut engine = guest_engine();
    engine.subscribe_for_user("user-6", "prod", 0);

    let mut doc = SaveDoc::new();
    doc.first_unlock_transport_id = Some("bus".to_string());
    doc.completed_research_ids = vec!["unlock_bus_t1".to_string()];
    doc.queued_research_ids = vec!["sys_unlock_city".to_string(), "rs_1".to_string()];
    engine.apply_remote(&doc, 0);
    assert_eq!(engine.queue().len(), 1); // reserve level 1 truncates first

    let mut doc = SaveDoc::new();
    doc.queued_research_ids = vec!["sys_unlock_vehicle".to_string()];
    engine.apply_remote(&doc, 0);
    assert_eq!(engine.queue(), ["sys_unlock_vehicle".to_string()]);

    engine.tick(T0);
    assert!(engine.queue().is_empty());
    let stored = engine.store().doc("user-6", "prod").unwrap();
    assert_eq!(stored.last_save_reason.as_deref(), Some("hardLockCleanup"));
}

#[test]
fn legacy_documents_migrate_into_the_world_partition() {
    let mut engine = guest_engine();
    let mut legacy = SaveDoc::default();
    legacy.version = 7;
    legacy.first_unlock_transport_id = Some("truck".to_string());
    legacy.queued_research_id = Some("rs_1".to_string());
    legacy.transports = serde_json::from_str(
        r#"[{"id":"truck","locked":false},{"id":"bus","locked":true}]"#,
    )
    .unwrap();
    engine.store_mut().seed_legacy("user-7", legacy);

    engine.subscribe_for_user("user-7", "prod", 0);
    assert!(engine.is_hydrated());
    assert_eq!(engine.first_unlock_transport(), Some(TransportId::Truck));
    // transports[] back-fills the tier-1 completion.
    assert!(engine.completed().contains("unlock_truck_t1"));
    assert!(!engine.completed().contains("unlock_bus_t1"));
    // Single-slot legacy queue merges into the list.
    assert_eq!(engine.queue(), ["rs_1".to_string()]);

    let migrated = engine.store().doc("user-7", "prod").unwrap();
    assert_eq!(migrated.last_save_reason.as_deref(), Some("migrateLegacy"));
}

#[test]
fn local_mode_never_touches_the_store() {
    let mut engine = ResearchEngine::new(
        Catalog::builtin(),
        EngineConfig {
            remote_enabled: false,
            force_duration_sec: Some(300),
            ..EngineConfig::default()
        },
        MemoryStore::new(),
    );
    engine.set_clock_offset(0);

    engine.subscribe_for_user("tester", "test", 0);
    assert!(engine.is_hydrated());
    assert_eq!(engine.store().save_count(), 0);

    engine.set_first_unlock_transport(TransportId::Bus);
    assert_eq!(
        start_transport_unlock(&mut engine, TransportId::Rail, T0),
        Ok(StartOutcome::Started)
    );
    // Forced five-minute research on the test channel.
    let active = engine.active().unwrap();
    assert_eq!(active.ends_at_ms - active.started_at_ms, 300_000);
    engine.tick(active.ends_at_ms);
    assert_eq!(engine.store().save_count(), 0);
}

#[test]
fn preview_context_and_board_stay_consistent_across_eligibility_changes() {
    let mut engine = guest_engine();
    engine.set_first_unlock_transport(TransportId::Bus);
    engine.start_research("sys_preview_starter_vehicles", T0).unwrap();
    engine.tick(engine.active().unwrap().ends_at_ms);

    let ctx = preview_context(&engine);
    let mut board = PreviewBoard::with_seed(99);
    board.tick(T0, &ctx);
    assert_eq!(board.run_list(&ctx).len(), 1);

    // Unlocking rail makes a second transport preview-active; the next tick
    // spawns its first run without disturbing the bus run.
    engine.start_research("unlock_rail_t1", T0).unwrap();
    engine.tick(engine.active().unwrap().ends_at_ms);
    let ctx = preview_context(&engine);
    assert_eq!(ctx.active.len(), 2);
    board.tick(T0 + 1_000, &ctx);
    assert_eq!(board.run_list(&ctx).len(), 2);

    // A context with preview locked freezes the board entirely.
    assert!(!board.tick(T0 + 2_000, &PreviewContext::locked()));
}
