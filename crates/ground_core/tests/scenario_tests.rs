//! End-to-end locomotion scenarios on a live simulation.

use ground_core::commands::CommandQueue;
use ground_core::events::Event;
use ground_core::features::Feature;
use ground_core::locomotion::ProgressState;
use ground_core::math::{Fixed, Vec3Fixed};
use ground_core::move_def::MoveDef;
use ground_core::path::waypoint_pending;
use ground_core::simulation::{Simulation, UnitSpawnParams};
use ground_core::unit::{PhysicalState, UnitId};
use ground_test_utils::fixtures::{self, ScriptedPlanner, WorldFixture};

fn big_flat_sim() -> Simulation {
    fixtures::flat_sim(160, 7)
}

fn run_until_done(sim: &mut Simulation, id: UnitId, max_ticks: u32) -> u32 {
    for tick in 0..max_ticks {
        if sim.mover(id).unwrap().progress_state() == ProgressState::Done {
            return tick;
        }
        sim.tick();
    }
    max_ticks
}

#[test]
fn test_single_unit_reaches_goal_on_empty_map() {
    let mut sim = big_flat_sim();
    let id = fixtures::spawn_tank(&mut sim, 1000, 1000);

    sim.order_move(id, Vec3Fixed::from_ints(1100, 0, 1000), Fixed::from_num(8))
        .unwrap();
    assert_eq!(
        sim.mover(id).unwrap().progress_state(),
        ProgressState::Active
    );

    let ticks = run_until_done(&mut sim, id, 300);
    assert!(ticks < 300, "unit did not arrive");

    let pos = sim.unit(id).unwrap().pos;
    assert!(
        pos.x >= Fixed::from_num(1092) && pos.x <= Fixed::from_num(1108),
        "arrived at x = {}",
        pos.x
    );
}

#[test]
fn test_arrival_is_idempotent() {
    let mut sim = big_flat_sim();
    let id = fixtures::spawn_tank(&mut sim, 1000, 1000);

    sim.order_move(id, Vec3Fixed::from_ints(1100, 0, 1000), Fixed::from_num(8))
        .unwrap();
    run_until_done(&mut sim, id, 300);

    // let residual speed decay, then the position must freeze
    let mut failures = 0;
    for _ in 0..20 {
        for event in sim.tick() {
            if matches!(event, Event::UnitMoveFailed { .. }) {
                failures += 1;
            }
        }
    }
    let settled = sim.unit(id).unwrap().pos;

    for _ in 0..40 {
        for event in sim.tick() {
            if matches!(event, Event::UnitMoveFailed { .. }) {
                failures += 1;
            }
        }
    }

    // only the decaying drag residue may still creep
    let drift = sim.unit(id).unwrap().pos.distance2d(settled);
    assert!(drift < Fixed::from_num(2), "post-arrival drift = {drift}");
    assert_eq!(failures, 0);
    assert_eq!(sim.mover(id).unwrap().progress_state(), ProgressState::Done);
}

#[test]
fn test_sentinel_waypoints_hold_the_unit_still() {
    let mut fx = WorldFixture::flat(160);
    let (mut unit, mut mover) = WorldFixture::standalone_tank(1000, 1000);

    // five-plus ticks of unresolved waypoints, then the real ones
    let mut responses = vec![ScriptedPlanner::pending_at(1100, 1000); 12];
    responses.push(Vec3Fixed::from_ints(1060, 0, 1000));
    responses.push(Vec3Fixed::from_ints(1100, 0, 1000));
    let mut planner = ScriptedPlanner::new(responses);

    {
        let mut world = fx.view(&mut planner);
        mover.start_moving(
            &mut unit,
            &mut world,
            Vec3Fixed::from_ints(1100, 0, 1000),
            Fixed::from_num(8),
        );
    }
    let (cwp, nwp) = mover.waypoints();
    assert!(waypoint_pending(cwp) && waypoint_pending(nwp));

    for _ in 0..5 {
        fx.advance();
        let mut world = fx.view(&mut planner);
        mover.update(&mut unit, &mut world);

        assert_eq!(mover.current_speed(), Fixed::ZERO);
        assert!(!mover.is_idling(), "sentinel ticks must not count as idling");
    }

    for _ in 0..20 {
        fx.advance();
        let mut world = fx.view(&mut planner);
        mover.update(&mut unit, &mut world);
    }
    assert!(
        mover.current_speed() > Fixed::ZERO,
        "unit never ramped up after the path resolved"
    );
}

#[test]
fn test_shared_goal_pair_both_settle() {
    let mut sim = big_flat_sim();
    let a = fixtures::spawn_tank(&mut sim, 1000, 1000);
    let b = fixtures::spawn_tank(&mut sim, 1010, 1000);
    let goal = Vec3Fixed::from_ints(1100, 0, 1000);

    sim.start_moving(a, goal, Fixed::from_num(8)).unwrap();
    sim.start_moving(b, goal, Fixed::from_num(8)).unwrap();

    for _ in 0..400 {
        sim.tick();
        // stand in for the command AI: consume whatever the movers queued
        for id in [a, b] {
            if let Some(unit) = sim.unit_mut(id) {
                unit.commands = CommandQueue::new();
            }
        }
        let a_done = sim.mover(a).unwrap().progress_state() == ProgressState::Done;
        let b_done = sim.mover(b).unwrap().progress_state() == ProgressState::Done;
        if a_done && b_done {
            break;
        }
    }

    for id in [a, b] {
        let state = sim.mover(id).unwrap().progress_state();
        assert_eq!(state, ProgressState::Done, "unit {id} ended in {state:?}");
        let dist = sim.unit(id).unwrap().pos.distance2d(goal);
        assert!(
            dist < Fixed::from_num(40),
            "unit {id} settled {dist} away from the goal"
        );
    }
}

#[test]
fn test_head_on_pair_passes_without_skidding() {
    let mut sim = big_flat_sim();
    let a = fixtures::spawn_tank(&mut sim, 800, 1000);
    let b = fixtures::spawn_tank(&mut sim, 1200, 1008);

    sim.order_move(a, Vec3Fixed::from_ints(1200, 0, 1000), Fixed::from_num(8))
        .unwrap();
    sim.order_move(b, Vec3Fixed::from_ints(800, 0, 1008), Fixed::from_num(8))
        .unwrap();

    for _ in 0..600 {
        sim.tick();
        assert!(!sim.mover(a).unwrap().is_skidding());
        assert!(!sim.mover(b).unwrap().is_skidding());
    }

    let ax = sim.unit(a).unwrap().pos.x;
    let bx = sim.unit(b).unwrap().pos.x;
    assert!(ax > Fixed::from_num(900), "a stalled at x = {ax}");
    assert!(bx < Fixed::from_num(1100), "b stalled at x = {bx}");
}

#[test]
fn test_heavy_tank_crushes_wreck() {
    let mut sim = big_flat_sim();
    let id = sim.spawn_unit(UnitSpawnParams {
        pos: Vec3Fixed::from_ints(400, 0, 400),
        data: fixtures::tank_data(),
        move_def: Some(MoveDef::new(
            ground_core::move_def::MoveFamily::Tank,
            2,
            2,
        )),
        mass: Fixed::from_num(1000),
        ..Default::default()
    });

    let wreck = sim.spawn_feature(Feature::new(
        Vec3Fixed::from_ints(440, 0, 400),
        2,
        2,
        Fixed::from_num(10),
    ));

    sim.order_move(id, Vec3Fixed::from_ints(500, 0, 400), Fixed::from_num(8))
        .unwrap();

    let mut destroyed = false;
    for _ in 0..300 {
        for event in sim.tick() {
            if matches!(event, Event::RenderFeatureDestroyed { feature, .. } if feature == wreck) {
                destroyed = true;
            }
        }
        if sim.mover(id).unwrap().progress_state() == ProgressState::Done {
            break;
        }
    }

    assert!(destroyed, "the wreck was never crushed");
    assert!(sim.feature(wreck).is_none());
    assert_eq!(sim.mover(id).unwrap().progress_state(), ProgressState::Done);
}

#[test]
fn test_impulse_skid_round_trip() {
    let mut sim = big_flat_sim();
    let id = fixtures::spawn_tank(&mut sim, 1000, 1000);

    let before = sim.unit(id).unwrap().physical_state;
    assert_eq!(before, PhysicalState::OnGround);

    let entered = sim
        .apply_impulse(id, Vec3Fixed::from_ints(4, 0, 0))
        .unwrap();
    assert!(entered);
    assert!(sim.mover(id).unwrap().is_skidding());
    assert!(!sim.unit(id).unwrap().use_heading);

    for _ in 0..30 {
        sim.tick();
        if !sim.mover(id).unwrap().is_skidding() {
            break;
        }
    }

    assert!(!sim.mover(id).unwrap().is_skidding());
    assert!(sim.unit(id).unwrap().use_heading);
    assert_eq!(sim.unit(id).unwrap().physical_state, before);
    // the shove displaced the unit along the impulse
    assert!(sim.unit(id).unwrap().pos.x > Fixed::from_num(1000));
}

#[test]
fn test_small_impulses_accumulate_before_skidding() {
    let mut sim = big_flat_sim();
    let id = fixtures::spawn_tank(&mut sim, 1000, 1000);

    // each charge alone is below the threshold
    assert!(!sim
        .apply_impulse(id, Vec3Fixed::from_ints(2, 0, 0))
        .unwrap());
    assert!(!sim.mover(id).unwrap().is_skidding());

    assert!(sim
        .apply_impulse(id, Vec3Fixed::from_ints(2, 0, 0))
        .unwrap());
    assert!(sim.mover(id).unwrap().is_skidding());
}

#[test]
fn test_done_unit_holds_no_path_and_no_wanted_speed() {
    let mut sim = big_flat_sim();
    let id = fixtures::spawn_tank(&mut sim, 1000, 1000);

    sim.order_move(id, Vec3Fixed::from_ints(1080, 0, 1000), Fixed::from_num(8))
        .unwrap();
    run_until_done(&mut sim, id, 300);

    let mover = sim.mover(id).unwrap();
    assert_eq!(mover.path_id(), 0);
    assert_eq!(mover.wanted_speed(), Fixed::ZERO);
}

#[test]
fn test_speed_stays_within_bounds_while_driving() {
    let mut sim = big_flat_sim();
    let id = fixtures::spawn_tank(&mut sim, 1000, 1000);
    let max = sim.unit(id).unwrap().data.max_speed;

    sim.order_move(id, Vec3Fixed::from_ints(1200, 0, 1100), Fixed::from_num(8))
        .unwrap();
    for _ in 0..200 {
        sim.tick();
        let speed = sim.mover(id).unwrap().current_speed();
        assert!(speed >= Fixed::ZERO);
        assert!(speed <= max + Fixed::from_num(0.01), "speed = {speed}");
    }
}
