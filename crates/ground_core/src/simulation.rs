//! The tick driver.
//!
//! [`Simulation`] owns every process-wide service the movers consult — the
//! terrain, blocking map, spatial index, planner, RNG, and event bus — and
//! advances all units in ascending-id order each tick. Determinism rules:
//! fixed-point math only, sorted iteration, seeded RNG, and a state hash for
//! desync detection.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::blocking::{BlockFlags, BlockingMap};
use crate::commands::Command;
use crate::config::ModInfo;
use crate::error::{GroundError, Result};
use crate::events::{Event, EventBus, EventListener, Explosion};
use crate::features::{Feature, FeatureArena, FeatureId};
use crate::locomotion::{GroundMover, WorldView, SLOWUPDATE_RATE};
use crate::map::HeightMap;
use crate::math::{Fixed, Vec3Fixed};
use crate::move_def::MoveDef;
use crate::path::{GridPlanner, PathPlanner};
use crate::rng::SyncedRng;
use crate::spatial::SpatialGrid;
use crate::unit::{FpsControl, MainWeapon, Unit, UnitArena, UnitData, UnitId};

/// Parameters for spawning a unit.
#[derive(Debug, Clone)]
pub struct UnitSpawnParams {
    /// Spawn position; the height is snapped to the terrain contract.
    pub pos: Vec3Fixed,
    /// Kinematic profile.
    pub data: UnitData,
    /// Movement profile; `None` spawns an immobile object.
    pub move_def: Option<MoveDef>,
    /// Alliance group.
    pub ally_team: u8,
    /// Mass.
    pub mass: Fixed,
    /// Hit points.
    pub health: Fixed,
    /// Immobile structure.
    pub is_structure: bool,
    /// Structure with an openable yard.
    pub is_factory: bool,
    /// Primary weapon for in-place aiming.
    pub weapon: Option<MainWeapon>,
}

impl Default for UnitSpawnParams {
    fn default() -> Self {
        Self {
            pos: Vec3Fixed::ZERO,
            data: UnitData::default(),
            move_def: None,
            ally_team: 0,
            mass: Fixed::from_num(100),
            health: Fixed::from_num(100),
            is_structure: false,
            is_factory: false,
            weapon: None,
        }
    }
}

/// The locomotion simulation.
#[derive(Serialize, Deserialize)]
pub struct Simulation {
    frame: u64,
    map: HeightMap,
    units: UnitArena,
    movers: Vec<Option<GroundMover>>,
    features: FeatureArena,
    blocking: BlockingMap,
    spatial: SpatialGrid,
    planner: GridPlanner,
    rng: SyncedRng,
    mod_info: ModInfo,
    pending_events: Vec<Event>,
    #[serde(skip)]
    bus: EventBus,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("frame", &self.frame)
            .field("units", &self.units.len())
            .field("listeners", &self.bus.listener_count())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Create a simulation over a map with the given rules and RNG seed.
    #[must_use]
    pub fn new(map: HeightMap, mod_info: ModInfo, seed: u64) -> Self {
        let blocking = BlockingMap::new(&map);
        let spatial = SpatialGrid::new(&map);
        Self {
            frame: 0,
            map,
            units: UnitArena::new(),
            movers: Vec::new(),
            features: FeatureArena::new(),
            blocking,
            spatial,
            planner: GridPlanner::new(),
            rng: SyncedRng::new(seed),
            mod_info,
            pending_events: Vec::new(),
            bus: EventBus::new(),
        }
    }

    /// Current tick number.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// The terrain.
    #[must_use]
    pub fn map(&self) -> &HeightMap {
        &self.map
    }

    /// Game-rule switches.
    #[must_use]
    pub fn mod_info(&self) -> &ModInfo {
        &self.mod_info
    }

    /// A unit by id.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id)
    }

    /// Mutable unit access for the embedding layer.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(id)
    }

    /// A unit's locomotion state by id.
    #[must_use]
    pub fn mover(&self, id: UnitId) -> Option<&GroundMover> {
        self.movers.get(id as usize).and_then(Option::as_ref)
    }

    /// A feature by id.
    #[must_use]
    pub fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    /// Number of live units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Register an event listener (e.g. a tree view).
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.bus.add_listener(listener);
    }

    /// Offer an explosion to listeners; true suppresses default graphics.
    pub fn notify_explosion(&mut self, explosion: &Explosion) -> bool {
        self.bus.fire_explosion(explosion)
    }

    // ------------------------------------------------------------------
    // spawning
    // ------------------------------------------------------------------

    fn spawn_height(&self, params: &UnitSpawnParams) -> Fixed {
        let terrain = self.map.height_real(params.pos.x, params.pos.z);
        if params.data.float_on_water {
            terrain.max(-params.data.waterline)
        } else {
            terrain
        }
    }

    /// Spawn a unit; mobile units get a ground mover.
    pub fn spawn_unit(&mut self, params: UnitSpawnParams) -> UnitId {
        let height = self.spawn_height(&params);
        let mut unit = Unit::new(params.pos.with_y(height), params.data, params.move_def);
        unit.ally_team = params.ally_team;
        unit.mass = params.mass;
        unit.health = params.health;
        unit.is_structure = params.is_structure;
        unit.is_factory = params.is_factory;
        unit.weapon = params.weapon;
        unit.update_dir_vectors(!unit.data.upright, &self.map);

        let mobile = unit.move_def.is_some();
        let id = self.units.insert(unit);

        let unit = self.units.get(id).expect("just inserted");
        let mover = mobile.then(|| GroundMover::new(unit));
        self.movers.push(mover);

        self.reblock_unit(id);
        id
    }

    /// Spawn a feature.
    pub fn spawn_feature(&mut self, mut feature: Feature) -> FeatureId {
        feature.pos.y = self.map.height_real(feature.pos.x, feature.pos.z);
        let id = self.features.insert(feature);

        let f = self.features.get(id).expect("just inserted");
        if f.blocking {
            let (pos, xs, zs) = (f.pos, f.xsize, f.zsize);
            let (crushable, resistance) = (f.crushable, f.crush_resistance);
            self.blocking.block(
                crate::blocking::ObjectId::Feature(id),
                BlockFlags::STRUCTURE.union(BlockFlags::STATIC),
                pos,
                xs,
                zs,
                crushable,
                resistance,
            );
        }
        id
    }

    fn reblock_unit(&mut self, id: UnitId) {
        let Some(unit) = self.units.get(id) else { return };
        if !unit.blocking {
            return;
        }

        let flags = if unit.is_structure && !unit.yard_open {
            BlockFlags::STRUCTURE.union(BlockFlags::STATIC)
        } else if unit.move_def.is_some() {
            BlockFlags::MOVING
        } else {
            BlockFlags::STATIC
        };

        let (fx, fz) = unit.footprint();
        let (pos, oid) = (unit.pos, unit.object_id());
        let (crushable, resistance) = (unit.data.crushable, unit.data.crush_resistance);
        self.blocking
            .block(oid, flags, pos, fx, fz, crushable, resistance);
    }

    /// Open or close a factory yard, letting traffic through while open.
    pub fn set_yard_open(&mut self, id: UnitId, open: bool) -> Result<()> {
        let unit = self
            .units
            .get_mut(id)
            .ok_or(GroundError::UnitNotFound(id))?;
        unit.yard_open = open;
        self.reblock_unit(id);
        Ok(())
    }

    /// Remove a unit, releasing its path handle and footprint.
    pub fn destroy_unit(&mut self, id: UnitId) -> Result<()> {
        let unit = self.units.remove(id).ok_or(GroundError::UnitNotFound(id))?;
        self.blocking.unblock(unit.object_id());

        if let Some(slot) = self.movers.get_mut(id as usize) {
            if let Some(mover) = slot.take() {
                if mover.path_id() != 0 {
                    self.planner.delete_path(mover.path_id());
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // mover operations
    // ------------------------------------------------------------------

    fn with_mover<R>(
        &mut self,
        id: UnitId,
        f: impl FnOnce(&mut GroundMover, &mut Unit, &mut WorldView) -> R,
    ) -> Result<R> {
        let Some(mover_slot) = self.movers.get_mut(id as usize) else {
            return Err(GroundError::UnitNotFound(id));
        };
        let Some(mut mover) = mover_slot.take() else {
            return Err(GroundError::NotAMover(id));
        };
        let Some(mut unit) = self.units.take(id) else {
            self.movers[id as usize] = Some(mover);
            return Err(GroundError::UnitNotFound(id));
        };

        let result = {
            let mut world = WorldView {
                frame: self.frame,
                map: &self.map,
                blocking: &mut self.blocking,
                spatial: &self.spatial,
                planner: &mut self.planner,
                units: &mut self.units,
                features: &mut self.features,
                movers: &mut self.movers,
                events: &mut self.pending_events,
                rng: &mut self.rng,
                mod_info: &self.mod_info,
            };
            f(&mut mover, &mut unit, &mut world)
        };

        self.units.put_back(id, unit);
        self.movers[id as usize] = Some(mover);
        Ok(result)
    }

    /// Order a move: queues the move command pair and starts the engine.
    pub fn order_move(&mut self, id: UnitId, goal: Vec3Fixed, radius: Fixed) -> Result<()> {
        self.with_mover(id, |mover, unit, world| {
            unit.commands.give(Command::Move(goal));
            unit.commands
                .give(Command::SetWantedMaxSpeed(unit.data.max_speed));
            mover.start_moving(unit, world, goal, radius);
        })
    }

    /// Start moving without touching the command queue.
    pub fn start_moving(&mut self, id: UnitId, goal: Vec3Fixed, radius: Fixed) -> Result<()> {
        self.with_mover(id, |mover, unit, world| {
            mover.start_moving(unit, world, goal, radius);
        })
    }

    /// Abandon the current move.
    pub fn stop_moving(&mut self, id: UnitId) -> Result<()> {
        self.with_mover(id, |mover, unit, world| {
            mover.stop_moving(unit, world);
        })
    }

    /// Apply an external impulse; true when it knocked the unit into a skid.
    pub fn apply_impulse(&mut self, id: UnitId, impulse: Vec3Fixed) -> Result<bool> {
        self.with_mover(id, |mover, unit, world| {
            unit.residual_impulse += impulse;
            if mover.can_apply_impulse(unit, world, impulse) {
                let residual = unit.residual_impulse;
                unit.speed += residual;
                unit.residual_impulse = Vec3Fixed::ZERO;
                true
            } else {
                false
            }
        })
    }

    /// Ask a unit to keep its main weapon pointed at a position.
    pub fn keep_pointing_to(&mut self, id: UnitId, pos: Vec3Fixed, aggressive: bool) -> Result<()> {
        self.with_mover(id, |mover, unit, _world| {
            mover.keep_pointing_to(unit, pos, aggressive);
        })
    }

    /// Install or clear first-person control for a unit.
    pub fn set_fps_control(&mut self, id: UnitId, control: Option<FpsControl>) -> Result<()> {
        let unit = self
            .units
            .get_mut(id)
            .ok_or(GroundError::UnitNotFound(id))?;
        unit.fps_control = control;
        Ok(())
    }

    /// Nudge a freshly unloaded unit clear of the ground.
    pub fn leave_transport(&mut self, id: UnitId) -> Result<()> {
        self.with_mover(id, |mover, unit, _world| {
            mover.leave_transport(unit);
        })
    }

    // ------------------------------------------------------------------
    // the tick
    // ------------------------------------------------------------------

    /// Advance one tick; returns the events emitted during it.
    pub fn tick(&mut self) -> Vec<Event> {
        for id in self.features.ids() {
            if let Some(f) = self.features.get_mut(id) {
                f.is_moving = false;
            }
        }
        self.spatial.rebuild(&self.units, &self.features);

        let slow_tick = self.frame % SLOWUPDATE_RATE == 0;

        for id in self.units.ids() {
            let has_mover = self
                .movers
                .get(id as usize)
                .is_some_and(Option::is_some);
            if !has_mover {
                continue;
            }

            let _ = self.with_mover(id, |mover, unit, world| {
                let moved = mover.update(unit, world);
                if slow_tick {
                    mover.slow_update(unit, world);
                }
                if moved {
                    world.events.push(Event::UnitMoved { unit: unit.id });
                }
            });
        }

        self.remove_dead();

        self.frame += 1;

        let events = std::mem::take(&mut self.pending_events);
        self.bus.deliver(&events);

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.frame, state_hash = hash, "simulation state hash");
        }

        events
    }

    fn remove_dead(&mut self) {
        for id in self.units.ids() {
            let dead = self.units.get(id).is_some_and(|u| u.dead);
            if dead {
                let _ = self.destroy_unit(id);
            }
        }

        for id in self.features.ids() {
            let dead = self.features.get(id).is_some_and(|f| f.dead);
            if dead {
                if let Some(f) = self.features.remove(id) {
                    self.blocking.unblock(f.object_id());
                    self.pending_events.push(Event::RenderFeatureDestroyed {
                        feature: id,
                        pos: f.pos,
                        speed: f.speed,
                        draw_type: f.draw_type,
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // state sync
    // ------------------------------------------------------------------

    /// Hash of the synced state, for desync detection.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.frame.hash(&mut hasher);
        self.rng.draw_count().hash(&mut hasher);

        let ids = self.units.ids();
        ids.len().hash(&mut hasher);

        for id in ids {
            let Some(unit) = self.units.get(id) else { continue };
            id.hash(&mut hasher);
            unit.pos.x.to_bits().hash(&mut hasher);
            unit.pos.y.to_bits().hash(&mut hasher);
            unit.pos.z.to_bits().hash(&mut hasher);
            unit.speed.x.to_bits().hash(&mut hasher);
            unit.speed.y.to_bits().hash(&mut hasher);
            unit.speed.z.to_bits().hash(&mut hasher);
            unit.heading.hash(&mut hasher);

            if let Some(mover) = self.mover(id) {
                mover.current_speed().to_bits().hash(&mut hasher);
                (mover.progress_state() as u8).hash(&mut hasher);
                mover.path_id().hash(&mut hasher);
            }
        }

        hasher.finish()
    }

    /// Serialize the synced state.
    ///
    /// # Errors
    ///
    /// Returns [`GroundError::StateSync`] when encoding fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| GroundError::StateSync(e.to_string()))
    }

    /// Restore from serialized state; movers holding a path handle request
    /// a fresh one, since handles do not survive the trip for an external
    /// planner.
    ///
    /// # Errors
    ///
    /// Returns [`GroundError::StateSync`] when decoding fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut sim: Self =
            bincode::deserialize(data).map_err(|e| GroundError::StateSync(e.to_string()))?;
        sim.restore_paths();
        Ok(sim)
    }

    fn restore_paths(&mut self) {
        for id in self.units.ids() {
            let holds_path = self
                .mover(id)
                .is_some_and(|m| m.path_id() != 0);
            if holds_path {
                let _ = self.with_mover(id, |mover, unit, world| {
                    mover.post_load(unit, world);
                });
            }
        }
    }
}
