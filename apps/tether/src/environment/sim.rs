//! In-process stand-in for a real game client, used by the demo binary and
//! the test suites.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use tether_proto::SubCommand;

use super::{ActionExecutor, EnvironmentClock, Rejection, SnapshotProducer};

pub const HOTBAR_SLOTS: u8 = 9;

const RAY_COUNT: usize = 8;
const RAY_MAX_DIST: f64 = 6.0;
const AIRBORNE_TICKS: u32 = 6;
const MOVE_STEP: f64 = 0.2;

pub struct SimEnvironment {
    tick: u64,
    x: f64,
    y: f64,
    z: f64,
    yaw: f32,
    pitch: f32,
    grounded: bool,
    airborne_left: u32,
    sneaking: bool,
    selected_slot: u8,
    rng: StdRng,
}

impl SimEnvironment {
    pub fn new() -> Self {
        Self {
            tick: 0,
            x: 0.0,
            y: 64.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            grounded: true,
            airborne_left: 0,
            sneaking: false,
            selected_slot: 0,
            rng: StdRng::seed_from_u64(0x7e7),
        }
    }

    /// Advances the world one tick.
    pub fn advance(&mut self) {
        self.tick += 1;
        if !self.grounded {
            self.airborne_left = self.airborne_left.saturating_sub(1);
            if self.airborne_left == 0 {
                self.grounded = true;
            }
        }
    }

    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    pub fn set_grounded(&mut self, grounded: bool) {
        self.grounded = grounded;
        self.airborne_left = if grounded { 0 } else { AIRBORNE_TICKS };
    }

    pub fn selected_slot(&self) -> u8 {
        self.selected_slot
    }

    pub fn position(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }
}

impl Default for SimEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotProducer for SimEnvironment {
    fn capture(&mut self) -> Value {
        let rays: Vec<Value> = (0..RAY_COUNT)
            .map(|_| {
                let dist: f64 = self.rng.gen_range(1.0..RAY_MAX_DIST);
                json!({ "hit": dist < RAY_MAX_DIST - 0.5, "dist": dist })
            })
            .collect();
        let front_clear = rays
            .first()
            .and_then(|ray| ray.get("hit"))
            .and_then(Value::as_bool)
            .map(|hit| !hit)
            .unwrap_or(true);
        let hotbar: Vec<Value> = (0..HOTBAR_SLOTS)
            .map(|_| json!({ "id": "air", "count": 0 }))
            .collect();

        json!({
            "pose": {
                "x": self.x,
                "y": self.y,
                "z": self.z,
                "yaw": self.yaw,
                "pitch": self.pitch,
            },
            "rays": rays,
            "front_clear": front_clear,
            "entities": [],
            "world": {
                "time_of_day": self.tick % 24_000,
                "weather": "clear",
                "biome": "plains",
            },
            "inventory": {
                "selected_slot": self.selected_slot,
                "hotbar": hotbar,
            },
            "collision": {
                "is_grounded": self.grounded,
                "is_colliding": false,
                "no_progress": false,
            },
        })
    }
}

impl ActionExecutor for SimEnvironment {
    fn apply(&mut self, command: &SubCommand) -> Result<(), Rejection> {
        match command {
            SubCommand::Look(look) => {
                self.yaw = (self.yaw + look.d_yaw).rem_euclid(360.0);
                self.pitch = (self.pitch + look.d_pitch).clamp(-90.0, 90.0);
                Ok(())
            }
            SubCommand::Move(movement) => {
                let forward = f64::from(movement.forward.clamp(-1.0, 1.0));
                let strafe = f64::from(movement.strafe.clamp(-1.0, 1.0));
                let yaw = f64::from(self.yaw).to_radians();
                self.x += (-yaw.sin() * forward + yaw.cos() * strafe) * MOVE_STEP;
                self.z += (yaw.cos() * forward + yaw.sin() * strafe) * MOVE_STEP;
                Ok(())
            }
            SubCommand::Jump => {
                if !self.grounded {
                    return Err(Rejection::new("not_grounded"));
                }
                self.grounded = false;
                self.airborne_left = AIRBORNE_TICKS;
                Ok(())
            }
            SubCommand::Sneak => {
                self.sneaking = !self.sneaking;
                Ok(())
            }
            SubCommand::SelectSlot(slot) => {
                if *slot >= HOTBAR_SLOTS {
                    return Err(Rejection::new("invalid_slot"));
                }
                self.selected_slot = *slot;
                Ok(())
            }
            SubCommand::Attack | SubCommand::Use | SubCommand::Place => Ok(()),
        }
    }
}

impl EnvironmentClock for SimEnvironment {
    fn now_tick(&self) -> u64 {
        self.tick
    }
}
