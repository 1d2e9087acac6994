//! # Particle Effects
//!
//! A particle effect owns a working particle array that is simulated on a
//! worker task, and a [`ConcurrentParticleData`] the renderer reads from.
//!
//! ## Playback
//!
//! ```text
//! NotPlaying -> Starting -> Playing -> Stopping -> NotPlaying
//! ```
//!
//! `Starting` clears the shared data as soon as no step is in flight.
//! `Playing` emits and simulates. `Stopping` simulates without emitting until
//! every particle has expired. A tick that finds a step still in flight only
//! accumulates its delta time for the next step.

use super::billboard::particle_render_object;
use super::concurrent_data::{ConcurrentParticleData, ParticleDrawData};
use crate::config::{Config, ConfigError};
use crate::foundation::math::{translation_of, Aabb, Colour, Mat4, Sphere, Vec2, Vec3};
use crate::render::{MaterialId, PassCapabilities, RenderCamera, RenderObject};
use crate::tasks::TaskContext;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Golden angle in radians, spreads emission directions evenly around the cone
const GOLDEN_ANGLE: f32 = 2.399_963_1;

/// Whether an effect repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackType {
    /// Emit for one duration, then stop once all particles expire
    Once,
    /// Emit forever
    #[default]
    Looping,
}

/// Where an effect is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Not simulating or drawing
    NotPlaying,
    /// Waiting to reset the shared particle data
    Starting,
    /// Emitting and simulating
    Playing,
    /// Simulating remaining particles without emitting
    Stopping,
}

/// # Particle Effect Description
///
/// Immutable parameters of an effect, loadable from TOML or RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleEffectDesc {
    /// Maximum number of live particles
    pub max_particles: usize,
    /// Length of one emission cycle in seconds
    pub duration: f32,
    /// Particles emitted per second
    pub emission_rate: f32,
    /// Seconds a particle lives
    pub lifetime: f32,
    /// Initial speed along the emission direction
    pub initial_speed: f32,
    /// Initial spin in radians per second
    pub initial_angular_velocity: f32,
    /// Initial billboard size
    pub initial_scale: Vec2,
    /// Initial colour
    pub initial_colour: Colour,
    /// Half angle of the emission cone around the emitter's +Y, in radians
    pub cone_angle: f32,
    /// Fade alpha to zero over the particle lifetime
    pub fade_out: bool,
    /// Once or looping
    pub playback: PlaybackType,
}

impl Default for ParticleEffectDesc {
    fn default() -> Self {
        Self {
            max_particles: 64,
            duration: 1.0,
            emission_rate: 20.0,
            lifetime: 1.0,
            initial_speed: 1.0,
            initial_angular_velocity: 0.0,
            initial_scale: Vec2::repeat(0.25),
            initial_colour: Colour::repeat(1.0),
            cone_angle: 0.5,
            fade_out: true,
            playback: PlaybackType::Looping,
        }
    }
}

impl Config for ParticleEffectDesc {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_particles == 0 {
            return Err(ConfigError::Invalid("Particle effect needs at least one particle".to_string()));
        }
        if !(self.duration > 0.0) {
            return Err(ConfigError::Invalid("Particle effect duration must be positive".to_string()));
        }
        if !(self.lifetime > 0.0) {
            return Err(ConfigError::Invalid("Particle lifetime must be positive".to_string()));
        }
        if self.emission_rate < 0.0 {
            return Err(ConfigError::Invalid("Emission rate cannot be negative".to_string()));
        }
        Ok(())
    }
}

/// Full simulation state of one particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// World position
    pub position: Vec3,
    /// World velocity
    pub velocity: Vec3,
    /// Rotation around the view axis
    pub rotation: f32,
    /// Spin in radians per second
    pub angular_velocity: f32,
    /// Billboard size
    pub scale: Vec2,
    /// Current colour
    pub colour: Colour,
    /// Remaining lifetime in seconds
    pub energy: f32,
    /// Whether the particle is alive
    pub is_active: bool,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            velocity: Vec3::zeros(),
            rotation: 0.0,
            angular_velocity: 0.0,
            scale: Vec2::repeat(1.0),
            colour: Colour::repeat(1.0),
            energy: 0.0,
            is_active: false,
        }
    }
}

impl Particle {
    fn draw_data(&self) -> ParticleDrawData {
        ParticleDrawData {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
            colour: self.colour,
            is_active: self.is_active,
        }
    }
}

/// Working particle array, only touched by the task running a step
#[derive(Debug)]
pub struct ParticleSimulation {
    particles: Vec<Particle>,
    emission_accumulator: f32,
    emitted: u32,
    new_indices: Vec<usize>,
}

impl ParticleSimulation {
    /// Create `max_particles` inactive particles
    pub fn new(max_particles: usize) -> Self {
        Self {
            particles: vec![Particle::default(); max_particles],
            emission_accumulator: 0.0,
            emitted: 0,
            new_indices: Vec::new(),
        }
    }

    /// Particles in slot order
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Deactivate everything and forget pending emission
    pub fn reset(&mut self) {
        for particle in &mut self.particles {
            particle.is_active = false;
            particle.energy = 0.0;
        }
        self.emission_accumulator = 0.0;
        self.new_indices.clear();
    }

    /// Advance by `delta_time`, emitting from `emitter` if given
    ///
    /// Expired particles are deactivated before emission, so their slots can
    /// be reused in the same step.
    pub fn step(&mut self, desc: &ParticleEffectDesc, delta_time: f32, emitter: Option<&Mat4>) {
        for particle in self.particles.iter_mut().filter(|particle| particle.is_active) {
            particle.energy -= delta_time;
            if particle.energy > 0.0 {
                particle.position += particle.velocity * delta_time;
                particle.rotation += particle.angular_velocity * delta_time;
                if desc.fade_out {
                    particle.colour.w = desc.initial_colour.w * (particle.energy / desc.lifetime);
                }
            } else {
                particle.energy = 0.0;
                particle.is_active = false;
            }
        }

        if let Some(world) = emitter {
            self.emit(desc, delta_time, world);
        }
    }

    fn emit(&mut self, desc: &ParticleEffectDesc, delta_time: f32, world: &Mat4) {
        self.emission_accumulator += desc.emission_rate * delta_time;
        let origin = translation_of(world);

        let mut free = self
            .particles
            .iter()
            .enumerate()
            .filter(|(_, particle)| !particle.is_active)
            .map(|(index, _)| index)
            .collect::<Vec<_>>()
            .into_iter();

        while self.emission_accumulator >= 1.0 {
            self.emission_accumulator -= 1.0;
            let Some(index) = free.next() else {
                // Full; drop what could not be emitted this step
                self.emission_accumulator = self.emission_accumulator.fract();
                break;
            };

            let direction = world
                .transform_vector(&cone_direction(self.emitted, desc.cone_angle))
                .try_normalize(f32::EPSILON)
                .unwrap_or_else(Vec3::y);
            self.emitted = self.emitted.wrapping_add(1);

            self.particles[index] = Particle {
                position: origin,
                velocity: direction * desc.initial_speed,
                rotation: 0.0,
                angular_velocity: desc.initial_angular_velocity,
                scale: desc.initial_scale,
                colour: desc.initial_colour,
                energy: desc.lifetime,
                is_active: true,
            };
            self.new_indices.push(index);
        }
    }

    /// Box and sphere around the active particles
    pub fn bounds(&self) -> (Aabb, Sphere) {
        let mut aabb = Aabb::empty();
        for particle in self.particles.iter().filter(|particle| particle.is_active) {
            aabb.grow_by(&particle.position, particle.scale.max() * 0.5);
        }
        (aabb, aabb.bounding_sphere())
    }

    /// Publish the current state, handing over the indices emitted since the
    /// last commit
    pub fn commit(&mut self, data: &ConcurrentParticleData) {
        let draw_data: Vec<ParticleDrawData> = self.particles.iter().map(Particle::draw_data).collect();
        let (aabb, sphere) = self.bounds();
        let new_indices = std::mem::take(&mut self.new_indices);
        data.commit_particle_data(&draw_data, &new_indices, aabb, sphere);
    }
}

/// Unit direction inside a cone around +Y, spread by the golden angle
#[allow(clippy::cast_precision_loss)]
fn cone_direction(sequence: u32, cone_angle: f32) -> Vec3 {
    let azimuth = sequence as f32 * GOLDEN_ANGLE;
    // Cycle the polar angle through the cone so the spread stays even
    let polar = cone_angle * ((sequence % 16) as f32 + 0.5) / 16.0;
    Vec3::new(polar.sin() * azimuth.cos(), polar.cos(), polar.sin() * azimuth.sin())
}

/// A playing particle effect attached to a world transform
pub struct ParticleEffect {
    desc: Arc<ParticleEffectDesc>,
    state: PlaybackState,
    playback_time: f32,
    accumulated_delta_time: f32,
    world: Mat4,
    simulation: Arc<Mutex<ParticleSimulation>>,
    data: Arc<ConcurrentParticleData>,
}

impl ParticleEffect {
    /// Create a stopped effect
    pub fn new(desc: Arc<ParticleEffectDesc>) -> Self {
        let max_particles = desc.max_particles;
        Self {
            desc,
            state: PlaybackState::NotPlaying,
            playback_time: 0.0,
            accumulated_delta_time: 0.0,
            world: Mat4::identity(),
            simulation: Arc::new(Mutex::new(ParticleSimulation::new(max_particles))),
            data: Arc::new(ConcurrentParticleData::new(max_particles)),
        }
    }

    /// Effect parameters
    pub fn desc(&self) -> &ParticleEffectDesc {
        &self.desc
    }

    /// Current playback state
    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    /// Whether the effect is simulating, including while winding down
    pub const fn is_playing(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Starting | PlaybackState::Playing | PlaybackState::Stopping
        )
    }

    /// Whether new particles are still being emitted
    pub const fn is_emitting(&self) -> bool {
        matches!(self.state, PlaybackState::Starting | PlaybackState::Playing)
    }

    /// Shared draw data read by the renderer
    pub fn data(&self) -> &Arc<ConcurrentParticleData> {
        &self.data
    }

    /// Move the emitter
    pub fn set_world(&mut self, world: Mat4) {
        self.world = world;
    }

    /// Start, or restart emission of a stopping effect
    ///
    /// # Panics
    ///
    /// Panics if the effect is already emitting.
    pub fn play(&mut self) {
        assert!(!self.is_emitting(), "particle effect is already playing");
        self.state = match self.state {
            PlaybackState::Stopping => PlaybackState::Playing,
            _ => PlaybackState::Starting,
        };
        self.playback_time = 0.0;
        self.accumulated_delta_time = 0.0;
    }

    /// Stop emitting; live particles keep simulating until they expire
    ///
    /// # Panics
    ///
    /// Panics if the effect is not emitting.
    pub fn stop_emitting(&mut self) {
        assert!(self.is_emitting(), "particle effect is not emitting");
        self.playback_time = self.desc.duration;
        self.state = PlaybackState::Stopping;
        log::trace!("Particle effect stopped emitting");
    }

    /// Stop immediately; nothing more is drawn
    pub fn stop(&mut self) {
        self.state = PlaybackState::NotPlaying;
    }

    /// Billboards for the last committed step, facing `camera`
    ///
    /// `None` while starting or stopped, or when no particle is alive.
    pub fn render_object(
        &self,
        camera: &RenderCamera,
        material: MaterialId,
        capabilities: PassCapabilities,
    ) -> Option<RenderObject> {
        match self.state {
            PlaybackState::Playing | PlaybackState::Stopping => {
                particle_render_object(&self.data, camera, material, capabilities)
            }
            PlaybackState::NotPlaying | PlaybackState::Starting => None,
        }
    }

    /// Advance playback, scheduling a simulation step on `ctx` when none is
    /// in flight
    pub fn update(&mut self, ctx: &dyn TaskContext, delta_time: f32) {
        match self.state {
            PlaybackState::NotPlaying => {}
            PlaybackState::Starting => self.update_starting(ctx, delta_time),
            PlaybackState::Playing => self.update_playing(ctx, delta_time),
            PlaybackState::Stopping => self.update_stopping(ctx, delta_time),
        }
    }

    fn update_starting(&mut self, ctx: &dyn TaskContext, delta_time: f32) {
        if self.data.start_update() {
            let mut simulation = self.simulation.lock();
            simulation.reset();
            simulation.commit(&self.data);
            drop(simulation);

            self.state = PlaybackState::Playing;
            self.update_playing(ctx, delta_time);
        } else {
            self.playback_time += delta_time;
            self.accumulated_delta_time += delta_time;
        }
    }

    fn update_playing(&mut self, ctx: &dyn TaskContext, delta_time: f32) {
        self.playback_time += delta_time;
        let duration = self.desc.duration;

        if self.desc.playback == PlaybackType::Once && self.playback_time >= duration {
            self.stop_emitting();
            self.update_stopping(ctx, delta_time);
            return;
        }
        self.playback_time %= duration;

        self.accumulated_delta_time += delta_time;
        if self.data.start_update() {
            self.schedule_step(ctx, true);
        }
    }

    fn update_stopping(&mut self, ctx: &dyn TaskContext, delta_time: f32) {
        if !self.data.is_updating() && !self.data.has_active_particles() {
            self.stop();
            return;
        }

        self.accumulated_delta_time += delta_time;
        if self.data.start_update() {
            self.schedule_step(ctx, false);
        }
    }

    fn schedule_step(&mut self, ctx: &dyn TaskContext, emitting: bool) {
        let desc = Arc::clone(&self.desc);
        let simulation = Arc::clone(&self.simulation);
        let data = Arc::clone(&self.data);
        let emitter = emitting.then_some(self.world);
        let delta_time = std::mem::take(&mut self.accumulated_delta_time);

        ctx.spawn(Box::new(move |_: &dyn TaskContext| {
            let mut simulation = simulation.lock();
            simulation.step(&desc, delta_time, emitter.as_ref());
            simulation.commit(&data);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;
    use crate::tasks::Task;
    use approx::assert_relative_eq;

    /// Runs spawned tasks immediately on the calling thread
    struct InlineContext;

    impl TaskContext for InlineContext {
        fn process_child_tasks(&self, tasks: Vec<Task>) {
            for task in tasks {
                task(self);
            }
        }

        fn spawn(&self, task: Task) {
            task(self);
        }
    }

    fn desc() -> ParticleEffectDesc {
        ParticleEffectDesc {
            max_particles: 8,
            duration: 1.0,
            emission_rate: 10.0,
            lifetime: 0.5,
            initial_speed: 2.0,
            cone_angle: 0.0,
            ..ParticleEffectDesc::default()
        }
    }

    #[test]
    fn test_step_emits_and_integrates() {
        let desc = desc();
        let mut simulation = ParticleSimulation::new(desc.max_particles);

        simulation.step(&desc, 0.25, Some(&Mat4::identity()));
        let active: Vec<_> = simulation.particles().iter().filter(|p| p.is_active).collect();
        assert_eq!(active.len(), 2);
        assert_relative_eq!(active[0].velocity, Vec3::new(0.0, 2.0, 0.0), epsilon = 1e-5);

        simulation.step(&desc, 0.1, None);
        assert_relative_eq!(simulation.particles()[0].position.y, 0.2, epsilon = 1e-5);
        assert_relative_eq!(simulation.particles()[0].energy, 0.4, epsilon = 1e-5);
    }

    #[test]
    fn test_particles_expire() {
        let desc = desc();
        let mut simulation = ParticleSimulation::new(desc.max_particles);
        simulation.step(&desc, 0.2, Some(&Mat4::identity()));
        assert!(simulation.particles().iter().any(|p| p.is_active));

        simulation.step(&desc, 1.0, None);
        assert!(simulation.particles().iter().all(|p| !p.is_active));
        assert!(simulation.bounds().0.is_empty());
    }

    #[test]
    fn test_emission_stops_at_capacity() {
        let desc = ParticleEffectDesc {
            max_particles: 3,
            emission_rate: 100.0,
            lifetime: 10.0,
            ..desc()
        };
        let mut simulation = ParticleSimulation::new(desc.max_particles);
        simulation.step(&desc, 1.0, Some(&Mat4::identity()));
        assert_eq!(simulation.particles().iter().filter(|p| p.is_active).count(), 3);
    }

    #[test]
    fn test_effect_runs_once_then_stops() {
        let mut effect = ParticleEffect::new(Arc::new(ParticleEffectDesc {
            playback: PlaybackType::Once,
            ..desc()
        }));
        effect.play();
        assert_eq!(effect.state(), PlaybackState::Starting);

        effect.update(&InlineContext, 0.3);
        assert_eq!(effect.state(), PlaybackState::Playing);
        assert!(effect.data().has_active_particles());
        let mut guard = effect.data().lock();
        assert!(!guard.take_new_indices().is_empty());
        drop(guard);

        for _ in 0..4 {
            effect.update(&InlineContext, 0.3);
        }
        assert_eq!(effect.state(), PlaybackState::Stopping);

        for _ in 0..4 {
            effect.update(&InlineContext, 0.3);
        }
        assert_eq!(effect.state(), PlaybackState::NotPlaying);
        assert!(!effect.data().has_active_particles());
    }

    #[test]
    fn test_render_object_only_while_playing() {
        let mut effect = ParticleEffect::new(Arc::new(desc()));
        let camera = RenderCamera::default();
        let object = |effect: &ParticleEffect| {
            effect.render_object(&camera, MaterialId(1), PassCapabilities::TRANSPARENT)
        };
        assert!(object(&effect).is_none());

        effect.play();
        effect.update(&InlineContext, 0.3);
        let drawn = object(&effect).unwrap();
        let mesh = drawn.kind().dynamic_mesh().unwrap();
        assert!(mesh.vertex_count() > 0);
        assert_eq!(mesh.vertex_count() % 4, 0);

        effect.stop();
        assert!(object(&effect).is_none());
    }

    #[test]
    fn test_looping_effect_keeps_pending_indices_bounded() {
        let desc = Arc::new(ParticleEffectDesc {
            max_particles: 64,
            emission_rate: 60.0,
            lifetime: 0.5,
            playback: PlaybackType::Looping,
            ..desc()
        });
        let camera = RenderCamera::default();

        let mut drawn = ParticleEffect::new(Arc::clone(&desc));
        let mut undrawn = ParticleEffect::new(desc);
        drawn.play();
        undrawn.play();

        for _ in 0..10_000 {
            drawn.update(&InlineContext, 1.0 / 60.0);
            undrawn.update(&InlineContext, 1.0 / 60.0);
            let _ = drawn.render_object(&camera, MaterialId(1), PassCapabilities::TRANSPARENT);
        }

        let mut guard = drawn.data().lock();
        assert!(guard.take_new_indices().is_empty());
        drop(guard);

        let mut guard = undrawn.data().lock();
        assert!(guard.take_new_indices().len() <= 64);
    }

    #[test]
    fn test_desc_loads_from_ron() {
        let text = "(max_particles: 16, emission_rate: 4.0, playback: Once)";
        let desc = ParticleEffectDesc::from_str_with(text, ConfigFormat::Ron).unwrap();
        assert_eq!(desc.max_particles, 16);
        assert_eq!(desc.playback, PlaybackType::Once);
        assert_relative_eq!(desc.duration, 1.0);

        let invalid = ParticleEffectDesc {
            duration: 0.0,
            ..ParticleEffectDesc::default()
        };
        assert!(invalid.validate().is_err());
    }
}
