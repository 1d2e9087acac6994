//! # Particles
//!
//! Particle effects simulated on worker tasks and drawn as camera-facing
//! billboards. The simulation never blocks the renderer: it commits whole
//! steps into [`ConcurrentParticleData`], which the renderer locks briefly
//! to build a dynamic mesh.

pub mod billboard;
pub mod concurrent_data;
pub mod effect;

pub use billboard::{build_billboards, particle_render_object, MAX_BILLBOARD_PARTICLES};
pub use concurrent_data::{ConcurrentParticleData, ParticleDataGuard, ParticleDrawData};
pub use effect::{
    Particle, ParticleEffect, ParticleEffectDesc, ParticleSimulation, PlaybackState, PlaybackType,
};
