//! Particle draw data shared between the simulation task and the renderer

use crate::foundation::math::{Aabb, Colour, Sphere, Vec2, Vec3};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

/// What the renderer needs to know about one particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleDrawData {
    /// World position
    pub position: Vec3,
    /// Rotation around the view axis, in radians
    pub rotation: f32,
    /// Billboard width and height
    pub scale: Vec2,
    /// RGBA colour
    pub colour: Colour,
    /// Inactive particles are not drawn
    pub is_active: bool,
}

impl Default for ParticleDrawData {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: 0.0,
            scale: Vec2::repeat(1.0),
            colour: Colour::repeat(1.0),
            is_active: false,
        }
    }
}

#[derive(Debug)]
struct SharedParticles {
    particles: Vec<ParticleDrawData>,
    aabb: Aabb,
    bounding_sphere: Sphere,
    new_indices: Vec<usize>,
}

/// Double-buffered particle state
///
/// The simulation works on its own copy and commits it here in one step;
/// the renderer only ever sees whole commits. One mutex guards the shared
/// copy. The `updating` flag keeps a second simulation step from starting
/// before the previous one committed, and is only set while the mutex is
/// held.
#[derive(Debug)]
pub struct ConcurrentParticleData {
    shared: Mutex<SharedParticles>,
    updating: AtomicBool,
}

impl ConcurrentParticleData {
    /// Create storage for `max_particles`, all inactive
    pub fn new(max_particles: usize) -> Self {
        Self {
            shared: Mutex::new(SharedParticles {
                particles: vec![ParticleDrawData::default(); max_particles],
                aabb: Aabb::empty(),
                bounding_sphere: Sphere::default(),
                new_indices: Vec::new(),
            }),
            updating: AtomicBool::new(false),
        }
    }

    /// Number of particle slots
    pub fn capacity(&self) -> usize {
        self.shared.lock().particles.len()
    }

    /// Claim the right to run a simulation step
    ///
    /// Returns false if a step is already in flight; the caller should skip
    /// this tick and accumulate its delta time.
    pub fn start_update(&self) -> bool {
        let _shared = self.shared.lock();
        !self.updating.swap(true, Ordering::AcqRel)
    }

    /// Whether a simulation step is in flight
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Publish the result of a simulation step and release the update claim
    ///
    /// New indices accumulate until a reader takes them, so none are lost
    /// when several steps commit between two reads. A slot is listed at most
    /// once, which keeps the pending list within the particle capacity.
    ///
    /// # Panics
    ///
    /// Panics if no update was started, if `particles` does not cover every
    /// slot, or if a new index is out of range.
    pub fn commit_particle_data(
        &self,
        particles: &[ParticleDrawData],
        new_indices: &[usize],
        aabb: Aabb,
        bounding_sphere: Sphere,
    ) {
        let mut shared = self.shared.lock();
        assert!(self.is_updating(), "particle data committed without start_update");
        assert_eq!(
            particles.len(),
            shared.particles.len(),
            "committed particle count does not match capacity"
        );
        assert!(
            new_indices.iter().all(|&index| index < particles.len()),
            "new particle index out of range"
        );

        shared.particles.copy_from_slice(particles);
        shared.aabb = aabb;
        shared.bounding_sphere = bounding_sphere;
        shared.new_indices.extend_from_slice(new_indices);
        shared.new_indices.sort_unstable();
        shared.new_indices.dedup();
        self.updating.store(false, Ordering::Release);
    }

    /// Lock the shared copy for reading
    ///
    /// Simulation commits wait until the guard is dropped.
    pub fn lock(&self) -> ParticleDataGuard<'_> {
        ParticleDataGuard {
            shared: self.shared.lock(),
        }
    }

    /// Release a guard obtained from [`Self::lock`]
    pub fn unlock(&self, guard: ParticleDataGuard<'_>) {
        drop(guard);
    }

    /// Whether the last commit left any particle alive
    pub fn has_active_particles(&self) -> bool {
        self.lock().has_active_particles()
    }
}

/// Proof that the shared particle data is locked
pub struct ParticleDataGuard<'a> {
    shared: MutexGuard<'a, SharedParticles>,
}

impl ParticleDataGuard<'_> {
    /// Particles as of the last commit
    pub fn particles(&self) -> &[ParticleDrawData] {
        &self.shared.particles
    }

    /// World-space box around the active particles
    pub fn aabb(&self) -> Aabb {
        self.shared.aabb
    }

    /// World-space sphere around the active particles
    pub fn bounding_sphere(&self) -> Sphere {
        self.shared.bounding_sphere
    }

    /// Indices of particles activated since the last call, in slot order
    pub fn take_new_indices(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.shared.new_indices)
    }

    /// Whether any particle is active
    pub fn has_active_particles(&self) -> bool {
        self.shared.particles.iter().any(|particle| particle.is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_start_update_claims_once() {
        let data = ConcurrentParticleData::new(4);
        assert!(data.start_update());
        assert!(!data.start_update());

        data.commit_particle_data(&[ParticleDrawData::default(); 4], &[], Aabb::empty(), Sphere::default());
        assert!(data.start_update());
    }

    #[test]
    #[should_panic(expected = "without start_update")]
    fn test_commit_requires_claim() {
        let data = ConcurrentParticleData::new(1);
        data.commit_particle_data(&[ParticleDrawData::default()], &[], Aabb::empty(), Sphere::default());
    }

    #[test]
    fn test_new_indices_accumulate_until_taken() {
        let data = ConcurrentParticleData::new(3);
        let particles = [ParticleDrawData::default(); 3];

        assert!(data.start_update());
        data.commit_particle_data(&particles, &[0], Aabb::empty(), Sphere::default());
        assert!(data.start_update());
        data.commit_particle_data(&particles, &[2], Aabb::empty(), Sphere::default());

        let mut guard = data.lock();
        assert_eq!(guard.take_new_indices(), vec![0, 2]);
        assert!(guard.take_new_indices().is_empty());
        data.unlock(guard);
    }

    #[test]
    fn test_unread_new_indices_stay_within_capacity() {
        let data = ConcurrentParticleData::new(4);
        let particles = [ParticleDrawData::default(); 4];

        for step in 0..1000 {
            assert!(data.start_update());
            data.commit_particle_data(&particles, &[step % 4, (step + 1) % 4], Aabb::empty(), Sphere::default());
        }

        let mut guard = data.lock();
        assert_eq!(guard.take_new_indices(), vec![0, 1, 2, 3]);
        data.unlock(guard);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_commit_rejects_out_of_range_index() {
        let data = ConcurrentParticleData::new(2);
        assert!(data.start_update());
        data.commit_particle_data(&[ParticleDrawData::default(); 2], &[2], Aabb::empty(), Sphere::default());
    }

    #[test]
    fn test_readers_never_see_torn_commits() {
        const PARTICLES: usize = 64;
        const COMMITS: u16 = 500;

        let data = Arc::new(ConcurrentParticleData::new(PARTICLES));

        let writer = {
            let data = Arc::clone(&data);
            thread::spawn(move || {
                let mut committed = 0;
                while committed < COMMITS {
                    if !data.start_update() {
                        thread::yield_now();
                        continue;
                    }
                    committed += 1;
                    let value = f32::from(committed);
                    let particles = [ParticleDrawData {
                        position: Vec3::repeat(value),
                        is_active: true,
                        ..ParticleDrawData::default()
                    }; PARTICLES];
                    let mut aabb = Aabb::empty();
                    aabb.grow(&Vec3::repeat(value));
                    data.commit_particle_data(&particles, &[], aabb, aabb.bounding_sphere());
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let data = Arc::clone(&data);
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let guard = data.lock();
                        let first = guard.particles()[0].position;
                        assert!(guard.particles().iter().all(|p| p.position == first));
                        if guard.has_active_particles() {
                            assert_eq!(guard.aabb().min, first);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(!data.is_updating());
    }
}
