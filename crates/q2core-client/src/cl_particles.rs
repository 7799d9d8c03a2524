// cl_particles.rs: the client-owned particle pool and the generic effects

use std::collections::VecDeque;

use q2core_common::q_shared::{Particle, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

pub const MAX_PARTICLES: usize = 4096;
pub const PARTICLE_GRAVITY: f32 = 40.0;
/// Alpha velocity marking a particle that is drawn for exactly one frame.
pub const INSTANT_PARTICLE: f32 = -10000.0;

/// Below this many live particles the integration runs on one thread.
const PARALLEL_MIN_LEN: usize = 256;

/// One pooled particle. Position is integrated from the spawn state on
/// every pass, so nothing here changes after spawn except on recycling.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CParticle {
    /// Spawn time in milliseconds.
    pub time: f32,
    pub color: i32,
    pub org: Vec3,
    pub vel: Vec3,
    pub accel: Vec3,
    pub alpha: f32,
    pub alphavel: f32,
}

/// Fixed-capacity particle arena. Free slots sit on a stack, live slots in
/// an ordered list with the most recently spawned first.
pub struct ParticleSystem {
    slots: Vec<CParticle>,
    free: Vec<usize>,
    active: VecDeque<usize>,
    rng: StdRng,
}

impl Default for ParticleSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleSystem {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A pool whose effects are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut ps = Self {
            slots: vec![CParticle::default(); MAX_PARTICLES],
            free: Vec::with_capacity(MAX_PARTICLES),
            active: VecDeque::with_capacity(MAX_PARTICLES),
            rng,
        };
        ps.clear_particles();
        ps
    }

    /// Returns every slot to the free stack.
    pub fn clear_particles(&mut self) {
        self.active.clear();
        self.free.clear();
        // slot 0 is handed out first
        self.free.extend((0..MAX_PARTICLES).rev());
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Live particles, most recently spawned first.
    pub fn active(&self) -> impl Iterator<Item = &CParticle> {
        self.active.iter().map(|&i| &self.slots[i])
    }

    /// Takes a free slot and makes it the newest live particle. `None`
    /// when the pool is exhausted; callers just spawn fewer particles.
    pub fn acquire(&mut self, time: f32, alpha: f32, alphavel: f32) -> Option<&mut CParticle> {
        let Some(index) = self.free.pop() else {
            tracing::trace!(target: "particles", "particle pool exhausted");
            return None;
        };
        self.active.push_front(index);

        let p = &mut self.slots[index];
        *p = CParticle {
            time,
            alpha,
            alphavel,
            ..CParticle::default()
        };
        Some(p)
    }

    /// Spawns up to `count` particles around `org`, pushed out along `dir`
    /// by a random distance masked with `dirspread`. With more than one
    /// colour the palette index gets a random offset masked with
    /// `numcolors`.
    pub fn generic_particle_effect(
        &mut self,
        time: f32,
        org: &Vec3,
        dir: &Vec3,
        color: i32,
        count: usize,
        numcolors: i32,
        dirspread: i32,
        alphavel: f32,
        gravity: f32,
    ) {
        for _ in 0..count {
            let fade = -1.0 / (0.5 + self.rng.gen::<f32>() * alphavel);
            let color = if numcolors > 1 {
                color + (self.rng.gen::<i32>() & numcolors)
            } else {
                color
            };
            let d = (self.rng.gen::<i32>() & dirspread) as f32;

            let mut spawn_org = [0.0f32; 3];
            let mut vel = [0.0f32; 3];
            for j in 0..3 {
                spawn_org[j] = org[j] + ((self.rng.gen::<i32>() & 7) - 4) as f32 + d * dir[j];
                vel[j] = self.rng.gen_range(-1.0f32..1.0) * 20.0;
            }

            let Some(p) = self.acquire(time, 1.0, fade) else {
                return;
            };
            p.color = color;
            p.org = spawn_org;
            p.vel = vel;
            p.accel = [0.0, 0.0, gravity];
        }
    }

    /// Wall impact puffs.
    pub fn particle_effect(&mut self, time: f32, org: &Vec3, dir: &Vec3, color: i32, count: usize) {
        self.generic_particle_effect(time, org, dir, color, count, 7, 31, 0.3, -PARTICLE_GRAVITY + 0.2);
    }

    pub fn particle_effect2(&mut self, time: f32, org: &Vec3, dir: &Vec3, color: i32, count: usize) {
        self.generic_particle_effect(time, org, dir, color, count, 7, 7, 0.3, -PARTICLE_GRAVITY);
    }

    /// Like `particle_effect2` with a single colour, rising.
    pub fn particle_effect3(&mut self, time: f32, org: &Vec3, dir: &Vec3, color: i32, count: usize) {
        self.generic_particle_effect(time, org, dir, color, count, 0, 7, 0.3, PARTICLE_GRAVITY);
    }

    /// Integrates every live particle to `now` (milliseconds) and appends
    /// the visible ones to `out` in list order. Faded particles go back to
    /// the free stack in the same pass. Instant particles are emitted once
    /// and then zeroed so the next pass recycles them.
    ///
    /// Position is `org + vel*t + accel*t*t`. Effect tuning depends on the
    /// acceleration term carrying no one-half factor.
    pub fn add_particles(&mut self, now: f32, out: &mut Vec<Particle>) {
        let slots = &self.slots;
        let results: Vec<(usize, Option<Particle>)> = self
            .active
            .make_contiguous()
            .par_iter()
            .with_min_len(PARALLEL_MIN_LEN)
            .map(|&index| {
                let p = &slots[index];
                let (time, alpha) = if p.alphavel != INSTANT_PARTICLE {
                    let t = (now - p.time) * 0.001;
                    (t, p.alpha + t * p.alphavel)
                } else {
                    (0.0, p.alpha)
                };

                if alpha <= 0.0 {
                    return (index, None); // faded out
                }

                let time2 = time * time;
                let origin = [
                    p.org[0] + p.vel[0] * time + p.accel[0] * time2,
                    p.org[1] + p.vel[1] * time + p.accel[1] * time2,
                    p.org[2] + p.vel[2] * time + p.accel[2] * time2,
                ];
                let alpha = alpha.min(1.0);
                (
                    index,
                    Some(Particle {
                        origin,
                        color: p.color,
                        alpha,
                    }),
                )
            })
            .collect();

        let mut active = VecDeque::with_capacity(results.len());
        for (index, result) in results {
            let Some(particle) = result else {
                self.free.push(index);
                continue;
            };
            out.push(particle);
            active.push_back(index);

            let p = &mut self.slots[index];
            if p.alphavel == INSTANT_PARTICLE {
                p.alphavel = 0.0;
                p.alpha = 0.0;
            }
        }
        self.active = active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::init_tracing;

    fn assert_near(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-3, "{} != {}", a, b);
    }

    #[test]
    fn test_pool_exhaustion() {
        init_tracing();
        let mut ps = ParticleSystem::with_seed(1);
        for _ in 0..MAX_PARTICLES {
            assert!(ps.acquire(0.0, 1.0, -1.0).is_some());
        }
        assert!(ps.acquire(0.0, 1.0, -1.0).is_none());
        assert_eq!(ps.active_count(), MAX_PARTICLES);

        ps.clear_particles();
        assert_eq!(ps.active_count(), 0);
        assert!(ps.acquire(0.0, 1.0, -1.0).is_some());
    }

    #[test]
    fn test_faded_slot_is_reused_next() {
        let mut ps = ParticleSystem::with_seed(1);
        for _ in 0..MAX_PARTICLES - 1 {
            ps.acquire(0.0, 1.0, 0.0);
        }
        // the last free slot fades out after one second
        if let Some(p) = ps.acquire(0.0, 1.0, -1.0) {
            p.color = 99;
        }
        assert!(ps.acquire(0.0, 1.0, 0.0).is_none());

        let mut out = Vec::new();
        ps.add_particles(1000.0, &mut out);
        assert_eq!(out.len(), MAX_PARTICLES - 1);
        assert!(out.iter().all(|p| p.color != 99));

        let p = ps.acquire(1000.0, 1.0, 0.0).unwrap();
        assert_eq!(p.color, 0);
        assert!(ps.acquire(1000.0, 1.0, 0.0).is_none());
    }

    #[test]
    fn test_integration_has_no_half_factor() {
        let mut ps = ParticleSystem::with_seed(1);
        let p = ps.acquire(1000.0, 1.0, 0.0).unwrap();
        p.org = [1.0, 2.0, 3.0];
        p.vel = [10.0, 0.0, 0.0];
        p.accel = [0.0, 0.0, -40.0];
        p.color = 0xe0;

        let mut out = Vec::new();
        ps.add_particles(3000.0, &mut out);
        // t = 2: org + vel*2 + accel*4
        assert_eq!(out.len(), 1);
        assert_near(out[0].origin[0], 21.0);
        assert_near(out[0].origin[1], 2.0);
        assert_near(out[0].origin[2], 3.0 - 160.0);
        assert_eq!(out[0].color, 0xe0);
    }

    #[test]
    fn test_alpha_fades_and_clamps() {
        let mut ps = ParticleSystem::with_seed(1);
        ps.acquire(0.0, 1.0, -0.5);
        ps.acquire(0.0, 3.0, -0.5);

        let mut out = Vec::new();
        ps.add_particles(1000.0, &mut out);
        // newest first
        assert_eq!(out[0].alpha, 1.0);
        assert_near(out[1].alpha, 0.5);

        out.clear();
        ps.add_particles(2000.0, &mut out);
        // the first particle reached zero and was released
        assert_eq!(out.len(), 1);
        assert_eq!(ps.active_count(), 1);
    }

    #[test]
    fn test_instant_particle_renders_once() {
        let mut ps = ParticleSystem::with_seed(1);
        let p = ps.acquire(0.0, 0.7, INSTANT_PARTICLE).unwrap();
        p.vel = [100.0, 0.0, 0.0];

        let mut out = Vec::new();
        ps.add_particles(5000.0, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].alpha, 0.7);
        // time is pinned at zero
        assert_eq!(out[0].origin, [0.0; 3]);
        assert_eq!(ps.active().next().map(|p| (p.alpha, p.alphavel)), Some((0.0, 0.0)));

        out.clear();
        ps.add_particles(5000.0, &mut out);
        assert!(out.is_empty());
        assert_eq!(ps.active_count(), 0);
    }

    #[test]
    fn test_effect_colours_spread_and_gravity() {
        let mut ps = ParticleSystem::with_seed(7);
        let org = [100.0, 0.0, 0.0];
        let dir = [0.0, 0.0, 1.0];
        ps.particle_effect(0.0, &org, &dir, 0xe0, 50);
        assert_eq!(ps.active_count(), 50);
        for p in ps.active() {
            assert!((0xe0..=0xe7).contains(&p.color));
            assert_eq!(p.accel, [0.0, 0.0, -PARTICLE_GRAVITY + 0.2]);
            assert!(p.org[0] >= 96.0 && p.org[0] <= 103.0);
            // pushed along dir by at most 31
            assert!(p.org[2] >= -4.0 && p.org[2] <= 34.0);
            assert!(p.vel.iter().all(|v| v.abs() <= 20.0));
            assert_eq!(p.alpha, 1.0);
            // fades out within 0.5 to 0.8 seconds
            assert!(p.alphavel <= -1.0 / 0.8 && p.alphavel >= -2.0);
        }

        ps.clear_particles();
        ps.particle_effect3(0.0, &org, &dir, 0x40, 20);
        for p in ps.active() {
            assert_eq!(p.color, 0x40);
            assert_eq!(p.accel[2], PARTICLE_GRAVITY);
            assert!(p.org[2] >= -4.0 && p.org[2] <= 10.0);
        }

        ps.clear_particles();
        ps.particle_effect2(0.0, &org, &dir, 0x40, 20);
        assert!(ps.active().all(|p| (0x40..=0x47).contains(&p.color) && p.accel[2] == -PARTICLE_GRAVITY));
    }

    #[test]
    fn test_effect_truncates_when_full() {
        let mut ps = ParticleSystem::with_seed(3);
        ps.particle_effect(0.0, &[0.0; 3], &[0.0; 3], 0, MAX_PARTICLES + 100);
        assert_eq!(ps.active_count(), MAX_PARTICLES);
    }

    #[test]
    fn test_large_set_keeps_list_order() {
        let mut ps = ParticleSystem::with_seed(1);
        for i in 0..1000 {
            let p = ps.acquire(0.0, 1.0, 0.0).unwrap();
            p.color = i;
        }
        let mut out = Vec::new();
        ps.add_particles(0.0, &mut out);
        let colors: Vec<i32> = out.iter().map(|p| p.color).collect();
        let expected: Vec<i32> = (0..1000).rev().collect();
        assert_eq!(colors, expected);
    }
}
