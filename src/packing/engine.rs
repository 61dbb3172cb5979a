//! Aggregate packing engine orchestration.

use crate::error::PackingError;
use crate::grid::{PartIdGrid, PhaseGrid};
use crate::packing::particle::Particle;
use crate::packing::placement::{build_pore_list, fits, pore_voxel_coords, stamp};
use crate::packing::pore_list::PoreList;
use crate::packing::settle::settle_pass;
use crate::packing::shape::{AxisRotation, ParticleShape, ShShape};
use crate::packing::size_class::SizeClass;
use crate::phase::PhaseId;
use log::{info, warn};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand::SeedableRng;

/// Class index above which placement uses a pore-radius-ranked candidate
/// search instead of a flat uniform search ("large" class).
pub const LARGE_CLASS_RADIUS_THRESHOLD: usize = 3;

/// Particle shapes reused per size class before a fresh digitization is
/// produced.
pub const SHAPES_PER_BIN: usize = 25;

/// Retry budget for a single placement attempt before giving up on a class.
pub const MAX_TRIES: u32 = 10_000;

/// One size-distribution source's classes plus the shape to use.
#[derive(Clone, Debug)]
pub struct PackingSource {
    pub phase: PhaseId,
    pub classes: Vec<SizeClass>,
    /// `None` selects sphere mode; `Some` provides the SH template library to
    /// draw real shapes from.
    pub shape_templates: Option<Vec<ShShape>>,
}

/// Top-level packing engine configuration.
#[derive(Clone, Debug)]
pub struct PackingConfig {
    pub sources: Vec<PackingSource>,
    pub add_itz: bool,
    pub seed: u64,
}

/// Result of a packing run.
pub struct PackingResult {
    pub phase_grid: PhaseGrid,
    pub part_grid: PartIdGrid,
    pub particles: Vec<Particle>,
    /// Voxels requested but never placed, per class, in processing order.
    pub deferred_voxels: Vec<u64>,
}

/// Runs the packing engine against a pre-generated grid, mutating it in
/// place with placed aggregate particles and returning the companion
/// particle-id grid.
pub fn run_packing(
    mut phase_grid: PhaseGrid,
    config: &PackingConfig,
) -> Result<PackingResult, PackingError> {
    let mut part_grid = PartIdGrid::new(
        phase_grid.nx(),
        phase_grid.ny(),
        phase_grid.nz(),
        phase_grid.resolution_um(),
    )
    .map_err(PackingError::Grid)?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut particles: Vec<Particle> = Vec::new();
    let mut next_id: u32 = 1;
    let mut deferred_voxels = Vec::new();

    let voxel_volume_um3 = phase_grid.resolution_um().powi(3);

    for source in &config.sources {
        // Largest classes first.
        let mut classes: Vec<(usize, SizeClass)> = source.classes.iter().copied().enumerate().collect();
        classes.sort_by(|a, b| b.1.radius_max_um.partial_cmp(&a.1.radius_max_um).unwrap());

        let mut carry_voxels = 0.0_f64;
        for (class_index, class) in classes {
            if class.radius_min_um < phase_grid.resolution_um() {
                return Err(PackingError::IrresolvableClass {
                    radius_um: class.radius_min_um,
                    resolution_um: phase_grid.resolution_um(),
                });
            }

            let mut class = class;
            class.volume_total_um3 += carry_voxels * voxel_volume_um3;
            carry_voxels = 0.0;

            let target_particles = class.particle_count(voxel_volume_um3, 64);
            if target_particles == 0 {
                continue;
            }
            info!(
                "packing: class {} ({:.2}-{:.2} um) targets {} particles",
                class_index, class.radius_min_um, class.radius_max_um, target_particles
            );

            let target_voxels = (class.representative_volume_um3(64) / voxel_volume_um3).round().max(1.0);

            let mut template = build_shape(source, &class, &mut rng);
            let mut placed_since_retemplate = 0usize;
            let mut placed_count = 0u64;
            let mut remaining_voxels = target_particles as f64 * target_voxels;

            let use_radius = class_index > LARGE_CLASS_RADIUS_THRESHOLD;

            'class: while placed_count < target_particles {
                let mut pore_list = build_pore_list(
                    &phase_grid,
                    use_radius.then_some(template.bbox_half_extent() as i64),
                );
                if use_radius {
                    pore_list.sort_by_radius_descending();
                }

                let mut tries = 0u32;
                loop {
                    let first_n_pores = if use_radius {
                        count_eligible(&pore_list, template.bbox_half_extent() as f64)
                    } else {
                        pore_list.len()
                    };
                    if first_n_pores == 0 {
                        let settled = crate::profile!("packing::settle_pass", settle_pass(&mut particles, &mut phase_grid, &mut part_grid));
                        if settled == 0 {
                            warn!(
                                "packing: class {} could not free space after settling; deferring {} voxels",
                                class_index, remaining_voxels
                            );
                            deferred_voxels.push(remaining_voxels.round() as u64);
                            carry_voxels += remaining_voxels;
                            break 'class;
                        }
                        continue 'class;
                    }

                    let pick = rng.gen_range(0..first_n_pores);
                    let handle = pore_list.locate_by_position(pick).expect("pick within bounds");
                    let center = pore_voxel_coords(&pore_list, handle, &phase_grid);

                    let offsets = template.digitize(target_voxels as usize, &mut rng);
                    if fits(&phase_grid, center, &offsets) {
                        let voxels = stamp(
                            &mut phase_grid,
                            &mut part_grid,
                            center,
                            &offsets,
                            source.phase,
                            next_id,
                        );
                        let mut particle = Particle {
                            id: next_id,
                            phase: source.phase,
                            center,
                            extent: template.half_extents(),
                            voxels,
                            periph: Vec::new(),
                            minz_vox: 0,
                            settled: false,
                        };
                        particle.recompute_derived(|v| {
                            crate::packing::itz::has_non_aggregate_neighbor(&phase_grid, v)
                        });
                        particles.push(particle);
                        next_id += 1;
                        placed_count += 1;
                        remaining_voxels -= target_voxels;
                        pore_list.delete(handle);

                        placed_since_retemplate += 1;
                        if placed_since_retemplate >= SHAPES_PER_BIN {
                            template = build_shape(source, &class, &mut rng);
                            placed_since_retemplate = 0;
                        }

                        if placed_count >= target_particles {
                            break 'class;
                        }
                        continue;
                    }

                    pore_list.delete(handle);
                    tries += 1;
                    if tries >= MAX_TRIES {
                        warn!("packing: class {} exceeded placement retry budget", class_index);
                        deferred_voxels.push(remaining_voxels.round() as u64);
                        carry_voxels += remaining_voxels;
                        break 'class;
                    }
                }
            }
        }
    }

    if config.add_itz {
        crate::packing::itz::add_itz(&mut phase_grid);
    }

    Ok(PackingResult {
        phase_grid,
        part_grid,
        particles,
        deferred_voxels,
    })
}

fn count_eligible(list: &PoreList, min_radius: f64) -> usize {
    list.iter().take_while(|&(_, r)| r >= min_radius).count()
}

/// A digitizable template plus cached sizing info for the current class.
struct ClassTemplate {
    shape: ParticleShape,
    bbox_half_extent_voxels: i64,
}

impl ClassTemplate {
    fn digitize<Rn: Rng>(&self, target_voxels: usize, rng: &mut Rn) -> Vec<(i32, i32, i32)> {
        self.shape.digitize(target_voxels, rng)
    }

    fn bbox_half_extent(&self) -> i64 {
        self.bbox_half_extent_voxels
    }

    fn half_extents(&self) -> (i64, i64, i64) {
        (
            self.bbox_half_extent_voxels,
            self.bbox_half_extent_voxels,
            self.bbox_half_extent_voxels,
        )
    }
}

fn build_shape(source: &PackingSource, class: &SizeClass, rng: &mut ChaCha8Rng) -> ClassTemplate {
    let radius_voxels = class.mean_radius(32);
    match &source.shape_templates {
        None => ClassTemplate {
            shape: ParticleShape::Sphere {
                radius_voxels,
            },
            bbox_half_extent_voxels: radius_voxels.ceil() as i64 + 1,
        },
        Some(templates) => {
            let template = templates[rng.gen_range(0..templates.len())].clone();
            let rotation = AxisRotation::random(rng);
            let half_extent = (radius_voxels.ceil() as i64) + 2;
            ClassTemplate {
                shape: ParticleShape::RealShape { template, rotation },
                bbox_half_extent_voxels: half_extent,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_smoke_scenario() {
        // Scenario 1: Nx=Ny=Nz=50, R=1.0, one size class of 100 spheres of
        // diameter 5 voxels totaling 6545 voxels.
        let grid = PhaseGrid::new(50, 50, 50, 1.0).unwrap();
        let config = PackingConfig {
            sources: vec![PackingSource {
                phase: PhaseId::AGG,
                classes: vec![SizeClass {
                    volume_total_um3: 6545.0,
                    radius_min_um: 2.5,
                    radius_max_um: 2.5,
                }],
                shape_templates: None,
            }],
            add_itz: false,
            seed: 42,
        };

        let result = run_packing(grid, &config).unwrap();
        assert!(result.particles.len() <= 100);

        let agg_count = result
            .phase_grid
            .voxels()
            .iter()
            .filter(|&&p| p == PhaseId::AGG)
            .count();
        let fraction = agg_count as f64 / 125_000.0;
        let expected = 6545.0 / 125_000.0;
        assert!((fraction - expected).abs() / expected < 0.5);
    }

    #[test]
    fn no_two_particles_share_a_voxel() {
        let grid = PhaseGrid::new(30, 30, 30, 1.0).unwrap();
        let config = PackingConfig {
            sources: vec![PackingSource {
                phase: PhaseId::AGG,
                classes: vec![SizeClass {
                    volume_total_um3: 500.0,
                    radius_min_um: 1.5,
                    radius_max_um: 1.5,
                }],
                shape_templates: None,
            }],
            add_itz: false,
            seed: 7,
        };
        let result = run_packing(grid, &config).unwrap();
        for particle in &result.particles {
            for &(x, y, z) in &particle.voxels {
                assert_eq!(result.part_grid.get(x, y, z), particle.id);
                assert_eq!(result.phase_grid.get(x, y, z), particle.phase);
            }
        }
    }
}
