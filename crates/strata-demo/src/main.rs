//! Strata demo
//!
//! Builds a small particle scene, then integrates it for a number of ticks
//! with chunked queries on a parallel job runner.
//!
//! Usage: `strata-demo [config.json]`. The optional file holds a
//! `StoreConfig` in JSON; `STRATA_TICKS` and `STRATA_THREADS` override the
//! tick count and thread count.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytemuck::{Pod, Zeroable};
use strata_ecs::{LaneWidth, prelude::*};
use strata_jobs::ParallelJobRunner as Runner;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Velocity {
    x: f32,
    y: f32,
}

/// Particles that are excluded from integration.
struct Frozen;
impl Tag for Frozen {}

const PARTICLES_PER_GROUP: usize = 2500;
const GROUPS: usize = 4;
const DAMPING: f32 = 0.99;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn load_config() -> eyre::Result<StoreConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(StoreConfig::default());
    };
    let text = std::fs::read_to_string(&path)?;
    let config = StoreConfig::from_json_str(&text)?;
    info!("Loaded store config from {path}");
    Ok(config)
}

fn build_scene(store: &mut EntityStore) -> eyre::Result<()> {
    let root = store.create_entity();
    store.set_root(root)?;

    for group in 0..GROUPS {
        let parent = store.create_entity();
        store.add_child(root, parent)?;

        for i in 0..PARTICLES_PER_GROUP {
            let particle = store.create_entity();
            let t = i as f32 / PARTICLES_PER_GROUP as f32;
            store.add_component(particle, Position {
                x: group as f32 * 10.0,
                y: t,
            })?;
            store.add_component(particle, Velocity {
                x: t.cos(),
                y: t.sin(),
            })?;
            if i % 10 == 0 {
                store.add_tag::<Frozen>(particle)?;
            }
            store.add_child(parent, particle)?;
        }
    }
    Ok(())
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("strata_demo=info".parse()?),
        )
        .init();

    let config = load_config()?;
    let ticks: usize = env_or("STRATA_TICKS", 60);
    let threads: usize = env_or("STRATA_THREADS", 4);

    let mut store = EntityStore::with_config(config);
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    let listener = store.subscribe(move |_: &StructuralChange| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    build_scene(&mut store)?;
    store.unsubscribe(listener);
    info!(
        entities = store.entity_count(),
        archetypes = store.archetype_count(),
        changes = changes.load(Ordering::Relaxed),
        "Built scene"
    );

    let runner = Runner::with_name("strata-demo", threads)?;
    let frozen = store.tags::<(Frozen,)>()?;
    let mut moving = store
        .query_filtered::<(Position, Velocity)>(QueryFilter::new().without_any_tags(frozen))?;
    let mut damped = store.query::<(Velocity,)>()?;

    for tick in 0..ticks {
        moving.for_each_chunk2_mut::<Position, Velocity, _>(&mut store, |_, mut pos, vel| {
            for (p, v) in pos.iter_mut().zip(vel.as_slice()) {
                p.x += v.x;
                p.y += v.y;
            }
        });

        // Damping works on whole 32-byte lanes; padding rows absorb the tail.
        damped.par_for_each_chunk_mut::<Velocity, _>(&mut store, &runner, |_, mut vel| {
            let bytes = vel.padded_bytes_mut(LaneWidth::W32);
            let floats: &mut [f32] = bytemuck::cast_slice_mut(bytes);
            for lane in floats.chunks_exact_mut(8) {
                for value in lane {
                    *value *= DAMPING;
                }
            }
        })?;

        debug!(tick, "Integrated tick");
    }

    let mut extent = 0.0f32;
    for (_, positions) in moving.chunks::<Position>(&store) {
        for p in positions {
            extent = extent.max(p.x.hypot(p.y));
        }
    }

    info!(
        ticks,
        threads = runner.thread_count(),
        moving = moving.entity_count(&store),
        extent,
        "Simulation finished"
    );
    Ok(())
}
