use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use battle_odds::core::{EngineConfig, PlayerId, TerritoryId, UnitTypeId};
use battle_odds::odds::{Battle, WorkerPoolSupervisor};
use battle_odds::world::{Domain, Territory, Unit, UnitType, WorldState};

const RED: PlayerId = PlayerId(1);
const BLUE: PlayerId = PlayerId(2);
const FRONT: TerritoryId = TerritoryId(1);

fn make_world_and_battle() -> (WorldState, Battle) {
    let mut world = WorldState::new(6);
    world.add_player(RED, "Red");
    world.add_player(BLUE, "Blue");
    world.add_unit_type(
        UnitType::new(UnitTypeId(1), "infantry", Domain::Land)
            .with_cost(3)
            .with_combat(1, 2),
    );
    world.add_unit_type(
        UnitType::new(UnitTypeId(2), "armour", Domain::Land)
            .with_cost(6)
            .with_combat(3, 3),
    );
    world.add_territory(Territory::land(FRONT, "Front", Some(BLUE)));

    // Background garrisons so a copy is not trivially small
    for i in 0..200u32 {
        let id = TerritoryId(100 + i);
        world.add_territory(Territory::land(id, format!("Rear {}", i), Some(BLUE)));
        for _ in 0..5 {
            world
                .spawn_unit(id, UnitTypeId(1), BLUE)
                .expect("spawn should succeed");
        }
    }

    let defenders: Vec<Unit> = (0..12)
        .map(|_| world.spawn_unit(FRONT, UnitTypeId(1), BLUE).expect("spawn should succeed"))
        .collect();
    let attackers: Vec<Unit> = (0..16)
        .map(|i| {
            let unit_type = if i % 2 == 0 { UnitTypeId(1) } else { UnitTypeId(2) };
            Unit::new(world.allocate_unit_id(), unit_type, RED)
        })
        .collect();
    let battle = Battle::new(RED, BLUE, FRONT)
        .with_attackers(attackers)
        .with_defenders(defenders);
    (world, battle)
}

fn bench_calculate(c: &mut Criterion) {
    let (world, battle) = make_world_and_battle();
    let supervisor = WorkerPoolSupervisor::new(EngineConfig {
        seed: Some(1),
        ..EngineConfig::default()
    })
    .expect("supervisor should build");
    supervisor
        .set_world_state(Arc::new(world))
        .expect("pool should build");

    let mut group = c.benchmark_group("calculate");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("1000_trials", |b| {
        b.iter(|| {
            let results = supervisor
                .calculate(black_box(&battle), 1000)
                .expect("calculate should succeed");
            black_box(results.attacker_win_percent())
        })
    });
    group.finish();
}

fn bench_reconfigure(c: &mut Criterion) {
    let (world, _) = make_world_and_battle();
    let world = Arc::new(world);
    let supervisor = WorkerPoolSupervisor::new(EngineConfig::default()).expect("supervisor should build");

    c.bench_function("reconfigure/1000_units", |b| {
        b.iter(|| {
            supervisor
                .set_world_state(Arc::clone(&world))
                .expect("pool should build")
        })
    });
}

criterion_group!(benches, bench_calculate, bench_reconfigure);
criterion_main!(benches);
