use bus::InMemoryBus;
use cache::{CacheIndex, InMemoryCacheStore};
use common::{EntityId, UserProfile};
use criterion::{Criterion, criterion_group, criterion_main};
use rollback::{BusRollbackEmitter, RollbackCommand, RollbackParams};
use saga::{
    CompensationDispatcher, InMemoryServices, NewCard, SagaStep, StepError, StepOutput, Workflows,
};

fn noop_steps(n: usize, fail_last: bool) -> Vec<SagaStep> {
    (0..n)
        .map(|i| {
            let fail = fail_last && i == n - 1;
            SagaStep::durable("step", move |_| async move {
                if fail {
                    Err(StepError::Remote("unavailable".into()))
                } else {
                    Ok(StepOutput::None)
                }
            })
            .compensate_with(|_| Some(RollbackCommand::new("Undo", RollbackParams::new())))
        })
        .collect()
}

fn bench_dispatcher(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dispatcher = CompensationDispatcher::new(BusRollbackEmitter::new(InMemoryBus::new()));
    let succeeding = noop_steps(5, false);
    let failing = noop_steps(5, true);

    c.bench_function("saga/run_5_steps", |b| {
        b.iter(|| {
            rt.block_on(async {
                dispatcher.run("bench", &succeeding).await.unwrap();
            });
        });
    });

    c.bench_function("saga/fail_at_5_and_emit_4", |b| {
        b.iter(|| {
            rt.block_on(async {
                let _ = dispatcher.run("bench", &failing).await;
                dispatcher.flush().await;
            });
        });
    });
}

fn bench_create_card(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let services = InMemoryServices::new();
    services.identity.insert_user(UserProfile {
        id: EntityId::new(1),
        name: "alice".into(),
        profile_image_id: None,
        card_ids: Vec::new(),
    });
    let workflows = Workflows::new(
        services.handles(),
        CacheIndex::new(InMemoryCacheStore::new()),
        InMemoryBus::new(),
    );
    let card = NewCard {
        owner_id: EntityId::new(1),
        title: "Bike".into(),
        text: "Good condition".into(),
        tags: vec!["sport".into()],
        image_files: vec!["front.png".into(), "side.png".into()],
    };

    c.bench_function("saga/create_card", |b| {
        b.iter(|| {
            rt.block_on(async {
                workflows.create_card(card.clone()).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_dispatcher, bench_create_card);
criterion_main!(benches);
