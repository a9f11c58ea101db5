// Criterion benchmarks for Vyntra Relay

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use vyntra_relay::core::{filters::matches_filter, Matcher, SessionLifecycle};
use vyntra_relay::models::{ConnectionId, Filter, MatchPolicy, Profile};

const COUNTRIES: [&str; 4] = ["CA", "MX", "GB", "DE"];

/// Lifecycle with `waiting` queued connections, none of them from the US
///
/// Each one only accepts partners from a country nobody has, so they never pair
/// among themselves while the queue is being filled.
fn populated_lifecycle(policy: MatchPolicy, waiting: usize) -> SessionLifecycle {
    let mut lifecycle = SessionLifecycle::new(Matcher::new(policy));
    let unreachable = Filter::any().country("XX");

    for i in 0..waiting {
        let id = ConnectionId::new();
        lifecycle.connect(id);
        let gender = if i % 2 == 0 { "female" } else { "male" };
        lifecycle.find(
            &id,
            Profile::new(gender, COUNTRIES[i % COUNTRIES.len()]),
            Some(unreachable.clone()),
        );
    }

    assert_eq!(lifecycle.queue().len(), waiting);
    lifecycle
}

fn bench_filter_check(c: &mut Criterion) {
    let profile = Profile::new("female", "US");
    let filter = Filter::any().gender("female").country("all");

    c.bench_function("matches_filter", |b| {
        b.iter(|| matches_filter(black_box(&profile), black_box(&filter)));
    });
}

fn bench_select_miss(c: &mut Criterion) {
    let requester = ConnectionId::new();
    let profile = Profile::new("male", "US");
    let filter = Filter::any().country("US");

    let mut group = c.benchmark_group("select_full_scan");

    for waiting in [10, 100, 1000, 10000].iter() {
        let lifecycle = populated_lifecycle(MatchPolicy::Mutual, *waiting);
        let matcher = *lifecycle.matcher();

        group.bench_with_input(BenchmarkId::from_parameter(waiting), waiting, |b, _| {
            b.iter(|| {
                matcher.select(
                    black_box(lifecycle.queue()),
                    black_box(lifecycle.registry()),
                    &requester,
                    &profile,
                    Some(&filter),
                )
            });
        });
    }

    group.finish();
}

fn bench_find_pairs_tail(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_pairs_tail");

    for waiting in [100, 1000, 10000].iter() {
        let mut template = populated_lifecycle(MatchPolicy::RequesterOnly, *waiting);
        let american = ConnectionId::new();
        template.connect(american);
        template.find(&american, Profile::new("female", "US"), Some(Filter::any().country("US")));
        let requester = ConnectionId::new();
        template.connect(requester);

        group.bench_with_input(BenchmarkId::from_parameter(waiting), waiting, |b, _| {
            b.iter_batched(
                || template.clone(),
                |mut lifecycle| {
                    let notices = lifecycle.find(
                        &requester,
                        Profile::new("male", "US"),
                        Some(Filter::any().country("US")),
                    );
                    black_box(notices)
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_filter_check, bench_select_miss, bench_find_pairs_tail);

criterion_main!(benches);
