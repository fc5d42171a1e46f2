use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use filmscan_core::sensor::PtEnvelope;
use filmscan_core::{CommandChannel, Gauge, GaugeThresholds, ThresholdCalibrator};

// Perforation-like trace: a bright pulse every `pitch` samples on a dark base.
fn synth_levels(n: usize, pitch: usize, seed: u32) -> Vec<u16> {
    let mut state = seed.max(1);
    let mut noise = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        (x % 16) as u16
    };
    (0..n)
        .map(|i| if i % pitch < 40 { 780 + noise() } else { 55 + noise() })
        .collect()
}

fn sample_size(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    //   BENCH_SAMPLE_SIZE=10 cargo bench -p filmscan_core --bench hot_paths
    let n = std::env::var("BENCH_SAMPLE_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(50);
    g.sample_size(n.max(10));
}

pub fn bench_envelope(c: &mut Criterion) {
    let mut g = c.benchmark_group("pt_envelope");
    sample_size(&mut g);
    let levels = synth_levels(4096, 285, 0xC0FFEE);
    g.bench_function("observe_and_track_4096", |b| {
        b.iter_batched(
            || {
                (
                    PtEnvelope::new(),
                    ThresholdCalibrator::new(GaugeThresholds::default(), Gauge::Super8, 50),
                )
            },
            |(mut env, mut cal)| {
                for &l in &levels {
                    env.observe(black_box(l));
                    cal.track(&env);
                }
                black_box(cal.threshold())
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

pub fn bench_channel(c: &mut Criterion) {
    let mut g = c.benchmark_group("command_channel");
    sample_size(&mut g);
    let ch: CommandChannel = CommandChannel::new();
    g.bench_function("push_pop", |b| {
        b.iter(|| {
            ch.push(black_box(70), black_box(5));
            black_box(ch.pop())
        })
    });
    g.finish();
}

criterion_group!(benches, bench_envelope, bench_channel);
criterion_main!(benches);
