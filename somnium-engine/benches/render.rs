use criterion::{black_box, criterion_group, criterion_main, Criterion};
use somnium_engine::{Engine, EngineConfig, ManualClock, OfflineOutput, SoundKind};

const BLOCK: usize = 512;

fn engine_playing(kind: SoundKind) -> (Engine, OfflineOutput) {
    let out = OfflineOutput::new();
    let cfg = EngineConfig { seed: Some(1), ..EngineConfig::default() };
    let mut engine = Engine::new(cfg, Box::new(out.clone()), Box::new(ManualClock::new())).unwrap();
    engine.play(kind).unwrap();
    (engine, out)
}

fn render_block(c: &mut Criterion) {
    for kind in [SoundKind::Pink, SoundKind::Wind, SoundKind::Elysium, SoundKind::StatusII] {
        let (_engine, out) = engine_playing(kind);
        let mut buf = vec![0.0f32; BLOCK * 2];
        c.bench_function(&format!("{} block of {} frames @ 48k, 5 s reverb", kind, BLOCK), |b| {
            b.iter(|| {
                out.render(black_box(&mut buf), 2);
                buf[0]
            })
        });
    }
}

fn pump_cues(c: &mut Criterion) {
    c.bench_function("polyrhythm, 60 s of cues in 10 ms steps", |b| {
        b.iter(|| {
            let out = OfflineOutput::new();
            let clock = ManualClock::new();
            let cfg = EngineConfig {
                seed: Some(2),
                reverb: somnium_engine::config::ReverbConfig { seconds: 0.1, ..Default::default() },
                ..EngineConfig::default()
            };
            let mut engine = Engine::new(cfg, Box::new(out.clone()), Box::new(clock.clone())).unwrap();
            engine.play(SoundKind::Polyrhythm).unwrap();
            let mut fired = 0;
            for _ in 0..6000 {
                clock.advance(std::time::Duration::from_millis(10));
                fired += engine.pump();
                // keep the command ring drained
                out.render_frames(16);
            }
            fired
        })
    });
}

criterion_group!(benches, render_block, pump_cues);
criterion_main!(benches);
