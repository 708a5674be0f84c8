use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use stradella_gw::dispatch::{DispatchQueue, EventDispatcher};
use stradella_gw::expression::PointerSample;
use stradella_gw::input::InputEvent;
use stradella_gw::mapping::{KeyCode, KeyMappingSet};
use stradella_gw::midi::MidiMessage;
use stradella_gw::output::MidiSink;
use stradella_gw::{AppConfig, Engine, EngineResult};

struct NullSink;

impl MidiSink for NullSink {
    fn send(&mut self, message: &MidiMessage) -> EngineResult<()> {
        black_box(message.encode());
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

fn bench_chord_press_release(c: &mut Criterion) {
    let queue = Arc::new(DispatchQueue::with_capacity(1024));
    let mut dispatcher = EventDispatcher::new(KeyMappingSet::default(), 0, NullSink, queue.clone());
    let key = KeyCode::from_char('Q');

    c.bench_function("chord_press_release", |b| {
        b.iter(|| {
            dispatcher.key_down(black_box(key), 100);
            dispatcher.key_up(black_box(key));
        });
    });
}

fn bench_press_release_with_drain(c: &mut Criterion) {
    let queue = Arc::new(DispatchQueue::with_capacity(1024));
    let mut dispatcher = EventDispatcher::new(KeyMappingSet::default(), 0, NullSink, queue.clone());
    let mut scratch = std::collections::VecDeque::new();
    let key = KeyCode::from_char('F');

    c.bench_function("press_release_with_drain", |b| {
        b.iter(|| {
            dispatcher.key_down(key, 100);
            dispatcher.key_up(key);
            black_box(queue.drain_into(&mut scratch));
        });
    });
}

fn bench_pointer_sample(c: &mut Criterion) {
    let queue = Arc::new(DispatchQueue::with_capacity(1024));
    let mut engine = Engine::new(&AppConfig::default(), NullSink, queue);
    let mut t = 0u64;

    c.bench_function("pointer_sample", |b| {
        b.iter(|| {
            t += 16;
            let x = ((t / 16) % 200) as f32;
            engine.handle(InputEvent::Pointer(PointerSample::new(x, 540.0, t)));
        });
    });
}

criterion_group!(
    benches,
    bench_chord_press_release,
    bench_press_release_with_drain,
    bench_pointer_sample
);
criterion_main!(benches);
