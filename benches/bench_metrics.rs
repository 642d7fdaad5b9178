use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dddd_ocr::det::decode_anchors;
use dddd_ocr::preprocess::{preprocess_for_det, preprocess_for_rec};
use dddd_ocr::rec::{decode_indices, decode_logits};
use dddd_ocr::{nms, DetBox, Dictionary, GridTable, NormalizeParams};
use image::{DynamicImage, Rgb, RgbImage};
use std::time::Duration;

const NUM_CLASSES: usize = 8210;

fn dictionary() -> Dictionary {
    let symbols: Vec<String> = (1..NUM_CLASSES).map(|i| format!("s{}", i)).collect();
    Dictionary::from_symbols(symbols)
}

/// Gradient test image - no model files needed
fn captcha_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn bench_preprocess(c: &mut Criterion) {
    let captcha = captcha_image(160, 60);
    let scene = captcha_image(640, 480);
    let params = NormalizeParams::ddddocr_official();

    let mut group = c.benchmark_group("preprocess");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("rec_160x60", |b| {
        b.iter(|| preprocess_for_rec(black_box(&captcha), 64, &params).expect("Preprocess failed"));
    });

    group.bench_function("det_640x480", |b| {
        b.iter(|| preprocess_for_det(black_box(&scene), 416).expect("Preprocess failed"));
    });

    group.finish();
}

fn bench_ctc_decode(c: &mut Criterion) {
    let dict = dictionary();
    let seq_len = 22;

    let indices: Vec<i64> = (0..seq_len as i64).map(|i| (i * 37) % 12).collect();

    // One peak per timestep
    let mut logits = vec![0.0f32; seq_len * NUM_CLASSES];
    for t in 0..seq_len {
        logits[t * NUM_CLASSES + (t * 131) % NUM_CLASSES] = 1.0;
    }

    let mut group = c.benchmark_group("ctc_decode");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("indices", |b| {
        b.iter(|| decode_indices(black_box(&indices), &dict));
    });

    group.bench_function("logits_8210", |b| {
        b.iter(|| decode_logits(black_box(&logits), seq_len, NUM_CLASSES, &dict));
    });

    group.finish();
}

fn bench_box_decode(c: &mut Criterion) {
    let grid = GridTable::new(416, &[8, 16, 32]).expect("Failed to build grid");

    // Every 7th anchor passes the score threshold
    let mut output = vec![0.0f32; grid.len() * 6];
    for (i, row) in output.chunks_exact_mut(6).enumerate() {
        let score = if i % 7 == 0 { 0.9 } else { 0.05 };
        row.copy_from_slice(&[0.5, 0.5, 0.3, 0.1, score, 0.95]);
    }

    let candidates = decode_anchors(&output, &grid, 0.65, 640, 480, 0.1)
        .expect("Failed to decode anchors");

    let mut group = c.benchmark_group("box_decode");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("decode_3549_anchors", |b| {
        b.iter(|| decode_anchors(black_box(&output), &grid, 0.65, 640, 480, 0.1).expect("Decode failed"));
    });

    group.bench_function("nms", |b| {
        b.iter(|| nms(black_box(&candidates), 0.45));
    });

    // Overlapping worst case: every box suppresses its neighbours
    let stacked: Vec<DetBox> = (0..500)
        .map(|i| {
            let offset = (i % 50) as f32;
            DetBox::new(offset, offset, offset + 100.0, offset + 60.0, 1.0 - i as f32 / 1000.0)
        })
        .collect();
    group.bench_function("nms_overlapping_500", |b| {
        b.iter(|| nms(black_box(&stacked), 0.45));
    });

    group.finish();
}

criterion_group!(benches, bench_preprocess, bench_ctc_decode, bench_box_decode,);
criterion_main!(benches);
