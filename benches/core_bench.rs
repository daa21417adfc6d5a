use criterion::{black_box, criterion_group, criterion_main, Criterion};
use storyreel::captions::CaptionSegmenter;
use storyreel::script::parse_script;

/// Benchmark caption segmentation over a realistic substory
fn bench_caption_segmentation(c: &mut Criterion) {
    let segmenter = CaptionSegmenter::default();
    let lines: Vec<String> = (0..8)
        .map(|i| {
            format!(
                "Narration line {} carrying roughly the amount of text a five to ten second clip holds.",
                i
            )
        })
        .collect();
    let durations: Vec<f64> = (0..8).map(|i| 5.0 + i as f64 * 0.5).collect();

    c.bench_function("caption_segmentation", |b| {
        b.iter(|| segmenter.segment(black_box(&lines), black_box(&durations)))
    });
}

/// Benchmark raw script parsing
fn bench_script_parsing(c: &mut Criterion) {
    let mut raw = String::new();
    for s in 0..3 {
        raw.push_str(&format!("- **Substory Title**: Story {}\n- **Script**:\n", s));
        for i in 1..=8 {
            raw.push_str(&format!("  - Chunk {}: A narration chunk with some text in it.\n", i));
        }
        raw.push_str("- **Image Prompts**:\n");
        for i in 1..=8 {
            raw.push_str(&format!("  - Chunk {} Prompt: A detailed scene description.\n", i));
        }
        raw.push_str("- **General Prompt**: painterly, muted palette\n\n");
    }

    c.bench_function("script_parsing", |b| {
        b.iter(|| parse_script(black_box(&raw)))
    });
}

criterion_group!(benches, bench_caption_segmentation, bench_script_parsing);
criterion_main!(benches);
