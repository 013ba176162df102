use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pixbench::core::{Channels, Kernel, PixelBuffer, StructuringElement};
use pixbench::execution::{ExecutionConfig, Executor};
use pixbench::filters::Stage;

fn synthetic(width: u32, height: u32, channels: Channels) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, channels, |x, y, c| ((x * 7 + y * 13 + c as u32 * 29) % 256) as u8)
        .expect("valid benchmark image")
}

fn bench_stages(c: &mut Criterion) {
    let stages = [
        ("sharpen", Stage::convolve(Kernel::sharpen()), Channels::Rgb),
        ("emboss", Stage::convolve(Kernel::emboss()), Channels::Rgb),
        ("sobel", Stage::Sobel, Channels::Gray),
        ("resize_half", Stage::Resize { scale: 0.5 }, Channels::Rgb),
        (
            "erode_r2",
            Stage::Erode(StructuringElement::new(2).expect("valid radius")),
            Channels::Gray,
        ),
    ];
    let configs = [
        ExecutionConfig::sequential(),
        ExecutionConfig::thread_pool(2),
        ExecutionConfig::thread_pool(4),
        ExecutionConfig::thread_pool(8),
    ];

    for (name, stage, channels) in stages.iter() {
        let mut group = c.benchmark_group(*name);

        for (width, height) in [(256, 224), (1024, 896)].iter() {
            group.throughput(criterion::Throughput::Elements((*width * *height) as u64));
            let image = synthetic(*width, *height, *channels);

            for config in configs.iter() {
                let parameter_string = format!("{}x{}", width, height);
                let mut executor = Executor::new(config).expect("executor");

                group.bench_with_input(
                    BenchmarkId::new(config.label(), &parameter_string),
                    &image,
                    |b, i| b.iter(|| black_box(executor.run_stage(stage, i).expect("stage"))),
                );
            }
        }
        group.finish();
    }
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_stages
);
criterion_main!(benches);
