use pixbench::bench::SweepReport;
use pixbench::prelude::*;
use tempfile::TempDir;

fn write_gradient(dir: &TempDir, name: &str, width: u32, height: u32) {
    let image = PixelBuffer::from_fn(width, height, Channels::Rgb, |x, y, c| {
        ((x * 5 + y * 3 + c as u32 * 40) % 256) as u8
    })
    .unwrap();
    save_image(&image, dir.path().join(name)).unwrap();
}

#[test]
fn test_plan_to_report() {
    let images = TempDir::new().unwrap();
    let outputs = TempDir::new().unwrap();
    write_gradient(&images, "a.png", 40, 30);
    write_gradient(&images, "b.png", 17, 9);

    let plan = SweepPlan::from_toml_str(&format!(
        r#"
        images = ["{}/*.png"]
        operations = ["sharpen-downscale", "binary-erosion"]
        threads = [2, 3]
        sequential = true
        repetitions = 2
        "#,
        images.path().display()
    ))
    .unwrap();

    let registry = OperationRegistry::with_builtins();
    let cases = plan.expand(&registry).unwrap();
    assert_eq!(cases.len(), 3 * 2 * 2);

    let harness = BenchmarkHarness::new(HarnessOptions::new().with_output_dir(outputs.path()));
    let outcomes = harness.run(&cases);
    assert_eq!(outcomes.len(), cases.len());
    assert!(outcomes.iter().all(|o| !o.is_failed()));

    let saved = outputs.path().join("3_threads_sharpen-downscale_a.png");
    let reloaded = load_image(&saved, Channels::Rgb).unwrap();
    assert_eq!((reloaded.width(), reloaded.height()), (20, 15));

    let report = SweepReport::new(&outcomes);
    assert_eq!(report.completed, 12);
    assert_eq!(report.averages.len(), 6);
}

#[test]
fn test_thread_pool_output_matches_sequential_on_disk_image() {
    let images = TempDir::new().unwrap();
    write_gradient(&images, "c.png", 33, 21);
    let image = load_image(images.path().join("c.png"), Channels::Rgb).unwrap();

    let registry = OperationRegistry::with_builtins();
    for name in ["sharpen-downscale", "emboss-downscale", "binary-erosion", "composite"] {
        let op = registry.get(name).unwrap();
        let reference = apply_operation(op, &image, &ExecutionConfig::sequential()).unwrap();
        let parallel = apply_operation(op, &image, &ExecutionConfig::thread_pool(5)).unwrap();
        assert_eq!(reference, parallel, "{}", name);
    }
}
