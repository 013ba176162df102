//! Pixbench CLI - run transform sweeps and one-off operations.

use anyhow::{bail, Context};
use argh::FromArgs;
use pixbench::bench::plan::COMPOSITE_OPERATION;
use pixbench::bench::{config_averages, format_line};
use pixbench::prelude::*;
use std::path::PathBuf;

/// Image transform benchmarks across sequential, thread-pool and GPU backends
#[derive(Debug, FromArgs)]
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Sweep(SweepArgs),
    Apply(ApplyArgs),
    Devices(DevicesArgs),
    Ops(OpsArgs),
}

/// Run a benchmark sweep
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "sweep")]
struct SweepArgs {
    /// TOML sweep plan (defaults apply when omitted)
    #[argh(option, short = 'p')]
    plan: Option<PathBuf>,

    /// image path or glob, repeatable; overrides the plan
    #[argh(option, short = 'i')]
    image: Vec<String>,

    /// directory for the last output of each case
    #[argh(option, short = 'o')]
    out: Option<PathBuf>,

    /// write a JSON report to this path
    #[argh(option)]
    json: Option<PathBuf>,
}

/// Apply one operation to one image
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "apply")]
struct ApplyArgs {
    /// input image
    #[argh(positional)]
    input: PathBuf,

    /// output image
    #[argh(positional)]
    output: PathBuf,

    /// operation name (see `ops`)
    #[argh(option, short = 'x', default = "String::from(\"sharpen-downscale\")")]
    op: String,

    /// sequential, thread_pool or gpu_compute
    #[argh(option, short = 'b', default = "Backend::ThreadPool")]
    backend: Backend,

    /// worker threads for the thread-pool backend
    #[argh(option, short = 't', default = "4")]
    threads: usize,

    /// GPU adapter index
    #[argh(option, short = 'd', default = "0")]
    device: usize,

    /// external WGSL composite kernel
    #[argh(option, short = 'k')]
    kernel: Option<PathBuf>,

    /// half-scale level for `composite` (needs --quarter)
    #[argh(option)]
    half: Option<PathBuf>,

    /// quarter-scale level for `composite` (needs --half)
    #[argh(option)]
    quarter: Option<PathBuf>,
}

/// List GPU adapters
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "devices")]
struct DevicesArgs {}

/// List registered operations
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "ops")]
struct OpsArgs {}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Args = argh::from_env();

    println!("🧪 Pixbench - image transform benchmarks v{}", pixbench::VERSION);
    println!();

    match args.command {
        Command::Sweep(sweep) => run_sweep(sweep),
        Command::Apply(apply) => run_apply(apply),
        Command::Devices(_) => {
            list_adapters();
            Ok(())
        }
        Command::Ops(_) => {
            list_operations();
            Ok(())
        }
    }
}

fn run_sweep(args: SweepArgs) -> anyhow::Result<()> {
    let mut plan = match &args.plan {
        Some(path) => SweepPlan::load(path).with_context(|| format!("reading plan {}", path.display()))?,
        None => SweepPlan::default(),
    };
    if !args.image.is_empty() {
        plan = plan.with_images(args.image);
    }

    let registry = OperationRegistry::with_builtins();
    let cases = plan.expand(&registry).context("expanding sweep plan")?;
    println!("🔍 {} cases ({} repetitions each)", cases.len(), plan.repetitions);

    let mut options = HarnessOptions::new().with_progress(|update| match update {
        ProgressUpdate::CaseStarted { index, total, label } => {
            println!("   • [{}/{}] {}", index + 1, total, label);
        }
        ProgressUpdate::CaseFailed { message, .. } => {
            eprintln!("   ❌ {}", message);
        }
        ProgressUpdate::SweepCompleted {
            total_duration_ms,
            completed,
            failed,
        } => {
            println!("✅ Sweep finished in {}ms ({} completed, {} failed)", total_duration_ms, completed, failed);
        }
        _ => {}
    });
    if let Some(dir) = args.out.or_else(|| plan.output_dir.clone()) {
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        options = options.with_output_dir(dir);
    }

    let outcomes = BenchmarkHarness::with_registry(registry, options).run(&cases);

    println!();
    for outcome in &outcomes {
        println!("{}", format_line(outcome));
    }

    println!();
    println!("📊 Averages per configuration:");
    for average in config_averages(&outcomes) {
        println!(
            "   {:<20} {:<18} {:>10.3} ms over {} images ({} failed)",
            average.operation, average.config, average.average_ms, average.images, average.failed
        );
    }

    if let Some(path) = args.json {
        SweepReport::new(&outcomes)
            .write_json(&path)
            .with_context(|| format!("writing report {}", path.display()))?;
        println!("🎉 Report saved to: {}", path.display());
    }
    Ok(())
}

fn run_apply(args: ApplyArgs) -> anyhow::Result<()> {
    let registry = OperationRegistry::with_builtins();
    let Some(operation) = registry.get(&args.op) else {
        bail!("unknown operation `{}`; run `pixbench ops` to list them", args.op);
    };

    let mut config = ExecutionConfig::new(args.backend)
        .with_threads(args.threads)
        .with_device(args.device);
    if let Some(kernel) = args.kernel {
        config = config.with_composite_kernel(kernel);
    }

    let load = |path: &PathBuf| load_image(path, Channels::Rgb).with_context(|| format!("loading {}", path.display()));
    let image = load(&args.input)?;
    let levels = match (&args.half, &args.quarter) {
        (Some(half), Some(quarter)) => {
            if operation.name() != COMPOSITE_OPERATION {
                bail!("--half/--quarter only apply to `{}`", COMPOSITE_OPERATION);
            }
            Some((load(half)?, load(quarter)?))
        }
        (None, None) => None,
        _ => bail!("--half and --quarter must be given together"),
    };

    println!(
        "⚙️  {} on {}: {} -> {}",
        operation.name(),
        config.label(),
        args.input.display(),
        args.output.display()
    );
    let started = std::time::Instant::now();
    let output = match &levels {
        Some((half, quarter)) => apply_composite(&image, half, quarter, &config)?,
        None => apply_operation(operation, &image, &config)?,
    };
    println!("✅ Complete in {:.3}ms", started.elapsed().as_secs_f64() * 1000.0);

    save_image(&output, &args.output).with_context(|| format!("saving {}", args.output.display()))?;
    println!("🎉 Image saved to: {}", args.output.display());
    Ok(())
}

fn list_adapters() {
    let adapters = list_devices();
    if adapters.is_empty() {
        println!("No GPU adapters found.");
        return;
    }
    println!("GPU adapters ({} total):", adapters.len());
    for adapter in adapters {
        println!("   • {}", adapter);
    }
}

fn list_operations() {
    let registry = OperationRegistry::with_builtins();
    println!("Operations ({} total):", registry.len());
    println!();
    for operation in registry.operations() {
        println!("  📁 {}", operation.name());
        println!("      {}", operation.description());
        println!("      {}", operation.pipeline());
    }
}
