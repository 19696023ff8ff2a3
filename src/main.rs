use std::path::PathBuf;

use anyhow::Context;
use burn::{
  backend::{NdArray, Wgpu, wgpu::WgpuDevice},
  config::Config,
  tensor::backend::Backend,
};
use clap::Parser;
use tracing::info;

use psroi_scorer::{AppearanceClassifier, DEFAULT_WEIGHTS, Frame, Region, ScorerConfig, TrackerSession};

// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
  /// Image to score regions on
  #[clap(short, long)]
  image: PathBuf,

  /// Safetensors checkpoint
  #[clap(short, long, default_value = DEFAULT_WEIGHTS)]
  weights: PathBuf,

  /// JSON scorer configuration; defaults are used when absent
  #[clap(short, long)]
  config: Option<PathBuf>,

  /// Region as x1,y1,x2,y2 in image pixels; repeatable
  #[clap(short, long = "region")]
  regions: Vec<Region>,

  /// Run on the NdArray CPU backend instead of WGPU
  #[clap(long)]
  cpu: bool,
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt::init();
  let args = Args::parse();

  let config = match &args.config {
    Some(path) => ScorerConfig::load(path)
      .map_err(|err| anyhow::anyhow!("reading config {}: {err:?}", path.display()))?,
    None => ScorerConfig::new(),
  };

  if args.cpu {
    info!("using backend: NdArray");
    run::<NdArray>(&args, &config, &Default::default())
  } else {
    let device = WgpuDevice::BestAvailable;
    info!(?device, "using backend: WGPU");
    run::<Wgpu>(&args, &config, &device)
  }
}

fn run<B: Backend>(args: &Args, config: &ScorerConfig, device: &B::Device) -> anyhow::Result<()> {
  let mut classifier = AppearanceClassifier::<B>::new(config, device);
  let report = classifier
    .load_weights(&args.weights)
    .with_context(|| format!("loading weights {}", args.weights.display()))?;
  println!(
    "Weights: {} loaded, {} missing, {} mismatched (epoch {})",
    report.loaded.len(),
    report.missing.len(),
    report.mismatched.len(),
    classifier.state().epoch
  );
  for name in report.skipped() {
    println!("  kept initial value: {name}");
  }

  let frame = Frame::open(&args.image)
    .with_context(|| format!("opening image {}", args.image.display()))?;
  let mut session = TrackerSession::new(classifier);
  let ([height, width], scale) = session.update(&frame)?;
  println!(
    "Frame {}x{} resized to {}x{} (scale {:.4})",
    frame.width(),
    frame.height(),
    width,
    height,
    scale
  );

  let scores = session.predict(&args.regions)?;
  for (region, score) in args.regions.iter().zip(&scores) {
    println!(
      "({:.1}, {:.1}, {:.1}, {:.1}) -> {:.4}",
      region.x1, region.y1, region.x2, region.y2, score
    );
  }
  Ok(())
}
