// Copyright 2018 The naive-nmt Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use naive_nmt::hparams::HParams;
use naive_nmt::models::BasicModel;
use naive_nmt::training::{load_basic_model, Trainer};
use naive_nmt::Config;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tch::{nn, Device};

#[derive(Parser, Debug)]
#[command(
    name = "naive-nmt",
    version,
    about = "Train and run recurrent sequence-to-sequence translation models"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model from a JSON hyper-parameter file
    Train(TrainArgs),
    /// Translate a file with a trained checkpoint
    Infer(InferArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// JSON file with the hyper-parameters
    #[arg(long)]
    hparams: PathBuf,

    /// Overrides `out_dir` of the hyper-parameters
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Train on CPU even when CUDA is available
    #[arg(long)]
    cpu: bool,
}

#[derive(Args, Debug)]
struct InferArgs {
    /// Directory written by `train`
    #[arg(long)]
    checkpoint_dir: PathBuf,

    /// File to translate, one sentence per line
    #[arg(long)]
    input: PathBuf,

    /// Output file, translations are printed when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    cpu: bool,
}

fn device(cpu: bool) -> Device {
    if cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available()
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let mut hparams = HParams::from_file(&args.hparams)?;
    if let Some(out_dir) = args.out_dir {
        hparams.out_dir = out_dir;
    }
    hparams.check_vocab_files()?;

    let device = device(args.cpu);
    tracing::info!("training on {:?}, output in {}", device, hparams.out_dir.display());
    let vs = nn::VarStore::new(device);
    let model = BasicModel::new(vs.root(), &hparams, None)?;
    let mut trainer = Trainer::new(model, vs, &hparams)?;
    let stats = trainer.train()?;
    println!(
        "Trained {} steps, final train perplexity {:.2}",
        stats.num_steps(),
        stats.perplexity()
    );
    Ok(())
}

fn infer(args: InferArgs) -> Result<()> {
    let (model, _vs) = load_basic_model(
        &args.checkpoint_dir,
        device(args.cpu),
        Some(args.input.clone()),
    )?;
    let translations = model.infer_file()?;
    tracing::info!(
        "translated {} sentences from {}",
        translations.len(),
        args.input.display()
    );

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    for translation in translations.iter() {
        writeln!(writer, "{}", translation)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("naive_nmt=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Train(args) => train(args),
        Commands::Infer(args) => infer(args),
    }
}
