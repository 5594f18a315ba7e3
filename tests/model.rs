use naive_nmt::hparams::{HParams, OptimizerType};
use naive_nmt::inputters::{Batch, Inputter, Mode};
use naive_nmt::models::BasicModel;
use naive_nmt::rnn::UnitType;
use naive_nmt::training::{load_basic_model, Trainer};
use std::fs;
use std::path::Path;
use tch::{nn, Device};

const SOURCE_VOCAB: &str = "<unk>\n<s>\n</s>\na\nb\nc\nd\n";
const TARGET_VOCAB: &str = "<unk>\n<s>\n</s>\nx\ny\nz\n";
const SOURCE_TEXT: &str = "a b c\nb c d\na d\nc c a b\nd a\nb\n";
const TARGET_TEXT: &str = "x y\ny z\nx\nz z x y\ny x\nz\n";

fn hparams(dir: &Path) -> anyhow::Result<HParams> {
    let data = |name: &str, content: &str| -> anyhow::Result<Option<std::path::PathBuf>> {
        let path = dir.join(name);
        fs::write(&path, content)?;
        Ok(Some(path))
    };
    Ok(HParams {
        source_train_file: data("train.src", SOURCE_TEXT)?,
        target_train_file: data("train.tgt", TARGET_TEXT)?,
        source_dev_file: data("dev.src", SOURCE_TEXT)?,
        target_dev_file: data("dev.tgt", TARGET_TEXT)?,
        source_test_file: data("test.src", "a b\nc d a\n")?,
        source_vocab_file: data("vocab.src", SOURCE_VOCAB)?,
        target_vocab_file: data("vocab.tgt", TARGET_VOCAB)?,
        out_dir: dir.join("model"),
        source_embedding_size: 8,
        target_embedding_size: 8,
        num_units: 8,
        num_encoder_layers: 2,
        num_decoder_layers: 2,
        unit_type: UnitType::Lstm,
        dropout: 0.0,
        batch_size: 2,
        infer_batch_size: 2,
        tgt_max_len_infer: 6,
        optimizer: OptimizerType::Sgd,
        learning_rate: 0.5,
        num_train_steps: 4,
        steps_per_stats: 2,
        steps_per_external_eval: 4,
        ..Default::default()
    })
}

fn first_training_batch(model: &BasicModel) -> anyhow::Result<Batch> {
    let mut batches = model
        .inputter()
        .iterator(Mode::Train, model.hparams(), 0)?;
    Ok(batches.next().expect("training data is not empty"))
}

#[test]
fn forward_pass_and_loss() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hparams = hparams(dir.path())?;
    let vs = nn::VarStore::new(Device::Cpu);
    let model = BasicModel::new(vs.root(), &hparams, None)?;
    let batch = first_training_batch(&model)?;

    let logits = model.forward_t(&batch, true)?;

    let max_target_length = batch.target_length.as_ref().unwrap().iter().max().copied();
    assert_eq!(
        logits.size(),
        vec![batch.batch_size(), max_target_length.unwrap(), 6]
    );
    let loss = model.compute_loss(&logits, &batch)?;
    assert!(loss.loss.double_value(&[]) > 0.0);
    assert_eq!(loss.predict_count, batch.target_word_count());
    Ok(())
}

#[test]
fn greedy_and_beam_inference() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hparams = hparams(dir.path())?;
    let vs = nn::VarStore::new(Device::Cpu);
    let greedy = BasicModel::new(vs.root(), &hparams, None)?;

    let translations = greedy.infer(&["a b c", "d", "b a"])?;
    assert_eq!(translations.len(), 3);
    for translation in translations.iter() {
        assert!(translation.split(' ').filter(|t| !t.is_empty()).count() <= 6);
        assert!(!translation.contains("</s>"));
    }

    let beam_hparams = HParams {
        beam_width: 3,
        length_penalty_weight: 1.0,
        ..hparams
    };
    let beam_vs = nn::VarStore::new(Device::Cpu);
    let beam = BasicModel::new(beam_vs.root(), &beam_hparams, None)?;
    let translations = beam.infer_file()?;
    assert_eq!(translations.len(), 2);
    Ok(())
}

#[test]
fn training_reduces_loss_and_checkpoints() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hparams = hparams(dir.path())?;
    let vs = nn::VarStore::new(Device::Cpu);
    let model = BasicModel::new(vs.root(), &hparams, None)?;
    let batch = first_training_batch(&model)?;
    let mut trainer = Trainer::new(model, vs, &hparams)?;

    let first = trainer.train_step(&batch)?;
    let mut last = first;
    for _ in 0..20 {
        last = trainer.train_step(&batch)?;
    }
    assert!(last.loss < first.loss);

    let stats = trainer.train()?;
    assert_eq!(stats.num_steps(), 4);
    assert!(trainer.evaluate(Mode::Eval)?.is_finite());
    assert!(hparams.out_dir.join("model.ot").exists());
    assert!(hparams.out_dir.join("hparams.json").exists());

    let sentences = ["a b c", "c d"];
    let expected = trainer.model().infer(&sentences)?;
    let (restored, _vs) = load_basic_model(&hparams.out_dir, Device::Cpu, None)?;
    assert_eq!(restored.infer(&sentences)?, expected);
    Ok(())
}

#[test]
fn mismatched_layers_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hparams = HParams {
        num_decoder_layers: 4,
        ..hparams(dir.path())?
    };
    let vs = nn::VarStore::new(Device::Cpu);
    assert!(BasicModel::new(vs.root(), &hparams, None).is_err());
    Ok(())
}
