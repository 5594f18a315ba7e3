use naive_nmt::embeddings::{Embedding, EmbeddingConfig};
use naive_nmt::NmtError;
use std::fs;
use std::path::{Path, PathBuf};
use tch::Device;

const SOURCE_VOCAB: &str = "<unk>\n<s>\n</s>\nthe\ncat\nsat\n";
const TARGET_VOCAB: &str = "<unk>\n<s>\n</s>\nle\nchat\n";

fn write_file(dir: &Path, name: &str, content: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, content)?;
    Ok(path)
}

#[test]
fn embedding_lookup_shapes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src_vocab = write_file(dir.path(), "vocab.src", SOURCE_VOCAB)?;
    let tgt_vocab = write_file(dir.path(), "vocab.tgt", TARGET_VOCAB)?;
    let config = EmbeddingConfig::new(&src_vocab, &tgt_vocab, 8, 6, Device::Cpu);

    let embedding = Embedding::new(&config)?;

    assert_eq!(embedding.source_vocab().size(), 6);
    assert_eq!(embedding.target_vocab().size(), 5);
    assert_eq!(embedding.encoder_embedding().matrix().size(), vec![6, 8]);
    assert_eq!(embedding.decoder_embedding().matrix().size(), vec![5, 6]);
    let inputs = embedding.encoder_embedding_input(&[
        vec!["the", "cat", "sat"],
        vec!["cat", "unseen", "</s>"],
    ])?;
    assert_eq!(inputs.size(), vec![2, 3, 8]);
    let ids = embedding.source_ids(&[vec!["cat", "unseen"]])?;
    assert_eq!(ids.int64_value(&[0, 0]), 4);
    assert_eq!(ids.int64_value(&[0, 1]), 0);
    assert_eq!(embedding.var_stores().len(), 2);
    Ok(())
}

#[test]
fn shared_vocabulary_shares_the_matrix() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let vocab = write_file(dir.path(), "vocab", SOURCE_VOCAB)?;
    let config = EmbeddingConfig {
        share_vocab: true,
        ..EmbeddingConfig::new(&vocab, &vocab, 8, 8, Device::Cpu)
    };

    let embedding = Embedding::new(&config)?;

    assert_eq!(embedding.var_stores().len(), 1);
    let encoder_matrix = embedding.encoder_embedding().matrix();
    let decoder_matrix = embedding.decoder_embedding().matrix();
    assert_eq!(
        (encoder_matrix - decoder_matrix)
            .abs()
            .max()
            .double_value(&[]),
        0.0
    );
    Ok(())
}

#[test]
fn shared_vocabulary_with_different_sizes_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src_vocab = write_file(dir.path(), "vocab.src", SOURCE_VOCAB)?;
    let tgt_vocab = write_file(dir.path(), "vocab.tgt", TARGET_VOCAB)?;
    let config = EmbeddingConfig {
        share_vocab: true,
        ..EmbeddingConfig::new(&src_vocab, &tgt_vocab, 8, 8, Device::Cpu)
    };

    match Embedding::new(&config) {
        Err(NmtError::ValueError(message)) => {
            assert_eq!(message, "Share embedding but different src/tgt vocab size.")
        }
        _ => panic!("expected a ValueError"),
    }
    Ok(())
}

#[test]
fn configured_vocab_size_must_match_the_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src_vocab = write_file(dir.path(), "vocab.src", SOURCE_VOCAB)?;
    let tgt_vocab = write_file(dir.path(), "vocab.tgt", TARGET_VOCAB)?;
    let config = EmbeddingConfig {
        src_vocab_size: Some(100),
        ..EmbeddingConfig::new(&src_vocab, &tgt_vocab, 8, 8, Device::Cpu)
    };

    assert!(matches!(
        Embedding::new(&config),
        Err(NmtError::ValueError(_))
    ));
    Ok(())
}

#[test]
fn partitioned_embedding_is_read_whole() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src_vocab = write_file(dir.path(), "vocab.src", SOURCE_VOCAB)?;
    let tgt_vocab = write_file(dir.path(), "vocab.tgt", TARGET_VOCAB)?;
    let config = EmbeddingConfig {
        num_partitions: 4,
        ..EmbeddingConfig::new(&src_vocab, &tgt_vocab, 8, 8, Device::Cpu)
    };

    let embedding = Embedding::new(&config)?;

    assert_eq!(embedding.encoder_embedding().num_partitions(), 4);
    assert_eq!(embedding.encoder_embedding().matrix().size(), vec![6, 8]);
    assert_eq!(embedding.decoder_embedding().matrix().size(), vec![5, 8]);
    Ok(())
}

#[test]
fn pretrained_embedding_keeps_special_tokens_trainable() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src_vocab = write_file(dir.path(), "vocab.src", SOURCE_VOCAB)?;
    let tgt_vocab = write_file(dir.path(), "vocab.tgt", TARGET_VOCAB)?;
    let vectors = write_file(
        dir.path(),
        "vectors.txt",
        "the 0.1 0.2 0.3 0.4\ncat 1 2 3 4\nsat -1 -2 -3 -4\n",
    )?;
    let config = EmbeddingConfig {
        src_embedding_file: Some(vectors),
        ..EmbeddingConfig::new(&src_vocab, &tgt_vocab, 8, 8, Device::Cpu)
    };

    let embedding = Embedding::new(&config)?;

    let encoder_embedding = embedding.encoder_embedding();
    assert!(encoder_embedding.is_pretrained());
    // the dimension of the file overrides the configured size
    assert_eq!(encoder_embedding.embedding_size(), 4);
    let matrix = encoder_embedding.matrix();
    assert_eq!(matrix.size(), vec![6, 4]);
    assert!((matrix.double_value(&[4, 1]) - 2.0).abs() < 1e-6);
    assert_eq!(encoder_embedding.var_store().trainable_variables().len(), 1);
    assert_eq!(
        encoder_embedding.var_store().trainable_variables()[0].size(),
        vec![3, 4]
    );
    Ok(())
}

#[test]
fn pretrained_embedding_rejects_partitions() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src_vocab = write_file(dir.path(), "vocab.src", SOURCE_VOCAB)?;
    let tgt_vocab = write_file(dir.path(), "vocab.tgt", TARGET_VOCAB)?;
    let vectors = write_file(dir.path(), "vectors.txt", "the 0.1 0.2\n")?;
    let config = EmbeddingConfig {
        tgt_embedding_file: Some(vectors),
        num_partitions: 2,
        ..EmbeddingConfig::new(&src_vocab, &tgt_vocab, 8, 8, Device::Cpu)
    };

    match Embedding::new(&config) {
        Err(NmtError::ValueError(message)) => assert_eq!(
            message,
            "Can't set num_partitions > 1 when using pretrained embedding"
        ),
        _ => panic!("expected a ValueError"),
    }
    Ok(())
}

#[test]
fn pretrained_embedding_with_missing_token_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src_vocab = write_file(dir.path(), "vocab.src", SOURCE_VOCAB)?;
    let tgt_vocab = write_file(dir.path(), "vocab.tgt", TARGET_VOCAB)?;
    let vectors = write_file(dir.path(), "vectors.txt", "the 0.1 0.2\ncat 1 2\n")?;
    let config = EmbeddingConfig {
        src_embedding_file: Some(vectors),
        ..EmbeddingConfig::new(&src_vocab, &tgt_vocab, 8, 8, Device::Cpu)
    };

    assert!(matches!(
        Embedding::new(&config),
        Err(NmtError::ValueError(_))
    ));
    Ok(())
}
