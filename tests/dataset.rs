use naive_nmt::inputters::shuffle_order;
use tch::{Device, Kind, Tensor};

#[test]
fn shuffling_leaves_the_torch_generator_alone() -> anyhow::Result<()> {
    let options = (Kind::Float, Device::Cpu);

    tch::manual_seed(3);
    let expected = Tensor::rand([16], options);

    tch::manual_seed(3);
    let first = shuffle_order(10, 4, 7);
    let second = shuffle_order(10, 4, 8);
    let draws = Tensor::rand([16], options);

    assert_eq!(first.len(), 10);
    assert_eq!(second.len(), 10);
    assert_eq!((draws - expected).abs().max().double_value(&[]), 0.0);
    Ok(())
}
