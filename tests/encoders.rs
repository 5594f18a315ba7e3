use naive_nmt::encoders::{BasicEncoder, EncoderConfig, EncoderType};
use naive_nmt::inputters::Mode;
use naive_nmt::rnn::{CellState, UnitType};
use naive_nmt::NmtError;
use tch::{nn, Device, Kind, Tensor};

const BATCH_SIZE: i64 = 4;
const TIME_STEPS: i64 = 6;
const DEPTH: i64 = 8;

fn encoder_config(
    encoder_type: EncoderType,
    unit_type: UnitType,
    num_layers: i64,
    time_major: bool,
) -> EncoderConfig {
    EncoderConfig {
        encoder_type,
        unit_type,
        num_layers,
        num_residual_layers: 0,
        input_size: DEPTH,
        num_units: DEPTH,
        forget_bias: 1.0,
        dropout: 0.2,
        init_weight: 0.1,
        time_major,
    }
}

const LENGTHS: [i64; 4] = [6, 3, 5, 1];

fn encoder_inputs(time_major: bool) -> (Tensor, Tensor) {
    let inputs = Tensor::rand([BATCH_SIZE, TIME_STEPS, DEPTH], (Kind::Float, Device::Cpu));
    let inputs = if time_major {
        inputs.transpose(0, 1).contiguous()
    } else {
        inputs
    };
    (inputs, Tensor::from_slice(&LENGTHS))
}

fn max_difference(left: &Tensor, right: &Tensor) -> f64 {
    (left - right).abs().max().double_value(&[])
}

#[test]
fn bidirectional_encoder_outputs_and_states() -> anyhow::Result<()> {
    for unit_type in [
        UnitType::Lstm,
        UnitType::Gru,
        UnitType::LayerNormLstm,
        UnitType::Nas,
    ]
    .iter()
    {
        for num_layers in [2, 4].iter() {
            let vs = nn::VarStore::new(Device::Cpu);
            let config = encoder_config(EncoderType::Bi, *unit_type, *num_layers, true);
            let encoder = BasicEncoder::new(&vs.root() / "encoder", &config)?;
            let (inputs, lengths) = encoder_inputs(true);

            let output = encoder.encode(Mode::Train, &inputs, &lengths)?;

            assert_eq!(
                output.outputs.size(),
                vec![TIME_STEPS, BATCH_SIZE, DEPTH * 2]
            );
            assert_eq!(output.states.len() as i64, *num_layers);
            let states: Vec<Tensor> = output.states.iter().map(CellState::to_tensor).collect();
            let states = Tensor::stack(&states, 0);
            match unit_type {
                UnitType::Gru => assert_eq!(
                    states.size(),
                    vec![*num_layers, BATCH_SIZE, DEPTH]
                ),
                _ => assert_eq!(
                    states.size(),
                    vec![*num_layers, 2, BATCH_SIZE, DEPTH]
                ),
            }
        }
    }
    Ok(())
}

#[test]
fn unidirectional_batch_major_encoder() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = encoder_config(EncoderType::Uni, UnitType::Lstm, 3, false);
    let encoder = BasicEncoder::new(&vs.root() / "encoder", &config)?;
    let (inputs, lengths) = encoder_inputs(false);

    let output = encoder.encode(Mode::Predict, &inputs, &lengths)?;

    assert_eq!(output.outputs.size(), vec![BATCH_SIZE, TIME_STEPS, DEPTH]);
    assert_eq!(output.states.len(), 3);
    // the last sequence has a single valid step
    let padding = output
        .outputs
        .get(3)
        .narrow(0, 1, TIME_STEPS - 1)
        .abs()
        .sum(Kind::Float)
        .double_value(&[]);
    assert_eq!(padding, 0.0);
    Ok(())
}

#[test]
fn bidirectional_encoder_needs_even_layers() {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = encoder_config(EncoderType::Bi, UnitType::Gru, 3, true);
    assert!(matches!(
        BasicEncoder::new(&vs.root() / "encoder", &config),
        Err(NmtError::InvalidConfigurationError(_))
    ));
}

#[test]
fn prediction_is_deterministic() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = encoder_config(EncoderType::Bi, UnitType::Lstm, 2, true);
    let encoder = BasicEncoder::new(&vs.root() / "encoder", &config)?;
    let (inputs, lengths) = encoder_inputs(true);

    let first = encoder.encode(Mode::Predict, &inputs, &lengths)?;
    let second = encoder.encode(Mode::Predict, &inputs, &lengths)?;
    assert_eq!(max_difference(&first.outputs, &second.outputs), 0.0);
    Ok(())
}

#[test]
fn inputs_follow_the_encoder_layout() -> anyhow::Result<()> {
    let batch_major_vs = nn::VarStore::new(Device::Cpu);
    let batch_major = BasicEncoder::new(
        &batch_major_vs.root() / "encoder",
        &encoder_config(EncoderType::Bi, UnitType::Gru, 2, false),
    )?;
    let mut time_major_vs = nn::VarStore::new(Device::Cpu);
    let time_major = BasicEncoder::new(
        &time_major_vs.root() / "encoder",
        &encoder_config(EncoderType::Bi, UnitType::Gru, 2, true),
    )?;
    time_major_vs.copy(&batch_major_vs)?;
    let (inputs, lengths) = encoder_inputs(false);

    let batch_major_output = batch_major.encode(Mode::Predict, &inputs, &lengths)?;
    let time_major_output =
        time_major.encode(Mode::Predict, &inputs.transpose(0, 1), &lengths)?;

    assert_eq!(
        time_major_output.outputs.size(),
        vec![TIME_STEPS, BATCH_SIZE, DEPTH * 2]
    );
    assert!(
        max_difference(
            &time_major_output.outputs.transpose(0, 1),
            &batch_major_output.outputs
        ) < 1e-6
    );
    for (left, right) in time_major_output
        .states
        .iter()
        .zip(batch_major_output.states.iter())
    {
        assert!(max_difference(&left.to_tensor(), &right.to_tensor()) < 1e-6);
    }
    // batch-major inputs given to a time-major encoder disagree with the lengths
    assert!(time_major.encode(Mode::Predict, &inputs, &lengths).is_err());
    Ok(())
}

#[test]
fn bidirectional_states_are_interleaved() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = encoder_config(EncoderType::Bi, UnitType::Gru, 2, true);
    let encoder = BasicEncoder::new(&vs.root() / "encoder", &config)?;
    let (inputs, lengths) = encoder_inputs(true);

    let output = encoder.encode(Mode::Predict, &inputs, &lengths)?;

    assert_eq!(output.states.len(), 2);
    // the backward layer ends on the first step of every sequence
    let backward_outputs = output.outputs.get(0).narrow(1, DEPTH, DEPTH);
    assert!(max_difference(output.states[1].output(), &backward_outputs) < 1e-6);
    // the forward layer ends on the last valid step
    for (batch, length) in LENGTHS.iter().enumerate() {
        let forward_output = output
            .outputs
            .get(*length - 1)
            .get(batch as i64)
            .narrow(0, 0, DEPTH);
        let forward_state = output.states[0].output().get(batch as i64);
        assert!(max_difference(&forward_state, &forward_output) < 1e-6);
    }
    Ok(())
}
