//! Stacked bidirectional GRU encoder.
//!
//! Each layer runs one GRU left-to-right and one over the time-reversed input;
//! the backward outputs are flipped back and concatenated with the forward
//! outputs along the feature axis.

use candle_core::{Result, Tensor};
use candle_nn::{Dropout, GRU, GRUConfig, ModuleT, RNN, VarBuilder, gru};

struct BiGruLayer {
    forward: GRU,
    backward: GRU,
}

impl BiGruLayer {
    fn new(in_dim: usize, hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            forward: gru(in_dim, hidden_dim, GRUConfig::default(), vb.pp("forward"))?,
            backward: gru(in_dim, hidden_dim, GRUConfig::default(), vb.pp("backward"))?,
        })
    }

    /// `[batch, seq, in]` -> `[batch, seq, 2 * hidden]`
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let fwd = run_gru(&self.forward, xs)?;
        let bwd = run_gru(&self.backward, &reverse_time(xs)?)?;
        let bwd = reverse_time(&bwd)?;

        Tensor::cat(&[&fwd, &bwd], 2)
    }
}

/// Hidden state at every timestep, `[batch, seq, hidden]`.
///
/// `GRU::states_to_tensor` concatenates along the feature axis, giving
/// `[batch, seq * hidden]`.
fn run_gru(gru: &GRU, xs: &Tensor) -> Result<Tensor> {
    let (batch, seq_len, _) = xs.dims3()?;
    let states = gru.states_to_tensor(&gru.seq(xs)?)?;
    states.reshape((batch, seq_len, ()))
}

/// Flip a `[batch, seq, ...]` tensor along the time axis.
fn reverse_time(xs: &Tensor) -> Result<Tensor> {
    let seq_len = xs.dim(1)?;
    let idx: Vec<u32> = (0..seq_len as u32).rev().collect();
    let idx = Tensor::from_vec(idx, seq_len, xs.device())?;
    xs.index_select(&idx, 1)
}

pub struct BiGru {
    layers: Vec<BiGruLayer>,
    dropout: Dropout,
    hidden_dim: usize,
}

impl BiGru {
    pub fn new(
        in_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let layer_in = if i == 0 { in_dim } else { 2 * hidden_dim };
            layers.push(BiGruLayer::new(layer_in, hidden_dim, vb.pp(format!("l{i}")))?);
        }
        Ok(Self {
            layers,
            dropout: Dropout::new(dropout),
            hidden_dim,
        })
    }

    /// Width of each output timestep.
    pub fn output_dim(&self) -> usize {
        2 * self.hidden_dim
    }
}

impl ModuleT for BiGru {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut out = xs.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            if i > 0 {
                out = self.dropout.forward_t(&out, train)?;
            }
            out = layer.forward(&out)?;
        }
        Ok(out)
    }
}
