//! A small encoder-decoder Transformer used as a local inference engine.
//!
//! Weights are random (seeded), so replies are not meaningful. The model
//! exists to exercise the generation loop end to end with real tensor
//! shapes: `source [1, S]` and `target [1, T]` in, `output [1, T, V]` out.

use async_trait::async_trait;
use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::engine::{take_input, InferenceEngine, IoNames};
use crate::error::EngineError;
use crate::tensor::{Tensor, TensorMap};

/// Configuration for the encoder-decoder model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelArgs {
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Embedding/hidden dimension.
    pub dim: usize,
    /// Number of layers in each of the encoder and decoder.
    pub n_layers: usize,
    /// Number of attention heads.
    pub n_heads: usize,
    /// Hidden dimension of the feed-forward network.
    pub hidden_dim: usize,
    /// Source positions holding this id are hidden from attention.
    pub pad_id: u32,
    /// Seed for weight initialisation.
    pub seed: u64,
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            vocab_size: 1024,
            dim: 64,
            n_layers: 2,
            n_heads: 4,
            hidden_dim: 256,
            pad_id: 0,
            seed: 42,
        }
    }
}

impl ModelArgs {
    fn validate(&self) -> Result<(), EngineError> {
        if self.vocab_size == 0 || self.dim == 0 || self.n_heads == 0 {
            return Err(EngineError::Backend(
                "vocab_size, dim and n_heads must be positive".to_string(),
            ));
        }
        if self.dim % self.n_heads != 0 {
            return Err(EngineError::Backend(format!(
                "dim {} is not divisible by n_heads {}",
                self.dim, self.n_heads
            )));
        }
        Ok(())
    }
}

fn init_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-0.1..0.1))
}

/// Embedding layer mapping token ids to vectors.
pub struct Embedding {
    weight: Array2<f32>, // vocab_size x dim
}

impl Embedding {
    pub fn new(vocab_size: usize, dim: usize, rng: &mut StdRng) -> Self {
        Self { weight: init_matrix(rng, vocab_size, dim) }
    }

    /// Ids must already be range checked.
    pub fn forward(&self, tokens: &[usize]) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((tokens.len(), self.weight.ncols()));
        for (i, &tok) in tokens.iter().enumerate() {
            out.row_mut(i).assign(&self.weight.row(tok));
        }
        out
    }
}

/// Fully connected layer.
pub struct Linear {
    weight: Array2<f32>, // out x in
    bias: Option<Array1<f32>>,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, bias: bool, rng: &mut StdRng) -> Self {
        let weight = init_matrix(rng, out_features, in_features);
        let bias = bias.then(|| Array1::from_shape_fn(out_features, |_| rng.gen_range(-0.1..0.1)));
        Self { weight, bias }
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut y = x.dot(&self.weight.t());
        if let Some(b) = &self.bias {
            y += &b.view().insert_axis(Axis(0));
        }
        y
    }
}

/// Root mean square layer normalization.
pub struct RMSNorm {
    weight: Array1<f32>,
    eps: f32,
}

impl RMSNorm {
    pub fn new(dim: usize) -> Self {
        Self { weight: Array1::ones(dim), eps: 1e-6 }
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let cols = x.ncols().max(1) as f32;
        let mean = x.mapv(|v| v * v).sum_axis(Axis(1)) / cols;
        let denom = mean.mapv(|m| (m + self.eps).sqrt()).insert_axis(Axis(1));
        let norm = x / &denom;
        norm * &self.weight.view().insert_axis(Axis(0))
    }
}

/// Multi-head attention. Self-attention passes the same matrix as `x` and
/// `memory`; cross-attention passes the encoder output as `memory`.
pub struct Attention {
    wq: Linear,
    wk: Linear,
    wv: Linear,
    wo: Linear,
    n_heads: usize,
    head_dim: usize,
}

impl Attention {
    pub fn new(dim: usize, n_heads: usize, rng: &mut StdRng) -> Self {
        Self {
            wq: Linear::new(dim, dim, false, rng),
            wk: Linear::new(dim, dim, false, rng),
            wv: Linear::new(dim, dim, false, rng),
            wo: Linear::new(dim, dim, false, rng),
            n_heads,
            head_dim: dim / n_heads,
        }
    }

    /// `mask[[i, j]] == false` hides key `j` from query `i`.
    pub fn forward(&self, x: &Array2<f32>, memory: &Array2<f32>, mask: &Array2<bool>) -> Array2<f32> {
        let q = self.wq.forward(x);
        let k = self.wk.forward(memory);
        let v = self.wv.forward(memory);
        let scale = (self.head_dim as f32).sqrt();

        let mut out = Array2::<f32>::zeros((x.nrows(), self.n_heads * self.head_dim));
        for h in 0..self.n_heads {
            let cols = h * self.head_dim..(h + 1) * self.head_dim;
            let qh = q.slice(s![.., cols.clone()]);
            let kh = k.slice(s![.., cols.clone()]);
            let vh = v.slice(s![.., cols.clone()]);

            let mut scores = qh.dot(&kh.t()) / scale;
            scores.zip_mut_with(mask, |score, &keep| {
                if !keep {
                    *score = f32::NEG_INFINITY;
                }
            });
            for mut row in scores.axis_iter_mut(Axis(0)) {
                let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                if max == f32::NEG_INFINITY {
                    // every key masked: attend to nothing
                    row.fill(0.0);
                    continue;
                }
                row.mapv_inplace(|v| (v - max).exp());
                let sum = row.sum();
                row /= sum;
            }
            out.slice_mut(s![.., cols]).assign(&scores.dot(&vh));
        }
        self.wo.forward(&out)
    }
}

/// Feed-forward network using SiLU activation.
pub struct MLP {
    w1: Linear,
    w2: Linear,
}

impl MLP {
    pub fn new(dim: usize, hidden_dim: usize, rng: &mut StdRng) -> Self {
        Self {
            w1: Linear::new(dim, hidden_dim, false, rng),
            w2: Linear::new(hidden_dim, dim, false, rng),
        }
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let hidden = self.w1.forward(x).mapv(|v| v * (1.0 / (1.0 + (-v).exp())));
        self.w2.forward(&hidden)
    }
}

/// Encoder block: bidirectional self-attention then feed-forward.
pub struct EncoderBlock {
    attn_norm: RMSNorm,
    attn: Attention,
    ffn_norm: RMSNorm,
    ffn: MLP,
}

impl EncoderBlock {
    pub fn new(args: &ModelArgs, rng: &mut StdRng) -> Self {
        Self {
            attn_norm: RMSNorm::new(args.dim),
            attn: Attention::new(args.dim, args.n_heads, rng),
            ffn_norm: RMSNorm::new(args.dim),
            ffn: MLP::new(args.dim, args.hidden_dim, rng),
        }
    }

    pub fn forward(&self, x: &Array2<f32>, mask: &Array2<bool>) -> Array2<f32> {
        let h = self.attn_norm.forward(x);
        let x = x + &self.attn.forward(&h, &h, mask);
        let h = self.ffn_norm.forward(&x);
        &x + &self.ffn.forward(&h)
    }
}

/// Decoder block: causal self-attention, cross-attention, feed-forward.
pub struct DecoderBlock {
    self_norm: RMSNorm,
    self_attn: Attention,
    cross_norm: RMSNorm,
    cross_attn: Attention,
    ffn_norm: RMSNorm,
    ffn: MLP,
}

impl DecoderBlock {
    pub fn new(args: &ModelArgs, rng: &mut StdRng) -> Self {
        Self {
            self_norm: RMSNorm::new(args.dim),
            self_attn: Attention::new(args.dim, args.n_heads, rng),
            cross_norm: RMSNorm::new(args.dim),
            cross_attn: Attention::new(args.dim, args.n_heads, rng),
            ffn_norm: RMSNorm::new(args.dim),
            ffn: MLP::new(args.dim, args.hidden_dim, rng),
        }
    }

    pub fn forward(
        &self,
        x: &Array2<f32>,
        memory: &Array2<f32>,
        self_mask: &Array2<bool>,
        cross_mask: &Array2<bool>,
    ) -> Array2<f32> {
        let h = self.self_norm.forward(x);
        let x = x + &self.self_attn.forward(&h, &h, self_mask);
        let h = self.cross_norm.forward(&x);
        let x = &x + &self.cross_attn.forward(&h, memory, cross_mask);
        let h = self.ffn_norm.forward(&x);
        &x + &self.ffn.forward(&h)
    }
}

/// Encoder-decoder Transformer implementing [`InferenceEngine`].
pub struct Seq2SeqTransformer {
    pub args: ModelArgs,
    io: IoNames,
    embed: Embedding,
    encoder: Vec<EncoderBlock>,
    decoder: Vec<DecoderBlock>,
    enc_norm: RMSNorm,
    dec_norm: RMSNorm,
    head: Linear,
}

impl Seq2SeqTransformer {
    pub fn new(args: ModelArgs) -> Result<Self, EngineError> {
        args.validate()?;
        let mut rng = StdRng::seed_from_u64(args.seed);
        let embed = Embedding::new(args.vocab_size, args.dim, &mut rng);
        let encoder = (0..args.n_layers).map(|_| EncoderBlock::new(&args, &mut rng)).collect();
        let decoder = (0..args.n_layers).map(|_| DecoderBlock::new(&args, &mut rng)).collect();
        let head = Linear::new(args.dim, args.vocab_size, false, &mut rng);
        tracing::debug!(?args, "initialised seq2seq transformer");
        Ok(Self {
            enc_norm: RMSNorm::new(args.dim),
            dec_norm: RMSNorm::new(args.dim),
            args,
            io: IoNames::default(),
            embed,
            encoder,
            decoder,
            head,
        })
    }

    pub fn with_io_names(mut self, io: IoNames) -> Self {
        self.io = io;
        self
    }

    /// Logits of shape `[target.len(), vocab_size]`.
    pub fn forward(&self, source: &[usize], target: &[usize]) -> Array2<f32> {
        let pad = self.args.pad_id as usize;
        let keep: Vec<bool> = source.iter().map(|&id| id != pad).collect();

        let enc_mask = Array2::from_shape_fn((source.len(), source.len()), |(_, j)| keep[j]);
        let mut memory = self.embed.forward(source);
        for block in &self.encoder {
            memory = block.forward(&memory, &enc_mask);
        }
        let memory = self.enc_norm.forward(&memory);

        let causal = Array2::from_shape_fn((target.len(), target.len()), |(i, j)| j <= i);
        let cross = Array2::from_shape_fn((target.len(), source.len()), |(_, j)| keep[j]);
        let mut h = self.embed.forward(target);
        for block in &self.decoder {
            h = block.forward(&h, &memory, &causal, &cross);
        }
        let h = self.dec_norm.forward(&h);
        self.head.forward(&h)
    }

    fn ids(&self, name: &str, tensor: &Tensor) -> Result<Vec<usize>, EngineError> {
        let array = tensor.as_int64().ok_or_else(|| EngineError::DType {
            name: name.to_string(),
            expected: "int64",
            found: tensor.dtype(),
        })?;
        let shape = array.shape();
        if shape.len() != 2 || shape[0] != 1 || shape[1] == 0 {
            return Err(EngineError::Shape {
                name: name.to_string(),
                expected: "[1, n] with n > 0".to_string(),
                found: shape.to_vec(),
            });
        }
        array
            .iter()
            .map(|&id| {
                usize::try_from(id)
                    .ok()
                    .filter(|&id| id < self.args.vocab_size)
                    .ok_or(EngineError::TokenOutOfRange { id, vocab_size: self.args.vocab_size })
            })
            .collect()
    }
}

#[async_trait]
impl InferenceEngine for Seq2SeqTransformer {
    async fn run(&self, mut inputs: TensorMap) -> Result<TensorMap, EngineError> {
        let source = take_input(&mut inputs, &self.io.source)?;
        let target = take_input(&mut inputs, &self.io.target)?;
        let source = self.ids(&self.io.source, &source)?;
        let target = self.ids(&self.io.target, &target)?;

        let logits = self.forward(&source, &target);
        let mut outputs = TensorMap::new();
        outputs.insert(
            self.io.output.clone(),
            Tensor::Float32(logits.insert_axis(Axis(0)).into_dyn()),
        );
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_args() -> ModelArgs {
        ModelArgs {
            vocab_size: 40,
            dim: 16,
            n_layers: 1,
            n_heads: 2,
            hidden_dim: 32,
            pad_id: 0,
            seed: 7,
        }
    }

    #[test]
    fn forward_shapes() {
        let model = Seq2SeqTransformer::new(small_args()).unwrap();
        let logits = model.forward(&[4, 5, 0, 0], &[2, 0, 0]);
        assert_eq!(logits.dim(), (3, 40));
        assert!(logits.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn same_seed_same_weights() {
        let a = Seq2SeqTransformer::new(small_args()).unwrap();
        let b = Seq2SeqTransformer::new(small_args()).unwrap();
        assert_eq!(a.forward(&[3, 4], &[1, 2]), b.forward(&[3, 4], &[1, 2]));
    }

    #[test]
    fn decoder_is_causal() {
        let model = Seq2SeqTransformer::new(small_args()).unwrap();
        let a = model.forward(&[5, 6], &[2, 9, 9]);
        let b = model.forward(&[5, 6], &[2, 11, 30]);
        assert_eq!(a.row(0), b.row(0));
    }

    #[test]
    fn all_pad_source_stays_finite() {
        let model = Seq2SeqTransformer::new(small_args()).unwrap();
        let logits = model.forward(&[0, 0, 0], &[2]);
        assert!(logits.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rejects_indivisible_heads() {
        let args = ModelArgs { dim: 10, n_heads: 3, ..small_args() };
        assert!(matches!(Seq2SeqTransformer::new(args), Err(EngineError::Backend(_))));
    }

    #[tokio::test]
    async fn run_produces_named_output() {
        let model = Seq2SeqTransformer::new(small_args()).unwrap();
        let mut inputs = TensorMap::new();
        inputs.insert("source".into(), Tensor::int64_row(&[4, 5, 0]));
        inputs.insert("target".into(), Tensor::int64_row(&[2, 0]));
        let out = model.run(inputs).await.unwrap();
        assert_eq!(out["output"].shape(), &[1, 2, 40]);
    }

    #[tokio::test]
    async fn run_reports_missing_and_bad_inputs() {
        let model = Seq2SeqTransformer::new(small_args()).unwrap();

        let mut inputs = TensorMap::new();
        inputs.insert("source".into(), Tensor::int64_row(&[4]));
        let err = model.run(inputs).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingInput(name) if name == "target"));

        let mut inputs = TensorMap::new();
        inputs.insert("source".into(), Tensor::int64_row(&[4]));
        inputs.insert("target".into(), Tensor::int64_row(&[400]));
        let err = model.run(inputs).await.unwrap_err();
        assert!(matches!(err, EngineError::TokenOutOfRange { id: 400, .. }));
    }
}
