use burn::tensor::{backend::Backend, Int, Tensor};

/// Collated windows. Sequences are right padded; `*_lengths` give the
/// number of valid steps of each window.
#[derive(Clone, Debug)]
pub struct BatchItem<B: Backend> {
    pub encoder_cat: Tensor<B, 3, Int>,     // [N, T_enc, C]
    pub encoder_cont: Tensor<B, 3>,         // [N, T_enc, R]
    pub encoder_target: Tensor<B, 2>,       // [N, T_enc]
    pub encoder_lengths: Tensor<B, 1, Int>, // [N]
    pub decoder_cat: Tensor<B, 3, Int>,     // [N, T_dec, C]
    pub decoder_cont: Tensor<B, 3>,         // [N, T_dec, R]
    pub decoder_target: Tensor<B, 2>,       // [N, T_dec]
    pub decoder_lengths: Tensor<B, 1, Int>, // [N]
    pub decoder_time_idx: Tensor<B, 2, Int>, // [N, T_dec]
    pub target_scale: Tensor<B, 2>,         // [N, 2], center and scale
    pub groups: Tensor<B, 2, Int>,          // [N, G]
    pub weight: Option<Tensor<B, 2>>,       // [N, T_dec]
}

impl<B: Backend> BatchItem<B> {
    pub fn batch_size(&self) -> usize {
        self.encoder_lengths.dims()[0]
    }
}
