use burn::data::dataloader::batcher::Batcher;
use burn::tensor::backend::Backend;
use ndarray::s;

use crate::data::batchitem::BatchItem;
use crate::data::item::WindowItem;
use crate::utils::{extend_padded, extend_padded_rows, float_tensor, int_tensor};

/// Pads encoder and decoder parts of the windows independently and stacks
/// them into tensors on `device`.
#[derive(Clone, Debug)]
pub struct Collator<B: Backend> {
    device: B::Device,
}

impl<B: Backend> Collator<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<WindowItem, BatchItem<B>> for Collator<B> {
    fn batch(&self, items: Vec<WindowItem>) -> BatchItem<B> {
        let batch_size = items.len();
        let encoder_len = items.iter().map(|i| i.encoder_length).max().unwrap_or(0);
        let decoder_len = items.iter().map(|i| i.decoder_length).max().unwrap_or(0);
        let n_cat = items.first().map(|i| i.x_cat.ncols()).unwrap_or(0);
        let n_cont = items.first().map(|i| i.x_cont.ncols()).unwrap_or(0);
        let n_groups = items.first().map(|i| i.groups.len()).unwrap_or(0);
        let has_weight = !items.is_empty() && items.iter().all(|i| i.weight.is_some());

        let mut encoder_cat = Vec::with_capacity(batch_size * encoder_len * n_cat);
        let mut encoder_cont = Vec::with_capacity(batch_size * encoder_len * n_cont);
        let mut encoder_target = Vec::with_capacity(batch_size * encoder_len);
        let mut decoder_cat = Vec::with_capacity(batch_size * decoder_len * n_cat);
        let mut decoder_cont = Vec::with_capacity(batch_size * decoder_len * n_cont);
        let mut decoder_target = Vec::with_capacity(batch_size * decoder_len);
        let mut decoder_time_idx = Vec::with_capacity(batch_size * decoder_len);
        let mut weight = Vec::with_capacity(batch_size * decoder_len);
        let mut encoder_lengths = Vec::with_capacity(batch_size);
        let mut decoder_lengths = Vec::with_capacity(batch_size);
        let mut target_scale = Vec::with_capacity(batch_size * 2);
        let mut groups = Vec::with_capacity(batch_size * n_groups);

        for item in items.iter() {
            let split = item.encoder_length;
            extend_padded_rows(&mut encoder_cat, item.x_cat.slice(s![..split, ..]), encoder_len, 0);
            extend_padded_rows(&mut encoder_cont, item.x_cont.slice(s![..split, ..]), encoder_len, 0.0);
            extend_padded(&mut encoder_target, &item.encoder_target, encoder_len, 0.0);
            extend_padded_rows(&mut decoder_cat, item.x_cat.slice(s![split.., ..]), decoder_len, 0);
            extend_padded_rows(&mut decoder_cont, item.x_cont.slice(s![split.., ..]), decoder_len, 0.0);
            extend_padded(&mut decoder_target, &item.decoder_target, decoder_len, 0.0);

            // padded steps continue the time axis
            let decoder_times = &item.time_idx[split..];
            let last = decoder_times.last().copied().unwrap_or_default();
            decoder_time_idx.extend_from_slice(decoder_times);
            decoder_time_idx.extend((1..=(decoder_len - decoder_times.len()) as i64).map(|k| last + k));

            if let Some(w) = &item.weight {
                extend_padded(&mut weight, w, decoder_len, 0.0);
            }
            encoder_lengths.push(item.encoder_length as i64);
            decoder_lengths.push(item.decoder_length as i64);
            target_scale.extend_from_slice(&item.target_scale);
            groups.extend_from_slice(&item.groups);
        }

        let device = &self.device;
        BatchItem {
            encoder_cat: int_tensor(encoder_cat, [batch_size, encoder_len, n_cat], device),
            encoder_cont: float_tensor(encoder_cont, [batch_size, encoder_len, n_cont], device),
            encoder_target: float_tensor(encoder_target, [batch_size, encoder_len], device),
            encoder_lengths: int_tensor(encoder_lengths, [batch_size], device),
            decoder_cat: int_tensor(decoder_cat, [batch_size, decoder_len, n_cat], device),
            decoder_cont: float_tensor(decoder_cont, [batch_size, decoder_len, n_cont], device),
            decoder_target: float_tensor(decoder_target, [batch_size, decoder_len], device),
            decoder_lengths: int_tensor(decoder_lengths, [batch_size], device),
            decoder_time_idx: int_tensor(decoder_time_idx, [batch_size, decoder_len], device),
            target_scale: float_tensor(target_scale, [batch_size, 2], device),
            groups: int_tensor(groups, [batch_size, n_groups], device),
            weight: has_weight.then(|| float_tensor(weight, [batch_size, decoder_len], device)),
        }
    }
}
