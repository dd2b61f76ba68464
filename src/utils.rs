use burn::tensor::{backend::Backend, Data, Int, Shape, Tensor};
use ndarray::ArrayView2;

/// Float tensor with shape `dims` from row-major values.
pub fn float_tensor<B: Backend, const D: usize>(
    values: Vec<f32>,
    dims: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    let data = Data::new(values, Shape::new(dims));
    Tensor::from_data_device(data.convert(), device)
}

pub fn int_tensor<B: Backend, const D: usize>(
    values: Vec<i64>,
    dims: [usize; D],
    device: &B::Device,
) -> Tensor<B, D, Int> {
    let data = Data::new(values, Shape::new(dims));
    Tensor::from_data_device(data.convert(), device)
}

/// Appends `values` followed by `fill` up to `length` elements.
pub fn extend_padded<T: Copy>(out: &mut Vec<T>, values: &[T], length: usize, fill: T) {
    out.extend_from_slice(values);
    out.extend(std::iter::repeat(fill).take(length.saturating_sub(values.len())));
}

/// Appends the rows of `rows` in row-major order followed by `fill` rows up
/// to `length` rows.
pub fn extend_padded_rows<T: Copy>(out: &mut Vec<T>, rows: ArrayView2<T>, length: usize, fill: T) {
    let width = rows.ncols();
    out.extend(rows.iter().copied());
    out.extend(std::iter::repeat(fill).take(length.saturating_sub(rows.nrows()) * width));
}
