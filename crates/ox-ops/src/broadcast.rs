use ox_core::Shape;

/// For every element of `output` (row-major), the flat offset of the
/// `input` element it reads under multidirectional broadcasting.
///
/// `output` must be a broadcast of `input`.
pub(crate) fn broadcast_offsets(input: &Shape, output: &Shape) -> Vec<usize> {
    let rank = output.rank();
    let pad = rank - input.rank();

    let mut strides = vec![0_usize; rank];
    let mut stride = 1_usize;
    for axis in (0..input.rank()).rev() {
        let dim = input.dims[axis] as usize;
        if dim != 1 {
            strides[axis + pad] = stride;
        }
        stride *= dim;
    }

    let count = output
        .dims
        .iter()
        .fold(1_usize, |acc, dim| acc * (*dim as usize));
    let mut offsets = Vec::with_capacity(count);
    let mut index = vec![0_usize; rank];
    for _ in 0..count {
        offsets.push(
            index
                .iter()
                .zip(strides.iter())
                .map(|(i, s)| i * s)
                .sum(),
        );
        for axis in (0..rank).rev() {
            index[axis] += 1;
            if index[axis] < output.dims[axis] as usize {
                break;
            }
            index[axis] = 0;
        }
    }
    offsets
}
