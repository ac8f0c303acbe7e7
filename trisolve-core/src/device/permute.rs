//! Row permutation kernels for dense `[n, n_rhs]` blocks.

use super::handle::DeviceHandle;
use crate::scalar::Scalar;
use rayon::prelude::*;

/// `dst[i, :] = src[perm[i], :]`
pub fn permute_gather<T: Scalar>(
    device: &DeviceHandle,
    perm: &[i32],
    src: &[T],
    dst: &mut [T],
    n_rhs: usize,
) {
    if n_rhs == 0 {
        return;
    }
    debug_assert_eq!(src.len(), perm.len() * n_rhs);
    debug_assert_eq!(dst.len(), perm.len() * n_rhs);

    device.pool().install(|| {
        dst.par_chunks_mut(n_rhs)
            .zip(perm.par_iter())
            .for_each(|(row, &p)| {
                let from = p as usize * n_rhs;
                row.copy_from_slice(&src[from..from + n_rhs]);
            });
    });
}

/// `dst[perm[i], :] = src[i, :]`, written as a gather through `inv`.
pub fn permute_scatter<T: Scalar>(
    device: &DeviceHandle,
    inv: &[i32],
    src: &[T],
    dst: &mut [T],
    n_rhs: usize,
) {
    permute_gather(device, inv, src, dst, n_rhs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;

    #[test]
    fn test_gather_scatter_inverse() {
        let dev = DeviceHandle::new(DeviceConfig {
            workers: 2,
            ..DeviceConfig::default()
        })
        .unwrap();
        let perm = [2, 0, 1];
        let inv = [1, 2, 0];
        let src = [10.0, 11.0, 20.0, 21.0, 30.0, 31.0];
        let mut mid = [0.0; 6];
        permute_gather(&dev, &perm, &src, &mut mid, 2);
        assert_eq!(mid, [30.0, 31.0, 10.0, 11.0, 20.0, 21.0]);

        let mut back = [0.0; 6];
        permute_scatter(&dev, &inv, &mid, &mut back, 2);
        assert_eq!(back, src);
    }
}
