//! Row-band parallel sweeps on a bounded rayon pool.

use crate::core::error::{BackendError, TransformResult};
use crate::core::types::PixelBuffer;
use crate::filters::{RowSweep, SweepSummary};
use rayon::prelude::*;

/// Bands handed to each worker; more than one evens out uneven rows.
const BANDS_PER_THREAD: usize = 4;

/// Build a pool of exactly `threads` workers.
pub fn build_pool(threads: usize) -> Result<rayon::ThreadPool, BackendError> {
    if threads == 0 {
        return Err(BackendError::InvalidThreadCount(threads));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("pixbench-worker-{}", i))
        .build()
        .map_err(|e| BackendError::ThreadPool(e.to_string()))
}

/// Rows per band for an output of `height` rows on `threads` workers.
pub fn rows_per_band(height: u32, threads: usize) -> usize {
    let bands = threads.max(1) * BANDS_PER_THREAD;
    (height as usize).div_ceil(bands).max(1)
}

/// Evaluate a sweep with disjoint row bands spread over `pool`.
///
/// Each worker writes only its own band and returns a partial summary; the
/// partials are reduced after the workers join.
pub fn sweep_parallel(
    pool: &rayon::ThreadPool,
    sweep: &dyn RowSweep,
    input: &PixelBuffer,
) -> TransformResult<(PixelBuffer, SweepSummary)> {
    let shape = sweep.output_shape(input)?;
    let mut output = shape.allocate()?;
    let rows = rows_per_band(shape.height, pool.current_num_threads());
    let band_len = shape.row_stride() * rows;

    let summary = pool.install(|| {
        output
            .as_mut_slice()
            .par_chunks_mut(band_len)
            .enumerate()
            .map(|(band_index, band)| sweep.sweep_rows(input, band_index * rows, band))
            .reduce(SweepSummary::default, SweepSummary::merge)
    });

    log::trace!(
        "{} swept {} rows in bands of {} on {} workers",
        sweep.name(),
        shape.height,
        rows,
        pool.current_num_threads()
    );
    Ok((output, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Channels, Kernel};
    use crate::filters::{sweep_sequential, BorderPolicy, ConvolutionSweep, ResizeSweep};

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(build_pool(0), Err(BackendError::InvalidThreadCount(0))));
    }

    #[test]
    fn test_rows_per_band() {
        assert_eq!(rows_per_band(100, 4), 7);
        assert_eq!(rows_per_band(3, 16), 1);
        assert_eq!(rows_per_band(64, 2), 8);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let input = PixelBuffer::from_fn(37, 29, Channels::Rgb, |x, y, c| ((x * 7 + y * 13 + c as u32 * 31) % 256) as u8).unwrap();
        let sweep = ConvolutionSweep::new(Kernel::sharpen(), BorderPolicy::Zero);
        let (expected, expected_summary) = sweep_sequential(&sweep, &input).unwrap();
        for threads in [1, 2, 3, 8] {
            let pool = build_pool(threads).unwrap();
            let (output, summary) = sweep_parallel(&pool, &sweep, &input).unwrap();
            assert_eq!(output, expected);
            assert_eq!(summary, expected_summary);
        }
    }

    #[test]
    fn test_parallel_resize_shape() {
        let input = PixelBuffer::filled(20, 11, Channels::Gray, 9).unwrap();
        let pool = build_pool(4).unwrap();
        let (output, summary) = sweep_parallel(&pool, &ResizeSweep::new(0.5), &input).unwrap();
        assert_eq!((output.width(), output.height()), (10, 5));
        assert_eq!(summary.samples, 50);
        assert_eq!(summary.sum, 450);
    }
}
