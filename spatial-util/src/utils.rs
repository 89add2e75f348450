const DEFAULT_BLOCK_SIZE: usize = 1000;

/// Partition `0..ntot` into `(lb, ub)` blocks for parallel processing.
pub fn create_jobs(ntot: usize, block_size: Option<usize>) -> Vec<(usize, usize)> {
    let block_size = match block_size {
        Some(0) | None => DEFAULT_BLOCK_SIZE,
        Some(b) => b,
    };
    let nblock = ntot.div_ceil(block_size);
    (0..nblock)
        .map(|block| {
            let lb = block * block_size;
            let ub = ((block + 1) * block_size).min(ntot);
            (lb, ub)
        })
        .collect()
}
