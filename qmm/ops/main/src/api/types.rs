/// Number of elements per q8 block.
pub const Q8_BLOCK_SIZE: usize = 32;

/// Largest value a 4-bit unsigned lane can hold.
pub const U4_MAX: u8 = 0x0F;

/// Activation rows at or below which the kernels parallelize over output
/// columns instead of rows.
pub const SMALL_M: usize = 4;

/// Tile size for weight rows (cache-aware tiled matmul).
pub const TILE_N: usize = 8;

/// Shape metadata of a block-quantized weight set stored as
/// `[N, K_blocks, block_bytes]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Weight rows (N), the output's trailing dimension.
    pub n_rows: usize,
    /// Blocks along the reduction dimension (K_blocks).
    pub blocks_per_row: usize,
    /// Logical elements per block.
    pub block_elems: usize,
    /// Stored bytes per block (`block_elems` for 8-bit, half of it for 4-bit).
    pub block_bytes: usize,
}

impl BlockLayout {
    /// Reduction dimension covered by one weight row.
    pub fn k(&self) -> usize {
        self.blocks_per_row * self.block_elems
    }

    /// Total number of blocks (one scale/offset each).
    pub fn n_blocks(&self) -> usize {
        self.n_rows * self.blocks_per_row
    }

    /// Stored bytes per weight row.
    pub fn row_bytes(&self) -> usize {
        self.blocks_per_row * self.block_bytes
    }

    /// Shape of the per-block scale and offset tensors.
    pub fn param_shape(&self) -> [usize; 3] {
        [self.n_rows, self.blocks_per_row, 1]
    }

    /// (block index, position within block) of reduction index `k`.
    pub fn locate(&self, k: usize) -> (usize, usize) {
        (k / self.block_elems, k % self.block_elems)
    }
}
