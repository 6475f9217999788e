use std::sync::atomic::{AtomicUsize, Ordering};

/// Global threshold (output elements, M x N) for switching the block-scaled
/// matmul kernels from sequential to parallel (rayon).
pub(crate) static MMT_PAR_THRESHOLD: AtomicUsize = AtomicUsize::new(4096);

/// Output-element count at or above which the quantized kernels use rayon.
pub fn mmt_par_threshold() -> usize {
    MMT_PAR_THRESHOLD.load(Ordering::Relaxed)
}

/// Runtime configuration for parallelism and thread management.
/// Must be applied (via `apply()`) before any computation to take effect.
pub struct RuntimeConfig {
    /// Number of threads for faer and rayon parallelism.
    /// 0 means auto-detect (use all available cores).
    pub num_threads: usize,
    /// Output elements below which the quantized kernels run sequentially (default 4096).
    pub mmt_par_threshold: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            mmt_par_threshold: 4096,
        }
    }
}

impl RuntimeConfig {
    /// Apply this runtime configuration globally.
    ///
    /// Sets faer's global parallelism and optionally configures
    /// rayon's global thread pool. Writes the kernel threshold
    /// to a global atomic. Must be called before any computation
    /// for settings to take effect.
    pub fn apply(&self) -> Result<(), crate::api::error::TensorError> {
        use faer::{Parallelism, set_global_parallelism};

        if self.num_threads == 0 {
            set_global_parallelism(Parallelism::Rayon(0));
        } else {
            set_global_parallelism(Parallelism::Rayon(self.num_threads));
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads)
                .build_global()
                .map_err(|e| crate::api::error::TensorError::InvalidOperation(
                    format!("Failed to set rayon thread pool: {}", e)
                ))?;
        }

        MMT_PAR_THRESHOLD.store(self.mmt_par_threshold, Ordering::Relaxed);

        log::info!("[runtime] SIMD: {}", Self::detect_simd());
        log::info!("[runtime] Rayon threads: {}", rayon::current_num_threads());

        Ok(())
    }

    /// Detect available SIMD instruction sets.
    pub fn detect_simd() -> &'static str {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                return "AVX2";
            }
            if is_x86_feature_detected!("sse2") {
                return "SSE2";
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            // NEON is always available on aarch64
            return "NEON";
        }
        #[allow(unreachable_code)]
        "scalar"
    }
}

/// Optimization profiles for A/B benchmarking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptProfile {
    /// Default thresholds.
    Optimized,
    /// Never parallelize the quantized kernels.
    Baseline,
    /// Lower threshold (1024) for aggressive parallelism.
    Aggressive,
}

impl OptProfile {
    /// Build a `RuntimeConfig` matching this profile.
    pub fn runtime_config(&self) -> RuntimeConfig {
        match self {
            OptProfile::Optimized => RuntimeConfig::default(),
            OptProfile::Baseline => RuntimeConfig {
                mmt_par_threshold: usize::MAX,
                ..RuntimeConfig::default()
            },
            OptProfile::Aggressive => RuntimeConfig {
                mmt_par_threshold: 1024,
                ..RuntimeConfig::default()
            },
        }
    }
}
