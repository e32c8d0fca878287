//! Utility functions.

use crate::{CoplayError, Result};

/// Whether a CUDA accelerator is usable in this build
pub fn accelerator_available() -> bool {
    #[cfg(feature = "torch")]
    {
        tch::Cuda::is_available()
    }
    #[cfg(not(feature = "torch"))]
    {
        false
    }
}

/// Fail with a configuration error when an accelerator is required but missing
pub fn check_accelerator(required: bool, available: bool) -> Result<()> {
    if required && !available {
        return Err(CoplayError::Config(
            "an accelerator was requested (--cuda) but none is available".into(),
        ));
    }
    Ok(())
}

/// Seed torch and pick deterministic kernels
#[cfg(feature = "torch")]
pub fn configure_torch(seed: u64, deterministic: bool) {
    tch::manual_seed(seed as i64);
    if tch::Cuda::is_available() {
        tch::Cuda::manual_seed_all(seed);
        tch::Cuda::cudnn_set_benchmark(!deterministic);
    }
}

/// Abbreviate large numbers for display
pub fn abbreviate(num: u64) -> String {
    if num < 1_000 {
        format!("{}", num)
    } else if num < 1_000_000 {
        format!("{:.1}K", num as f64 / 1_000.0)
    } else if num < 1_000_000_000 {
        format!("{:.1}M", num as f64 / 1_000_000.0)
    } else {
        format!("{:.1}B", num as f64 / 1_000_000_000.0)
    }
}

/// Format duration in human-readable form
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 {
        return "0s".to_string();
    }

    let secs = seconds as u64;
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;

    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}
