//! Host memory budget.
//!
//! [`crate::HostAllocator::from_system`] caps the pipeline's total footprint
//! at a share of system RAM.
//!
//! # Environment Variables
//!
//! - `STITCH_MEM_MB` - Explicit budget in megabytes
//! - `STITCH_RAM_PCT` - Budget as percentage of system RAM (clamped to 10-95)

use std::env;
use std::sync::OnceLock;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// Share of system RAM used when no override is set.
pub const SAFE_MEMORY_FRACTION: f64 = 0.80;

/// Assumed RAM when the platform query fails.
const FALLBACK_SYSTEM_MEMORY: u64 = 8 * GIB;

static SYSTEM_MEMORY: OnceLock<u64> = OnceLock::new();

/// Total system RAM in bytes, queried once.
pub fn system_memory() -> u64 {
    *SYSTEM_MEMORY.get_or_init(|| {
        sys_info::mem_info()
            .map(|info| info.total * KIB)
            .unwrap_or(FALLBACK_SYSTEM_MEMORY)
    })
}

/// Allocation budget in bytes.
///
/// `STITCH_MEM_MB` wins over `STITCH_RAM_PCT`; without either the budget is
/// [`SAFE_MEMORY_FRACTION`] of [`system_memory`].
pub fn available_memory() -> u64 {
    budget(system_memory(), env_u64("STITCH_MEM_MB"), env_u64("STITCH_RAM_PCT"))
}

fn budget(system: u64, limit_mb: Option<u64>, ram_pct: Option<u64>) -> u64 {
    if let Some(mb) = limit_mb {
        return mb.saturating_mul(MIB);
    }
    let pct = ram_pct
        .unwrap_or((SAFE_MEMORY_FRACTION * 100.0) as u64)
        .clamp(10, 95);
    system / 100 * pct
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok()?.trim().parse().ok()
}

/// Renders a byte count for log output.
pub fn format_bytes(bytes: u64) -> String {
    match bytes {
        b if b >= GIB => format!("{:.2} GB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.1} MB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{} KB", b / KIB),
        b => format!("{} B", b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_memory() {
        assert!(system_memory() > 0);
    }

    #[test]
    fn test_budget_overrides() {
        let system = 16 * GIB;
        assert_eq!(budget(system, None, None), system / 100 * 80);
        assert_eq!(budget(system, Some(512), Some(50)), 512 * MIB);
        assert_eq!(budget(system, None, Some(50)), system / 2);
        assert_eq!(budget(system, None, Some(100)), system / 100 * 95);
        assert_eq!(budget(system, None, Some(1)), system / 100 * 10);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2 KB");
        assert_eq!(format_bytes(3 * MIB), "3.0 MB");
        assert_eq!(format_bytes(2 * GIB), "2.00 GB");
    }
}
