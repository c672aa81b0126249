//! Engine and tiering configuration.

use tierjit_compiler::CompilerConfig;
use tierjit_runtime::ProfileConfig;
use tierjit_runtime::object::InheritedPropertyCache;

// =============================================================================
// Tier Configuration
// =============================================================================

/// Switches and thresholds for tier transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct TierConfig {
    /// Use profiling code after the first invocation.
    pub enable_profiling: bool,
    /// Recompile hot, profiled functions speculatively.
    pub enable_speculation: bool,
    /// Resume failed speculation in fallback code; when off, a failed guard
    /// raises an ordinary error.
    pub enable_deoptimization: bool,
    /// Let speculative code use inline caches for property and global access.
    pub enable_inline_cache: bool,
    /// A function is hot after more than this many invocations.
    pub hot_threshold: u32,
    /// A guard site with more misses than this has no hot type.
    pub max_type_misses: u32,
    /// Share of observations a type needs to count as hot.
    pub hotness_ratio: f64,
    /// Entries in the inherited-property cache.
    pub inherited_cache_capacity: usize,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            enable_profiling: true,
            enable_speculation: true,
            enable_deoptimization: true,
            enable_inline_cache: true,
            hot_threshold: 6,
            max_type_misses: 3,
            hotness_ratio: 0.8,
            inherited_cache_capacity: InheritedPropertyCache::DEFAULT_CAPACITY,
        }
    }
}

impl TierConfig {
    /// Baseline code only; no profiles are collected.
    pub fn baseline_only() -> Self {
        Self {
            enable_profiling: false,
            enable_speculation: false,
            ..Default::default()
        }
    }

    /// Thresholds for the profile records this configuration creates.
    pub fn profile_config(&self) -> ProfileConfig {
        ProfileConfig {
            max_misses: self.max_type_misses,
            hotness_ratio: self.hotness_ratio,
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Full engine configuration: analysis pipeline plus tiering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub compiler: CompilerConfig,
    pub tiers: TierConfig,
}

impl EngineConfig {
    pub fn baseline_only() -> Self {
        Self {
            compiler: CompilerConfig::default(),
            tiers: TierConfig::baseline_only(),
        }
    }

    /// Deterministic analysis and a low hotness threshold.
    pub fn for_testing() -> Self {
        Self {
            compiler: CompilerConfig::for_testing(),
            tiers: TierConfig {
                hot_threshold: 2,
                ..Default::default()
            },
        }
    }
}
