//! Compiler configuration.

// =============================================================================
// Configuration
// =============================================================================

/// Switches and limits for the analysis pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerConfig {
    /// Run type inference; when off every symbol and expression is boxed.
    pub enable_type_inference: bool,
    /// Resolve call targets statically.
    pub enable_method_resolution: bool,
    /// Splice eligible callees into their call sites.
    pub enable_inlining: bool,
    /// Cost ceiling for an inlined callee body.
    pub max_inline_cost: u32,
    /// Resolve sibling sub-functions on the rayon pool.
    pub enable_parallel_analysis: bool,
    /// Skip runtime checks for guarded casts whose operand is already concrete.
    pub enable_guard_elimination: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            enable_type_inference: true,
            enable_method_resolution: true,
            enable_inlining: true,
            max_inline_cost: 150,
            enable_parallel_analysis: true,
            enable_guard_elimination: true,
        }
    }
}

impl CompilerConfig {
    /// Analysis without any optimizing transform.
    pub fn conservative() -> Self {
        Self {
            enable_type_inference: false,
            enable_method_resolution: false,
            enable_inlining: false,
            enable_guard_elimination: false,
            ..Default::default()
        }
    }

    /// Deterministic single-threaded configuration used by tests.
    pub fn for_testing() -> Self {
        Self {
            enable_parallel_analysis: false,
            ..Default::default()
        }
    }

    /// Whether the inliner may run at all.
    #[inline]
    pub fn inlining_enabled(&self) -> bool {
        self.enable_inlining && self.enable_method_resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.max_inline_cost, 150);
        assert!(config.inlining_enabled());
    }

    #[test]
    fn test_inlining_needs_method_resolution() {
        let config = CompilerConfig {
            enable_method_resolution: false,
            ..CompilerConfig::default()
        };
        assert!(!config.inlining_enabled());
        assert!(!CompilerConfig::conservative().inlining_enabled());
    }
}
