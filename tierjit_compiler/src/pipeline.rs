//! Compilation pipeline.
//!
//! Drives the analysis stages for one function per request. Every stage is
//! a worker checked out of its own [`AlgorithmPool`], so concurrent
//! compilations never share scratch state:
//!
//! ```text
//!   Compiler
//!   ├── resolvers     AlgorithmPool<Resolver>
//!   ├── call_targets  AlgorithmPool<CallTargetResolver>
//!   ├── inliners      AlgorithmPool<Inliner>
//!   └── inferers      AlgorithmPool<TypeInferer>
//! ```
//!
//! Preparation and resolution run once per module; `compile` runs once per
//! tier transition of a function.

use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::infer::{ProfileSource, Signature, TypeInferer, TypeTable};
use crate::inline::Inliner;
use crate::ir::Module;
use crate::pool::AlgorithmPool;
use crate::resolve::{self, CallTargetResolver, ResolveContext, Resolver};
use std::time::Instant;
use tierjit_runtime::{FunctionId, Runtime};
use tracing::debug;

// =============================================================================
// Requests and Results
// =============================================================================

/// Per-compilation inputs from the execution engine.
#[derive(Clone, Copy, Default)]
pub struct CompileOptions<'a> {
    /// Declared argument types.
    pub signature: Option<&'a Signature>,
    /// Collected profiles; present only when compiling speculatively.
    pub speculation: Option<&'a dyn ProfileSource>,
}

impl<'a> CompileOptions<'a> {
    pub fn baseline() -> Self {
        Self::default()
    }

    pub fn speculative(profiles: &'a dyn ProfileSource) -> Self {
        Self {
            signature: None,
            speculation: Some(profiles),
        }
    }

    pub fn with_signature(mut self, signature: &'a Signature) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// Analysis results for one function at one tier.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub function: FunctionId,
    pub types: TypeTable,
    /// Call sites newly inlined by this compilation.
    pub inlined: usize,
    /// Whether guarded casts were typed from profile data.
    pub speculative: bool,
}

// =============================================================================
// Compiler
// =============================================================================

/// Entry point of the analysis pipeline.
#[derive(Debug)]
pub struct Compiler {
    config: CompilerConfig,
    resolvers: AlgorithmPool<Resolver>,
    call_targets: AlgorithmPool<CallTargetResolver>,
    inliners: AlgorithmPool<Inliner>,
    inferers: AlgorithmPool<TypeInferer>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            resolvers: AlgorithmPool::new(Resolver::new),
            call_targets: AlgorithmPool::new(CallTargetResolver::new),
            inliners: AlgorithmPool::new(Inliner::new),
            inferers: AlgorithmPool::new(TypeInferer::new),
        }
    }

    #[inline]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Create the implicit bindings resolution relies on.
    pub fn prepare(&self, module: &mut Module) {
        resolve::prepare(module);
    }

    /// Resolve every function of the module, starting at the Program.
    pub fn resolve(&self, module: &Module, runtime: &Runtime) -> CompileResult<()> {
        let start = Instant::now();
        let cx = ResolveContext {
            module,
            runtime,
            config: &self.config,
            pool: &self.resolvers,
        };
        self.resolvers.checkout().resolve(&cx, module.program())?;
        debug!(
            functions = module.function_count(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "module resolved"
        );
        Ok(())
    }

    /// Call targets, inlining and type inference for `function`.
    pub fn compile(
        &self,
        module: &mut Module,
        function: FunctionId,
        options: CompileOptions<'_>,
    ) -> CompileResult<CompiledFunction> {
        if !module.function(function).is_analyzed() {
            return Err(CompileError::Unresolved { function });
        }

        if self.config.enable_method_resolution {
            self.call_targets
                .checkout()
                .resolve_function(module, function);
        }
        let inlined = self
            .inliners
            .checkout()
            .run(module, function, &self.config)?;

        let types = if self.config.enable_type_inference {
            let unknown = Signature::unknown();
            let signature = options.signature.unwrap_or(&unknown);
            self.inferers.checkout().infer(
                module,
                function,
                signature,
                options.speculation,
                &self.config,
            )
        } else {
            TypeTable::generic()
        };

        debug!(
            function = %module.function(function).name,
            inlined,
            speculative = options.speculation.is_some(),
            "compiled"
        );
        Ok(CompiledFunction {
            function,
            types,
            inlined,
            speculative: options.speculation.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrBuilder, NodeKind};
    use tierjit_runtime::{BinaryOp, ValueType};

    fn module_with_call() -> (Module, FunctionId) {
        let mut b = IrBuilder::new();
        let outer = b.begin_function("outer", &[]);
        let f = b.begin_function("f", &["a"]);
        let a = b.read("a");
        let one = b.int(1);
        let sum = b.binary(BinaryOp::Add, a, one);
        let ret = b.ret(Some(sum));
        b.end_function(vec![ret]);
        let fd = b.function_decl(f);
        let callee = b.read("f");
        let two = b.int(2);
        let call = b.call(callee, vec![two]);
        let ret = b.ret(Some(call));
        b.end_function(vec![fd, ret]);
        let od = b.function_decl(outer);
        (b.finish(vec![od]).unwrap(), outer)
    }

    #[test]
    fn test_compile_requires_resolution() {
        let (mut module, outer) = module_with_call();
        let compiler = Compiler::new(CompilerConfig::for_testing());
        assert_eq!(
            compiler
                .compile(&mut module, outer, CompileOptions::baseline())
                .unwrap_err(),
            CompileError::Unresolved { function: outer }
        );
    }

    #[test]
    fn test_compile_inlines_and_types() {
        let (mut module, outer) = module_with_call();
        let compiler = Compiler::new(CompilerConfig::for_testing());
        let runtime = Runtime::new();
        compiler.prepare(&mut module);
        compiler.resolve(&module, &runtime).unwrap();
        let compiled = compiler
            .compile(&mut module, outer, CompileOptions::baseline())
            .unwrap();
        assert_eq!(compiled.inlined, 1);
        assert!(!compiled.speculative);

        let call = module.scope(module.function(outer).scope).invocations[0];
        let NodeKind::Call(inv) = &module.node(call).kind else {
            panic!("expected call");
        };
        assert!(inv.inlined.is_some());
        // The argument is an int literal, so the sum is numeric.
        assert_eq!(compiled.types.node(call), ValueType::Double);
        assert_eq!(compiler.inferers.idle(), 1);
    }

    #[test]
    fn test_conservative_config_skips_transforms() {
        let (mut module, outer) = module_with_call();
        let compiler = Compiler::new(CompilerConfig::conservative());
        let runtime = Runtime::new();
        compiler.prepare(&mut module);
        compiler.resolve(&module, &runtime).unwrap();
        let compiled = compiler
            .compile(&mut module, outer, CompileOptions::baseline())
            .unwrap();
        assert_eq!(compiled.inlined, 0);
        assert_eq!(compiled.types, TypeTable::generic());
    }
}
