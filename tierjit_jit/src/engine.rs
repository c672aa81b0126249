//! Tiering engine.
//!
//! The engine owns the module, the runtime and every piece of generated
//! code, and decides per invocation which tier runs:
//!
//! ```text
//!   1st call ─────────────▶ Baseline
//!   later calls ──────────▶ Profiling            (profiling enabled)
//!   hot and profiled ─────▶ Speculative          (not blacklisted)
//!        │ deopt
//!        ▼
//!   resume in fallback, drop speculative code, blacklist
//! ```
//!
//! Generated code is cached per `(function, tier, signature)`. Baseline and
//! profiling code is compiled for the argument types of the call that needs
//! it; speculative code is compiled once for the unknown signature and
//! relies on its guards. Profile records are shared by all tiers of a
//! function and grow when a recompilation adds profile sites.

use crate::codegen::{
    Baseline, CodeGenerator, NativeCode, Profiling, ProfileLookup, SpeculationOptions, Tier,
    generate_speculative,
};
use crate::config::{EngineConfig, TierConfig};
use crate::deopt::{DeoptState, Deoptimizer};
use crate::error::{JitError, JitResult};
use crate::exec::{ExecOutcome, Executor, Host};
use crate::frame::Frame;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use tierjit_compiler::{CompileOptions, Compiler, Module, ProfileSource, Signature};
use tierjit_runtime::{
    Closure, FunctionId, FunctionProfile, NativeFunction, ObjectRef, ProfileConfig, ProfileCounts,
    PropertyFlags, Runtime, RuntimeError, RuntimeResult, Value, ValueType,
};
use tracing::{debug, info, warn};

// =============================================================================
// Profile Registry
// =============================================================================

/// Profile records of all functions, created on first invocation.
#[derive(Debug)]
pub struct ProfileRegistry {
    profiles: DashMap<FunctionId, Arc<FunctionProfile>>,
    config: ProfileConfig,
}

impl ProfileRegistry {
    pub fn new(config: ProfileConfig) -> Self {
        Self {
            profiles: DashMap::new(),
            config,
        }
    }

    /// The record of `function`, created with room for `counts` sites.
    pub fn get_or_create(&self, function: FunctionId, counts: ProfileCounts) -> Arc<FunctionProfile> {
        self.profiles
            .entry(function)
            .or_insert_with(|| Arc::new(FunctionProfile::new(function, counts, self.config)))
            .clone()
    }

    pub fn get(&self, function: FunctionId) -> Option<Arc<FunctionProfile>> {
        self.profiles.get(&function).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl ProfileSource for ProfileRegistry {
    fn hot_type(&self, function: FunctionId, index: u32) -> Option<ValueType> {
        self.get(function)?.hot_type(index)
    }
}

impl ProfileLookup for ProfileRegistry {
    fn profile(&self, function: FunctionId) -> Option<Arc<FunctionProfile>> {
        self.get(function)
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Per-function tiering state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionStats {
    /// Tier of the most recent invocation.
    pub tier: Option<Tier>,
    /// Speculation failed once; the function stays generic.
    pub blacklisted: bool,
    pub deopts: u32,
    pub invocations: u32,
}

// =============================================================================
// Engine
// =============================================================================

type CodeKey = (FunctionId, Tier, Signature);

/// Owns a module and runs it through the tiers.
pub struct Engine {
    module: RwLock<Module>,
    runtime: Runtime,
    compiler: Compiler,
    tiers: TierConfig,
    profiles: ProfileRegistry,
    code: DashMap<CodeKey, Arc<NativeCode>>,
    stats: DashMap<FunctionId, FunctionStats>,
    deoptimizer: Deoptimizer,
}

impl Engine {
    /// Prepare and resolve `module` against a fresh runtime.
    pub fn new(mut module: Module, config: EngineConfig) -> JitResult<Self> {
        let runtime = Runtime::with_inherited_capacity(config.tiers.inherited_cache_capacity);
        runtime.define_global(
            "eval",
            Value::Native(NativeFunction {
                name: "eval",
                func: eval,
            }),
            PropertyFlags::default_data(),
        );

        let compiler = Compiler::new(config.compiler);
        compiler.prepare(&mut module);
        compiler.resolve(&module, &runtime)?;

        info!(
            functions = module.function_count(),
            profiling = config.tiers.enable_profiling,
            speculation = config.tiers.enable_speculation,
            deoptimization = config.tiers.enable_deoptimization,
            "engine ready"
        );
        Ok(Self {
            module: RwLock::new(module),
            runtime,
            compiler,
            profiles: ProfileRegistry::new(config.tiers.profile_config()),
            tiers: config.tiers,
            code: DashMap::new(),
            stats: DashMap::new(),
            deoptimizer: Deoptimizer::new(),
        })
    }

    #[inline]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn module(&self) -> RwLockReadGuard<'_, Module> {
        self.module.read()
    }

    pub fn tiers(&self) -> &TierConfig {
        &self.tiers
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    /// Run the Program.
    pub fn run(&self) -> JitResult<Value> {
        let program = self.module.read().program();
        let global = self.runtime.global().clone();
        self.invoke(program, global, Value::Undefined, Vec::new())
    }

    /// Call the global function `name`.
    pub fn call(&self, name: &str, args: Vec<Value>) -> JitResult<Value> {
        let field = self.runtime.intern(name);
        if !self.runtime.has_global(field) {
            return Err(JitError::UnknownFunction(name.to_string()));
        }
        let callee = self.runtime.get_global(field)?;
        if !callee.is_callable() {
            return Err(JitError::UnknownFunction(name.to_string()));
        }
        self.call_value(&callee, Value::Undefined, args)
    }

    /// Call any callable value.
    pub fn call_value(&self, callee: &Value, this: Value, args: Vec<Value>) -> JitResult<Value> {
        match callee {
            Value::Function(closure) => Host::call(self, closure, this, args),
            Value::Native(native) => Ok((native.func)(&this, &args)?),
            other => Err(RuntimeError::type_error(format!("{other} is not a function")).into()),
        }
    }

    /// Function id of the first function called `name`.
    pub fn function_id(&self, name: &str) -> Option<FunctionId> {
        self.module.read().function_by_name(name)
    }

    pub fn stats(&self, function: FunctionId) -> FunctionStats {
        self.stats.get(&function).map(|s| *s).unwrap_or_default()
    }

    /// Cached code of `function` at `tier`, compiled for any signature.
    pub fn code(&self, function: FunctionId, tier: Tier) -> Option<Arc<NativeCode>> {
        self.code
            .iter()
            .find(|entry| entry.key().0 == function && entry.key().1 == tier)
            .map(|entry| entry.value().clone())
    }

    /// Cached code of `function` at `tier` compiled for `signature`.
    pub fn code_with_signature(&self, function: FunctionId, tier: Tier, signature: &Signature) -> Option<Arc<NativeCode>> {
        self.code
            .get(&(function, tier, signature.clone()))
            .map(|code| code.clone())
    }

    pub fn profile(&self, function: FunctionId) -> Option<Arc<FunctionProfile>> {
        self.profiles.get(function)
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    fn invoke(&self, function: FunctionId, context: ObjectRef, this: Value, args: Vec<Value>) -> JitResult<Value> {
        let (counts, params) = {
            let module = self.module.read();
            let meta = module.function(function);
            (meta.profile_counts, meta.params.len())
        };
        let profile = self.profiles.get_or_create(function, counts);
        let executions = profile.record_execution();
        let tier = self.select_tier(function, &profile, executions);
        let signature = match tier {
            Tier::Speculative => Signature::unknown(),
            Tier::Baseline | Tier::Profiling => call_signature(&args, params),
        };
        let code = self.code_for(function, tier, signature, &profile)?;

        let frame = Frame::new(&code.layout, context, this, args);
        match Executor::new(self, Some(&profile)).run(&code, frame)? {
            ExecOutcome::Return(value) => Ok(value),
            ExecOutcome::Deopt(state) => self.deoptimize(&code, *state, &profile),
        }
    }

    fn select_tier(&self, function: FunctionId, profile: &FunctionProfile, executions: u32) -> Tier {
        let mut stats = self.stats.entry(function).or_default();
        stats.invocations += 1;
        let tier = if self.tiers.enable_speculation
            && !stats.blacklisted
            && profile.is_hot(self.tiers.hot_threshold)
            && profile.is_populated()
        {
            Tier::Speculative
        } else if executions > 1 && self.tiers.enable_profiling {
            Tier::Profiling
        } else {
            Tier::Baseline
        };
        if stats.tier != Some(tier) {
            debug!(%function, from = ?stats.tier, to = %tier, "tier transition");
        }
        stats.tier = Some(tier);
        tier
    }

    fn code_for(
        &self,
        function: FunctionId,
        tier: Tier,
        signature: Signature,
        profile: &FunctionProfile,
    ) -> JitResult<Arc<NativeCode>> {
        let key = (function, tier, signature);
        if let Some(code) = self.code.get(&key) {
            return Ok(code.clone());
        }

        let mut module = self.module.write();
        let options = match tier {
            Tier::Speculative => CompileOptions::speculative(&self.profiles),
            Tier::Baseline | Tier::Profiling => CompileOptions::baseline(),
        }
        .with_signature(&key.2);
        let compiled = self.compiler.compile(&mut module, function, options)?;
        profile.ensure_capacity(module.function(function).profile_counts);
        let module = RwLockWriteGuard::downgrade(module);

        let runtime = &self.runtime;
        let types = &compiled.types;
        let code = match tier {
            Tier::Baseline => CodeGenerator::new(&module, runtime, types, function, Baseline).generate()?,
            Tier::Profiling => CodeGenerator::new(&module, runtime, types, function, Profiling).generate()?,
            Tier::Speculative => {
                let options = SpeculationOptions {
                    deoptimize: self.tiers.enable_deoptimization,
                    inline_caches: self.tiers.enable_inline_cache,
                };
                generate_speculative(&module, runtime, types, function, &self.profiles, options)?
            }
        };
        drop(module);

        debug!(%function, %tier, signature = ?key.2, "code generated");
        let code = Arc::new(code);
        self.code.insert(key, code.clone());
        Ok(code)
    }

    /// Continue a failed speculative activation in fallback code and stop
    /// speculating on the function.
    fn deoptimize(&self, code: &NativeCode, state: DeoptState, profile: &FunctionProfile) -> JitResult<Value> {
        let function = code.function;
        self.code.remove(&(function, Tier::Speculative, Signature::unknown()));
        let deopts = {
            let mut stats = self.stats.entry(function).or_default();
            stats.blacklisted = true;
            stats.deopts += 1;
            stats.deopts
        };
        warn!(
            %function,
            reason = %state.site.reason,
            expected = %state.site.expected,
            observed = %state.observed,
            deopts,
            "speculation failed, function blacklisted"
        );

        let resumption = self.deoptimizer.materialize(code, state)?;
        match Executor::new(self, Some(profile)).resume(&resumption.code, resumption.frame, resumption.pc)? {
            ExecOutcome::Return(value) => Ok(value),
            ExecOutcome::Deopt(_) => Err(JitError::NestedDeopt { function }),
        }
    }
}

impl Host for Engine {
    fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    fn call(&self, closure: &Arc<Closure>, this: Value, args: Vec<Value>) -> JitResult<Value> {
        self.invoke(closure.function, closure.context.clone(), this, args)
    }
}

/// Types of the arguments bound to the `params` formals; formals the caller
/// leaves out are `undefined`.
fn call_signature(args: &[Value], params: usize) -> Signature {
    let types: Vec<ValueType> = (0..params)
        .map(|i| args.get(i).map_or(ValueType::Undefined, Value::value_type))
        .collect();
    Signature::of(&types)
}

/// `eval` without a source front end: the argument is already code, so its
/// value is the result.
fn eval(_this: &Value, args: &[Value]) -> RuntimeResult<Value> {
    Ok(args.first().cloned().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierjit_compiler::IrBuilder;
    use tierjit_runtime::BinaryOp;

    /// `function add(a, b) { return a + b; }`
    fn add_module() -> Module {
        let mut b = IrBuilder::new();
        let f = b.begin_function("add", &["a", "b"]);
        let a = b.read("a");
        let bb = b.read("b");
        let sum = b.binary(BinaryOp::Add, a, bb);
        let ret = b.ret(Some(sum));
        b.end_function(vec![ret]);
        let fd = b.function_decl(f);
        b.finish(vec![fd]).unwrap()
    }

    #[test]
    fn test_tiers_progress_with_invocations() {
        let engine = Engine::new(add_module(), EngineConfig::for_testing()).unwrap();
        engine.run().unwrap();
        let add = engine.function_id("add").unwrap();

        let mut tiers = Vec::new();
        for i in 0..5 {
            let result = engine.call("add", vec![Value::Int32(i), Value::Int32(1)]).unwrap();
            assert!(matches!(result, Value::Int32(n) if n == i + 1));
            tiers.push(engine.stats(add).tier.unwrap());
        }
        assert_eq!(tiers[0], Tier::Baseline);
        assert_eq!(tiers[1], Tier::Profiling);
        assert_eq!(*tiers.last().unwrap(), Tier::Speculative);
        assert_eq!(engine.stats(add).invocations, 5);
        assert!(engine.code(add, Tier::Speculative).is_some());
    }

    #[test]
    fn test_baseline_only_never_profiles() {
        let engine = Engine::new(add_module(), EngineConfig::baseline_only()).unwrap();
        engine.run().unwrap();
        let add = engine.function_id("add").unwrap();
        for _ in 0..10 {
            engine.call("add", vec![Value::Int32(1), Value::Int32(2)]).unwrap();
        }
        assert_eq!(engine.stats(add).tier, Some(Tier::Baseline));
        assert!(!engine.profile(add).unwrap().is_populated());
        assert!(engine.code(add, Tier::Profiling).is_none());
    }

    #[test]
    fn test_unknown_function() {
        let engine = Engine::new(add_module(), EngineConfig::for_testing()).unwrap();
        engine.run().unwrap();
        assert!(matches!(
            engine.call("missing", vec![]),
            Err(JitError::UnknownFunction(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_eval_returns_its_argument() {
        let mut b = IrBuilder::new();
        let seven = b.int(7);
        let call = b.eval_call(vec![seven]);
        let ret = b.ret(Some(call));
        let module = b.finish(vec![ret]).unwrap();
        let engine = Engine::new(module, EngineConfig::for_testing()).unwrap();
        assert!(matches!(engine.run().unwrap(), Value::Int32(7)));
    }

    #[test]
    fn test_registry_serves_profiles() {
        let registry = ProfileRegistry::new(ProfileConfig::default());
        assert!(registry.is_empty());
        let counts = ProfileCounts {
            guards: 1,
            maps: 0,
            calls: 0,
        };
        let profile = registry.get_or_create(FunctionId(3), counts);
        profile.record_type(0, ValueType::Double);
        assert!(Arc::ptr_eq(&profile, &registry.get_or_create(FunctionId(3), counts)));
        assert_eq!(registry.hot_type(FunctionId(3), 0), Some(ValueType::Double));
        assert!(registry.profile(FunctionId(4)).is_none());
        assert_eq!(registry.len(), 1);
    }
}
