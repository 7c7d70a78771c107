//! Sandbox runtime: Wasmtime engine, program loading, and metered execution.
//!
//! The `Sandbox` struct is the main entry point. It loads a program,
//! validates its imports, injects gas metering, and provides `execute` for
//! running an entry function under a gas budget.
//!
//! Every run gets a fresh `Store` and instance; nothing survives between
//! runs except the compiled `Program`.

use std::fmt;
use std::sync::Arc;

use meterbridge_hostapi::HostApi;
use wasmtime::{Config, Engine, Linker, Module, Store, Trap, Val, WasmBacktrace};

use crate::cancel::CancelToken;
use crate::config::{ImportResolution, SandboxConfig};
use crate::error::SandboxError;
use crate::gas_policy::{inject_metering, parse_module, ConstantGasPolicy, GasPolicy};
use crate::host_impl::HostState;
use crate::linker::{self, register_host_functions, MEMORY_EXPORT};
use crate::memory;
use crate::result::{Failure, Outcome, ReturnValue};
use crate::validation::{resolve_entry, resolve_imports, ImportManifest};

/// A validated, metered and compiled program. Cheap to clone; may be
/// executed any number of times.
#[derive(Clone)]
pub struct Program {
    module: Module,
    manifest: ImportManifest,
}

impl Program {
    /// The compiled, metered module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// What the program imports from the host.
    pub fn manifest(&self) -> &ImportManifest {
        &self.manifest
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

/// Parameters of a single run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub entry: String,
    pub gas_limit: u64,
    /// Copied over the start of linear memory before the entry runs.
    pub memory_image: Option<Vec<u8>>,
    pub cancel: CancelToken,
}

impl Invocation {
    pub fn new(entry: impl Into<String>, gas_limit: u64) -> Self {
        Self {
            entry: entry.into(),
            gas_limit,
            memory_image: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_memory_image(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.memory_image = Some(image.into());
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// The gas-metered execution sandbox.
///
/// Holds the engine and gas policy; programs loaded through it are
/// metered with that policy.
pub struct Sandbox {
    engine: Engine,
    config: SandboxConfig,
    policy: Arc<dyn GasPolicy>,
}

impl Sandbox {
    /// Create a sandbox charging `config.gas_per_instruction` per instruction.
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        let engine = create_engine(&config)?;
        let policy = Arc::new(ConstantGasPolicy::new(config.gas_per_instruction));
        Ok(Self {
            engine,
            config,
            policy,
        })
    }

    /// Replace the gas policy. Affects programs loaded afterwards.
    pub fn with_policy(mut self, policy: impl GasPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Validate, meter and compile a program.
    ///
    /// Accepts binary Wasm or Wasm text.
    pub fn load(&self, code: &[u8]) -> Result<Program, SandboxError> {
        if code.is_empty() {
            return Err(SandboxError::InvalidInput("empty program".into()));
        }
        let wasm = wat::parse_bytes(code).map_err(|e| SandboxError::InvalidProgram(e.to_string()))?;
        Module::validate(&self.engine, &wasm)
            .map_err(|e| SandboxError::InvalidProgram(e.to_string()))?;

        let mut parsed = parse_module(&wasm)?;
        let manifest = resolve_imports(&parsed, &self.config)?;
        memory::expose_memory(&mut parsed)?;
        let metered = inject_metering(parsed, self.policy.as_ref())?;
        let module = Module::new(&self.engine, &metered)
            .map_err(|e| SandboxError::InvalidProgram(e.to_string()))?;

        tracing::debug!(
            code_len = code.len(),
            metered_len = metered.len(),
            imports = manifest.functions.len(),
            unresolved = manifest.unresolved().count(),
            "program loaded"
        );
        Ok(Program { module, manifest })
    }

    /// Run `invocation.entry` of `program` in a fresh instance.
    pub fn execute(
        &self,
        program: &Program,
        invocation: &Invocation,
        host: Arc<dyn HostApi>,
    ) -> Result<Outcome, Failure> {
        if invocation.entry.is_empty() {
            return Err(SandboxError::InvalidInput("empty entry name".into()).into());
        }
        resolve_entry(&program.module, &invocation.entry)?;

        // 1. Fresh store with gas meter and memory limits
        let state = HostState::new(
            invocation.gas_limit,
            host,
            invocation.cancel.clone(),
            self.config.max_memory_bytes(),
        );
        let mut store = Store::new(&self.engine, state);
        store.limiter(|s| &mut s.limits);

        // 2. Linker with host imports and whatever the program imports
        let mut linker = Linker::new(&self.engine);
        register_host_functions(&mut linker, &self.config)?;
        if self.config.import_resolution == ImportResolution::Lazy {
            linker::define_unresolved_stubs(&mut linker, &program.module, &program.manifest)?;
        }
        if let Some(limits) = program.manifest.memory {
            linker::define_imported_memory(&mut store, &mut linker, &self.config, limits)?;
        }
        if let Some(limits) = program.manifest.table {
            linker::define_imported_table(&mut store, &mut linker, &self.config, limits)?;
        }

        // 3. Instantiate (runs the start function, if any)
        let instance = linker
            .instantiate(&mut store, &program.module)
            .map_err(|e| classify_error(e, store.data()))?;

        // 4. Locate linear memory and apply the caller's image. Loading
        // exported any memory the program has; only memoryless programs
        // get a detached buffer.
        let wasm_memory = match instance.get_memory(&mut store, MEMORY_EXPORT) {
            Some(m) => m,
            None => linker::detached_memory(&mut store, &self.config)
                .map_err(|e| fail(e, &store))?,
        };
        if let Some(image) = &invocation.memory_image {
            memory::apply_image(wasm_memory.data_mut(&mut store), image)
                .map_err(|e| fail(e, &store))?;
        }

        // 5. Call the entry
        let func = instance
            .get_func(&mut store, &invocation.entry)
            .ok_or_else(|| fail(SandboxError::EntryNotFound(invocation.entry.clone()), &store))?;
        let mut results = vec![Val::I32(0); func.ty(&store).results().len()];
        func.call(&mut store, &[], &mut results)
            .map_err(|e| classify_error(e, store.data()))?;

        let value =
            ReturnValue::from_results(&invocation.entry, &results).map_err(|e| fail(e, &store))?;
        let gas_consumed = store.data().gas_consumed();
        tracing::debug!(
            entry = %invocation.entry,
            gas_consumed,
            gas_remaining = store.data().gas_meter.remaining(),
            import_calls = store.data().import_calls,
            "run completed"
        );
        Ok(Outcome {
            gas_consumed,
            value,
        })
    }

    /// Load and execute in one step.
    pub fn run(
        &self,
        code: &[u8],
        invocation: &Invocation,
        host: Arc<dyn HostApi>,
    ) -> Result<Outcome, Failure> {
        let program = self.load(code)?;
        self.execute(&program, invocation, host)
    }
}

fn fail(error: SandboxError, store: &Store<HostState>) -> Failure {
    Failure::new(error, store.data().gas_consumed())
}

/// Turn an error raised while guest code was on the stack into a `Failure`.
///
/// Errors raised by our own host functions come back as `SandboxError`;
/// engine traps as `Trap`. The guest backtrace rides along as context.
fn classify_error(err: wasmtime::Error, state: &HostState) -> Failure {
    let backtrace = err
        .downcast_ref::<WasmBacktrace>()
        .map(|bt| bt.to_string())
        .filter(|bt| !bt.trim().is_empty());
    let error = match err.downcast::<SandboxError>() {
        Ok(error) => error,
        Err(err) => match err.downcast_ref::<Trap>() {
            Some(trap) => SandboxError::GuestTrapped(trap.to_string()),
            None => SandboxError::Wasmtime(err),
        },
    };
    let failure = Failure::new(error, state.gas_consumed());
    match backtrace {
        Some(bt) => failure.with_backtrace(bt),
        None => failure,
    }
}

/// Create a Wasmtime engine with deterministic configuration.
fn create_engine(config: &SandboxConfig) -> Result<Engine, SandboxError> {
    let mut wasm_config = Config::new();

    // Determinism enforcement
    wasm_config.wasm_threads(false);
    wasm_config.wasm_simd(false);
    wasm_config.wasm_relaxed_simd(false);
    wasm_config.wasm_multi_memory(false);
    wasm_config.cranelift_nan_canonicalization(true);

    // Guest call stacks for failure diagnostics
    wasm_config.wasm_backtrace(true);

    // Memory limits
    let max_bytes = config.max_memory_bytes() as u64;
    wasm_config.memory_guaranteed_dense_image_size(max_bytes.min(16 * 1024 * 1024));

    Ok(Engine::new(&wasm_config)?)
}
