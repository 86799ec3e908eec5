use std::path::PathBuf;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use brainsim_core::{
    BackendDevice, Error, KernelLoadFailure, KernelRuntime, KernelSpec, LaunchCapability,
    LaunchDims, LoadError, TensorShape,
};

type AttemptLog = Arc<Mutex<Vec<(usize, LaunchCapability)>>>;

/// Stands in for a device runtime; which platform features exist is
/// configurable per test, and every load attempt is recorded.
struct FakeBackend {
    device_side_launch: bool,
    devrt_present: bool,
    broken_modules: Vec<PathBuf>,
    attempts: AttemptLog,
    load_delay: Duration,
}

struct FakeModule;

impl FakeBackend {
    /// A platform where everything works.
    fn full() -> Self {
        Self {
            device_side_launch: true,
            devrt_present: true,
            broken_modules: Vec::new(),
            attempts: Arc::new(Mutex::new(Vec::new())),
            load_delay: Duration::ZERO,
        }
    }

    /// Shared view of the attempt log, usable after the backend is moved
    /// into a runtime.
    fn attempt_log(&self) -> AttemptLog {
        self.attempts.clone()
    }
}

impl BackendDevice for FakeBackend {
    type Module = FakeModule;

    fn load_module(
        &self,
        ordinal: usize,
        spec: &KernelSpec,
        capability: LaunchCapability,
    ) -> Result<FakeModule, LoadError> {
        self.attempts.lock().unwrap().push((ordinal, capability));
        thread::sleep(self.load_delay);
        match capability {
            LaunchCapability::Basic => {}
            LaunchCapability::ExtendedLinkage => {
                if !self.devrt_present {
                    return Err(LoadError::PlatformCapabilityUnavailable {
                        capability,
                        detail: "device runtime library not found".to_string(),
                    });
                }
            }
            LaunchCapability::DynamicParallelism => {
                if !self.device_side_launch || !self.devrt_present {
                    return Err(LoadError::PlatformCapabilityUnavailable {
                        capability,
                        detail: "device-side launches not supported".to_string(),
                    });
                }
            }
        }
        if self.broken_modules.contains(&spec.module_path) {
            return Err(LoadError::ModuleLoad {
                detail: format!("no kernel image at {}", spec.module_path.display()),
            });
        }
        Ok(FakeModule)
    }
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn spec() -> KernelSpec {
    KernelSpec::new("kernels/agents.ptx", "step_agents", "StepAgents")
}

fn load_failure(err: Error) -> KernelLoadFailure {
    match err {
        Error::KernelLoad(failure) => failure,
        other => panic!("expected KernelLoadFailure, got {other:?}"),
    }
}

#[test]
fn repeated_requests_reuse_the_handle() {
    init_logs();
    let backend = FakeBackend::full();
    let attempts = backend.attempt_log();
    let runtime = KernelRuntime::new(backend);

    let first = runtime.kernel(0, &spec(), LaunchCapability::Basic).unwrap();
    let second = runtime.kernel(0, &spec(), LaunchCapability::Basic).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.achieved_capability(), LaunchCapability::Basic);
    assert_eq!(first.ordinal(), 0);
    assert_eq!(first.spec(), &spec());
    assert_eq!(*attempts.lock().unwrap(), vec![(0, LaunchCapability::Basic)]);
}

#[test]
fn concurrent_requests_load_once() {
    init_logs();
    let backend = FakeBackend {
        load_delay: Duration::from_millis(50),
        ..FakeBackend::full()
    };
    let attempts = backend.attempt_log();
    let runtime = Arc::new(KernelRuntime::new(backend));

    let barrier = Arc::new(Barrier::new(4));
    let mut workers = Vec::new();
    for _ in 0..4 {
        let runtime = runtime.clone();
        let barrier = barrier.clone();
        workers.push(thread::spawn(move || {
            barrier.wait();
            runtime
                .kernel(0, &spec(), LaunchCapability::ExtendedLinkage)
                .unwrap()
        }));
    }
    let handles: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle));
    }
    assert_eq!(attempts.lock().unwrap().len(), 1);
}

#[test]
fn dynamic_parallelism_degrades_to_extended_linkage() {
    init_logs();
    let runtime = KernelRuntime::new(FakeBackend {
        device_side_launch: false,
        ..FakeBackend::full()
    });
    let handle = runtime
        .kernel(0, &spec(), LaunchCapability::DynamicParallelism)
        .unwrap();
    assert_eq!(
        handle.achieved_capability(),
        LaunchCapability::ExtendedLinkage
    );
}

#[test]
fn degraded_result_is_cached_under_the_fallback_key_only() {
    init_logs();
    let backend = FakeBackend {
        device_side_launch: false,
        ..FakeBackend::full()
    };
    let attempts = backend.attempt_log();
    let runtime = KernelRuntime::new(backend);

    let first = runtime
        .kernel(0, &spec(), LaunchCapability::DynamicParallelism)
        .unwrap();
    let second = runtime
        .kernel(0, &spec(), LaunchCapability::DynamicParallelism)
        .unwrap();
    let direct = runtime
        .kernel(0, &spec(), LaunchCapability::ExtendedLinkage)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &direct));

    // Each dynamic-parallelism request probes the platform again; only the
    // first one performs the extended-linkage load, the rest hit the cache.
    assert_eq!(
        *attempts.lock().unwrap(),
        vec![
            (0, LaunchCapability::DynamicParallelism),
            (0, LaunchCapability::ExtendedLinkage),
            (0, LaunchCapability::DynamicParallelism),
        ]
    );
}

#[test]
fn fallback_without_device_runtime_library_fails() {
    init_logs();
    let runtime = KernelRuntime::new(FakeBackend {
        device_side_launch: false,
        devrt_present: false,
        ..FakeBackend::full()
    });
    let err = runtime
        .kernel(0, &spec(), LaunchCapability::DynamicParallelism)
        .unwrap_err();
    let failure = load_failure(err);
    assert_eq!(failure.requested, LaunchCapability::ExtendedLinkage);
    assert!(matches!(
        failure.cause,
        LoadError::PlatformCapabilityUnavailable { .. }
    ));
}

#[test]
fn broken_module_fails_without_fallback() {
    init_logs();
    let backend = FakeBackend {
        broken_modules: vec![PathBuf::from("kernels/agents.ptx")],
        ..FakeBackend::full()
    };
    let attempts = backend.attempt_log();
    let runtime = KernelRuntime::new(backend);

    let err = runtime
        .kernel(0, &spec(), LaunchCapability::Basic)
        .unwrap_err();
    let failure = load_failure(err);
    assert_eq!(failure.requested, LaunchCapability::Basic);
    assert!(matches!(failure.cause, LoadError::ModuleLoad { .. }));
    assert_eq!(attempts.lock().unwrap().len(), 1);
}

#[test]
fn extended_linkage_unavailable_is_fatal() {
    init_logs();
    let backend = FakeBackend {
        devrt_present: false,
        ..FakeBackend::full()
    };
    let attempts = backend.attempt_log();
    let runtime = KernelRuntime::new(backend);

    let err = runtime
        .kernel(0, &spec(), LaunchCapability::ExtendedLinkage)
        .unwrap_err();
    let failure = load_failure(err);
    assert_eq!(failure.requested, LaunchCapability::ExtendedLinkage);
    assert!(matches!(
        failure.cause,
        LoadError::PlatformCapabilityUnavailable { .. }
    ));
    assert_eq!(attempts.lock().unwrap().len(), 1);
}

#[test]
fn capability_is_part_of_the_key() {
    init_logs();
    let backend = FakeBackend::full();
    let attempts = backend.attempt_log();
    let runtime = KernelRuntime::new(backend);

    let extended = runtime
        .kernel(0, &spec(), LaunchCapability::ExtendedLinkage)
        .unwrap();
    let basic = runtime.kernel(0, &spec(), LaunchCapability::Basic).unwrap();
    assert!(!Arc::ptr_eq(&extended, &basic));
    assert_eq!(
        extended.achieved_capability(),
        LaunchCapability::ExtendedLinkage
    );
    assert_eq!(basic.achieved_capability(), LaunchCapability::Basic);
    assert_eq!(
        *attempts.lock().unwrap(),
        vec![
            (0, LaunchCapability::ExtendedLinkage),
            (0, LaunchCapability::Basic),
        ]
    );
}

#[test]
fn failures_are_cached_and_shared() {
    init_logs();
    let backend = FakeBackend {
        broken_modules: vec![PathBuf::from("kernels/agents.ptx")],
        load_delay: Duration::from_millis(50),
        ..FakeBackend::full()
    };
    let attempts = backend.attempt_log();
    let runtime = Arc::new(KernelRuntime::new(backend));

    let barrier = Arc::new(Barrier::new(2));
    let mut workers = Vec::new();
    for _ in 0..2 {
        let runtime = runtime.clone();
        let barrier = barrier.clone();
        workers.push(thread::spawn(move || {
            barrier.wait();
            runtime
                .kernel(0, &spec(), LaunchCapability::Basic)
                .unwrap_err()
                .to_string()
        }));
    }
    let messages: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(messages[0], messages[1]);
    assert_eq!(attempts.lock().unwrap().len(), 1);
}

#[test]
fn devices_load_independently() {
    init_logs();
    let backend = FakeBackend::full();
    let attempts = backend.attempt_log();
    let runtime = KernelRuntime::new(backend);

    let on_zero = runtime.kernel(0, &spec(), LaunchCapability::Basic).unwrap();
    let on_one = runtime.kernel(1, &spec(), LaunchCapability::Basic).unwrap();
    assert!(!Arc::ptr_eq(&on_zero, &on_one));
    assert_eq!(on_zero.ordinal(), 0);
    assert_eq!(on_one.ordinal(), 1);
    assert_eq!(attempts.lock().unwrap().len(), 2);

    // The runtime reuses the cache it created for each ordinal.
    assert!(Arc::ptr_eq(&runtime.cache(0), &runtime.cache(0)));
}

#[test]
fn launch_dims_round_up_to_whole_blocks() {
    assert_eq!(LaunchDims::for_element_count(1).grid, (1, 1, 1));
    assert_eq!(LaunchDims::for_element_count(256).grid, (1, 1, 1));
    assert_eq!(LaunchDims::for_element_count(257).grid, (2, 1, 1));
    assert_eq!(LaunchDims::for_element_count(0).grid, (1, 1, 1));

    let shape = TensorShape::new([2, 3, 4]).unwrap();
    let dims = LaunchDims::for_shape(&shape);
    assert_eq!(dims.block, (256, 1, 1));
    assert_eq!(dims.grid, (1, 1, 1));
}
