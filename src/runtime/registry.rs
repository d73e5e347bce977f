//! Process-wide runtime instance

use std::sync::{Arc, Mutex, Once, PoisonError};

use crate::{
    channel::UnixConnector,
    error::{Result, RuntimeError},
};

use super::{client::Runtime, config::RuntimeConfig};

/// Strategy used to build the process runtime on first access
///
/// Install a custom factory with [`install_factory`] to run against a test
/// broker or a different transport.
pub trait RuntimeFactory: Send + Sync {
    fn create(&self, name: &str) -> Result<Runtime>;
}

/// Builds the runtime over Unix datagram sockets
#[derive(Debug, Clone, Default)]
pub struct DefaultRuntimeFactory {
    config: RuntimeConfig,
    connector: UnixConnector,
}

impl DefaultRuntimeFactory {
    pub fn new(config: RuntimeConfig, connector: UnixConnector) -> Self {
        Self { config, connector }
    }
}

impl RuntimeFactory for DefaultRuntimeFactory {
    fn create(&self, name: &str) -> Result<Runtime> {
        Runtime::new(name, self.config.clone(), &self.connector)
    }
}

#[derive(Default)]
struct RuntimeRegistry {
    factory: Option<Box<dyn RuntimeFactory>>,
    instance: Option<Arc<Runtime>>,
    created: bool,
}

lazy_static::lazy_static! {
    static ref REGISTRY: Mutex<RuntimeRegistry> = Mutex::new(RuntimeRegistry::default());
}

static AT_EXIT: Once = Once::new();

/// Replace the factory used to create the runtime
///
/// Fails once the runtime has been created.
pub fn install_factory(factory: Box<dyn RuntimeFactory>) -> Result<()> {
    let mut registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    if registry.created {
        return Err(RuntimeError::invalid_parameter(
            "factory",
            "Runtime factory cannot be replaced after the runtime was created",
        ));
    }
    registry.factory = Some(factory);
    Ok(())
}

/// Whether the process runtime exists
pub fn is_initialized() -> bool {
    REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .instance
        .is_some()
}

/// The process runtime, created with `name` on first call
///
/// Later calls return the existing runtime whatever name they pass.
pub fn try_instance(name: &str) -> Result<Arc<Runtime>> {
    let mut registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(runtime) = &registry.instance {
        return Ok(Arc::clone(runtime));
    }
    if registry.created {
        return Err(RuntimeError::platform("Runtime has already been torn down"));
    }

    let runtime = match &registry.factory {
        Some(factory) => factory.create(name)?,
        None => DefaultRuntimeFactory::default().create(name)?,
    };
    let runtime = Arc::new(runtime);

    registry.instance = Some(Arc::clone(&runtime));
    registry.created = true;
    AT_EXIT.call_once(|| {
        if unsafe { libc::atexit(release_runtime) } != 0 {
            log::warn!("could not register runtime teardown at exit");
        }
    });

    Ok(runtime)
}

/// The process runtime, created with `name` on first call
///
/// A runtime that cannot be created leaves the process unable to take part
/// in communication; the failure is logged and the process aborts.
pub fn instance(name: &str) -> Arc<Runtime> {
    match try_instance(name) {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Cannot initialize runtime for {}: {}", name, e);
            std::process::abort();
        }
    }
}

extern "C" fn release_runtime() {
    // a thread still inside try_instance at exit keeps its runtime
    let released = match REGISTRY.try_lock() {
        Ok(mut registry) => registry.instance.take(),
        Err(_) => None,
    };
    drop(released);
}
