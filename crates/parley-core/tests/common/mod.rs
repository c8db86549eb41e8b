#![allow(dead_code)]

use std::path::PathBuf;

use parley_core::EngineHandle;
use parley_core::parley_abi::{Backend, ContextParameters, ModelParameters, Scoped};
use parley_scripted::ScriptedBackend;

/// Any existing file will do for the scripted backend.
pub fn model_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml")
}

pub fn context_params(context_size: usize, batch_size: usize) -> ContextParameters {
    ContextParameters {
        context_size,
        thread_count: 1,
        batch_size,
    }
}

/// Model + context straight from the backend, bypassing the session.
pub fn engine(
    backend: &mut ScriptedBackend,
    context_size: usize,
    batch_size: usize,
) -> anyhow::Result<EngineHandle<ScriptedBackend>> {
    let model = backend.load_model(&model_path(), &ModelParameters::default())?;
    let context = backend.new_context(&model, &context_params(context_size, batch_size))?;
    let eot = backend
        .vocab()
        .control("<|eot_id|>")
        .ok_or_else(|| anyhow::anyhow!("vocabulary has no <|eot_id|>"))?;
    Ok(EngineHandle::new(
        Scoped::new(model),
        Scoped::new(context),
        eot,
        batch_size,
    ))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}
