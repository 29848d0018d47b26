//! ONNX Runtime session construction shared by the detector and the generator.

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;
use tracing::info;

/// Create an ONNX Runtime session with automatic execution provider selection.
///
/// - CUDA on Linux with the `cuda` feature
/// - CoreML on macOS
/// - CPU fallback on all platforms
///
/// Errors are returned as text so each caller can file them under its own
/// error family.
pub(crate) fn create_session(model_path: &Path, purpose: &str) -> Result<Session, String> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| format!("failed to read {}: {}", model_path.display(), e))?;

    let builder = Session::builder()
        .map_err(|e| format!("failed to create session builder: {}", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| format!("failed to set optimization level: {}", e))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!(purpose, "Using CUDA execution provider");
                return Ok(session);
            }
        }
        tracing::debug!(purpose, "CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!(purpose, "Using CoreML execution provider");
                return Ok(session);
            }
        }
        tracing::debug!(purpose, "CoreML execution provider not available, using CPU");
    }

    info!(purpose, model = %model_path.display(), "Using CPU execution provider");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| format!("failed to load ONNX model: {}", e))
}

/// Input and output names, in declaration order.
pub(crate) fn io_names(session: &Session) -> (Vec<String>, Vec<String>) {
    (
        session.inputs.iter().map(|i| i.name.clone()).collect(),
        session.outputs.iter().map(|o| o.name.clone()).collect(),
    )
}
