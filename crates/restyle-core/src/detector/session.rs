//! ONNX Runtime session wrapper for the model-backed detectors.
//!
//! Trimmed to what the detectors need: CPU execution, a single `f32` image
//! tensor in, a single `f32` tensor out. Session creation fails cleanly when
//! the model file is absent, which the registry surfaces as a per-call
//! extraction failure.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use log::info;
use ndarray::ArrayD;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

use crate::error::{DetectorError, DetectorResult};

/// A loaded detector model session.
pub struct DetectorSession {
    /// Session has interior mutability requirements; serialize access.
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl DetectorSession {
    /// Load a detector model from an ONNX file.
    pub fn load(model_path: &Path) -> DetectorResult<Self> {
        if !model_path.exists() {
            return Err(DetectorError::Init(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        // Runtime environment init is a process-wide singleton; repeat calls
        // are cheap no-ops.
        let _ = ort::init().commit();

        let session = Session::builder()
            .map_err(|e| DetectorError::Init(format!("session builder failed: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectorError::Init(format!("optimization level failed: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| DetectorError::Init(format!("model load failed: {}", e)))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| DetectorError::init("model declares no inputs"))?;
        let output_name = session
            .outputs()
            .first()
            .map(|output| output.name().to_string())
            .ok_or_else(|| DetectorError::init("model declares no outputs"))?;

        info!(
            "Loaded detector model {} (input '{}', output '{}')",
            model_path.display(),
            input_name,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    /// Run the model on a single image tensor, returning its primary output.
    pub fn run(&self, input: ArrayD<f32>) -> DetectorResult<ArrayD<f32>> {
        let value: Value = Value::from_array(input)
            .map_err(|e| DetectorError::Extraction(format!("input tensor rejected: {}", e)))?
            .into();

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let mut inputs: HashMap<String, Value> = HashMap::new();
        inputs.insert(self.input_name.clone(), value);

        let ort_inputs: Vec<(std::borrow::Cow<'_, str>, ort::session::SessionInputValue<'_>)> =
            inputs
                .into_iter()
                .map(|(name, value)| (std::borrow::Cow::Owned(name), value.into()))
                .collect();

        let outputs = session
            .run(ort::session::SessionInputs::from(ort_inputs))
            .map_err(|e| DetectorError::Extraction(format!("inference failed: {}", e)))?;

        let output = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| DetectorError::Extraction(format!("output extraction failed: {}", e)))?;
        Ok(output.to_owned())
    }

    /// Name of the model's primary input.
    pub fn input_name(&self) -> &str {
        &self.input_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_fails_on_missing_file() {
        let result = DetectorSession::load(Path::new("/nonexistent/depth.onnx"));
        assert!(matches!(result, Err(DetectorError::Init(_))));
    }

    #[test]
    fn test_load_fails_on_invalid_model_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"not a protobuf").unwrap();
        assert!(matches!(
            DetectorSession::load(&path),
            Err(DetectorError::Init(_))
        ));
    }
}
