//! ONNX Runtime backed scoring model.
//!
//! The feature vector goes in as a `(1, n_features)` f32 tensor; the first
//! element of the first output is taken as the confidence. Sessions are
//! opened lazily per worker thread.
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use once_cell::sync::OnceCell;
use onnxruntime::environment::Environment;
use onnxruntime::ndarray::Array2;
use onnxruntime::session::Session;

use crate::{ScoringError, ScoringModel};

static ORT_ENV: OnceCell<Environment> = OnceCell::new();

thread_local! {
    static SESSIONS: RefCell<HashMap<PathBuf, Rc<RefCell<Session<'static>>>>> =
        RefCell::new(HashMap::new());
}

#[derive(Debug, Clone)]
pub struct OnnxScoringModel {
    name: String,
    feature_names: Vec<String>,
    model_path: PathBuf,
}

impl OnnxScoringModel {
    pub fn new(
        name: impl Into<String>,
        feature_names: Vec<String>,
        model_path: PathBuf,
    ) -> Result<Self, ScoringError> {
        if feature_names.is_empty() {
            return Err(ScoringError::InvalidModel("model declares no features".into()));
        }
        if !model_path.exists() {
            return Err(ScoringError::ModelNotFound(model_path.display().to_string()));
        }
        session(&model_path)?;
        Ok(Self {
            name: name.into(),
            feature_names,
            model_path,
        })
    }
}

impl ScoringModel for OnnxScoringModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f32]) -> Result<f32, ScoringError> {
        if features.len() != self.feature_names.len() {
            return Err(ScoringError::DimensionMismatch {
                expected: self.feature_names.len(),
                got: features.len(),
            });
        }
        let tensor = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| ScoringError::Inference(e.to_string()))?;

        let handle = session(&self.model_path)?;
        let mut guard = handle.borrow_mut();
        let outputs = guard
            .run::<f32, f32, _>(vec![tensor.into_dyn()])
            .map_err(|e| ScoringError::Inference(e.to_string()))?;
        outputs
            .first()
            .and_then(|out| out.iter().next().copied())
            .ok_or_else(|| ScoringError::Inference("model returned no output".into()))
    }
}

fn session(path: &Path) -> Result<Rc<RefCell<Session<'static>>>, ScoringError> {
    SESSIONS.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(handle) = cache.get(path) {
            return Ok(handle.clone());
        }
        let env = ORT_ENV.get_or_try_init(|| {
            Environment::builder()
                .with_name("ms2-scoring")
                .build()
                .map_err(|e| ScoringError::Inference(e.to_string()))
        })?;
        let session = env
            .new_session_builder()
            .map_err(|e| ScoringError::Inference(e.to_string()))?
            .with_model_from_file(path)
            .map_err(|e| ScoringError::InvalidModel(e.to_string()))?;
        let handle = Rc::new(RefCell::new(session));
        cache.insert(path.to_path_buf(), handle.clone());
        Ok(handle)
    })
}
