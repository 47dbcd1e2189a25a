//! ONNX Runtime backed embedding model.
//!
//! The binned spectrum vector is fed as a single `(1, n_bins)` f32 tensor to
//! the first graph input; the first output is the embedding. Sessions are
//! not `Sync`, so each worker thread lazily opens its own and keeps it in a
//! thread-local cache keyed by model path.
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use once_cell::sync::OnceCell;
use onnxruntime::environment::Environment;
use onnxruntime::ndarray::Array2;
use onnxruntime::session::Session;
use spectrum::ProcessedSpectrum;

use crate::binned::Binning;
use crate::{EmbeddingError, EmbeddingModel};

static ORT_ENV: OnceCell<Environment> = OnceCell::new();

thread_local! {
    static SESSION_CACHE: RefCell<HashMap<PathBuf, Rc<RefCell<Session<'static>>>>> =
        RefCell::new(HashMap::new());
}

#[derive(Debug, Clone)]
pub struct OnnxModel {
    name: String,
    model_path: PathBuf,
    binning: Binning,
    dimension: usize,
}

impl OnnxModel {
    pub fn new(
        name: String,
        model_path: PathBuf,
        binning: Binning,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        binning.validate()?;
        if !model_path.exists() {
            return Err(EmbeddingError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }
        if dimension == 0 {
            return Err(EmbeddingError::InvalidModel(
                "onnx model dimension must be > 0".into(),
            ));
        }
        // Open one session up front so a broken graph fails at load time.
        session_handle(&model_path)?;
        Ok(Self {
            name,
            model_path,
            binning,
            dimension,
        })
    }
}

impl EmbeddingModel for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, spectrum: &ProcessedSpectrum) -> Result<Vec<f32>, EmbeddingError> {
        let input = self.binning.vectorize(spectrum.peaks());
        let width = input.len();
        let tensor = Array2::from_shape_vec((1, width), input)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        let handle = session_handle(&self.model_path)?;
        let mut guard = handle.borrow_mut();
        let session = &mut *guard;
        if session.inputs.len() != 1 {
            return Err(EmbeddingError::InvalidModel(format!(
                "expected a single graph input, found {}",
                session.inputs.len()
            )));
        }

        let outputs = session
            .run::<f32, f32, _>(vec![tensor.into_dyn()])
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Inference("model returned no outputs".into()))?;

        let vector: Vec<f32> = output.iter().copied().collect();
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(vector)
    }
}

fn session_handle(path: &Path) -> Result<Rc<RefCell<Session<'static>>>, EmbeddingError> {
    SESSION_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(handle) = cache.get(path) {
            return Ok(handle.clone());
        }

        let session = ort_environment()?
            .new_session_builder()
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?
            .with_model_from_file(path)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        let handle = Rc::new(RefCell::new(session));
        cache.insert(path.to_path_buf(), handle.clone());
        Ok(handle)
    })
}

fn ort_environment() -> Result<&'static Environment, EmbeddingError> {
    ORT_ENV.get_or_try_init(|| {
        Environment::builder()
            .with_name("ms2-embedding")
            .build()
            .map_err(|e| EmbeddingError::Inference(e.to_string()))
    })
}
