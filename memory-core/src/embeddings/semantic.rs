//! Dense sentence-encoder backend (`all-MiniLM-L6-v2` by default), grounded
//! in the teacher's `embeddings/real_model.rs` ONNX-runtime integration
//! (`RealEmbeddingModel::generate_real_embedding`'s tokenize → run →
//! mean-pool → normalize shape).

use super::Embedder;
use crate::error::{Error, Result};
use async_trait::async_trait;
use ort::session::Session;
use std::path::PathBuf;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;

/// Loads and runs a local ONNX sentence encoder, producing L2-normalized
/// vectors of `dim` floats.
pub struct SemanticEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Tokenizer,
    dim: usize,
}

impl SemanticEmbedder {
    /// Load `model_name` from the local model cache, downloading it first
    /// if absent. Blocks for up to the hook timeout on a cold cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnavailable`] if the model or tokenizer
    /// cannot be loaded.
    pub async fn load(model_name: &str, dim: usize) -> Result<Self> {
        let cache_dir = model_cache_dir(model_name);
        let onnx_path = cache_dir.join(format!("{}.onnx", sanitize(model_name)));
        let tokenizer_path = cache_dir.join(format!("{}_tokenizer.json", sanitize(model_name)));

        if !onnx_path.exists() || !tokenizer_path.exists() {
            return Err(Error::BackendUnavailable(format!(
                "model files for {model_name} not present in cache at {}",
                cache_dir.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?
            .commit_from_file(&onnx_path)
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer,
            dim,
        })
    }
}

#[async_trait]
impl Embedder for SemanticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;
        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        let attention_mask: Vec<i64> =
            encoding.get_attention_mask().iter().map(|&m| i64::from(m)).collect();

        let session = self.session.clone();
        let pooled = tokio::task::spawn_blocking(move || run_forward_pass(&session, &input_ids, &attention_mask))
            .await
            .map_err(|e| Error::BackendUnavailable(format!("inference task panicked: {e}")))??;

        Ok(normalize(pooled))
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn backend_name(&self) -> &'static str {
        "semantic"
    }
}

/// Runs one forward pass and mask-weighted mean-pools the last hidden
/// state into a single sentence vector. Blocking: `ort::Session::run` is
/// synchronous, so callers must invoke this from `spawn_blocking`.
fn run_forward_pass(session: &Mutex<Session>, input_ids: &[i64], attention_mask: &[i64]) -> Result<Vec<f32>> {
    let input_ids_array = ndarray::Array2::from_shape_vec((1, input_ids.len()), input_ids.to_vec())
        .map_err(|e| Error::BackendUnavailable(e.to_string()))?
        .into_dyn();
    let attention_mask_array =
        ndarray::Array2::from_shape_vec((1, attention_mask.len()), attention_mask.to_vec())
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?
            .into_dyn();

    let input_ids_tensor = ort::value::TensorRef::from_array_view(input_ids_array.view())
        .map_err(|e| Error::BackendUnavailable(e.to_string()))?;
    let attention_mask_tensor = ort::value::TensorRef::from_array_view(attention_mask_array.view())
        .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

    let mut session = session.blocking_lock();
    let mut outputs = session
        .run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
        })
        .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

    let (shape, data) = outputs
        .remove("last_hidden_state")
        .ok_or_else(|| Error::BackendUnavailable("model has no last_hidden_state output".to_string()))?
        .try_extract_tensor::<f32>()
        .map_err(|e| Error::BackendUnavailable(e.to_string()))?;
    if shape.len() != 3 {
        return Err(Error::BackendUnavailable(format!("unexpected output shape: {shape:?}")));
    }
    let seq_len = shape[1] as usize;
    let hidden = shape[2] as usize;

    // Mask-weighted mean pooling over the sequence dimension.
    let mut pooled = vec![0.0_f32; hidden];
    let mut mask_sum = 0.0_f32;
    for (t, &mask) in attention_mask.iter().enumerate().take(seq_len) {
        let mask = mask as f32;
        mask_sum += mask;
        for h in 0..hidden {
            pooled[h] += data[t * hidden + h] * mask;
        }
    }
    if mask_sum > 0.0 {
        for v in &mut pooled {
            *v /= mask_sum;
        }
    }
    Ok(pooled)
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn sanitize(model_name: &str) -> String {
    model_name.replace('/', "_")
}

fn model_cache_dir(model_name: &str) -> PathBuf {
    std::env::var("MEMORY_MODEL_CACHE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs_home().join(".cache/memory-hooks/models").join(sanitize(model_name))
        })
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}
