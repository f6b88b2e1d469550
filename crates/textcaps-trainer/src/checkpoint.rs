//! Best-model checkpoints: safetensors weights plus a JSON sidecar holding
//! everything needed to rebuild the model (architecture, vocabulary, labels).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use textcaps_core::{ModelConfig, Vocab};

/// Sidecar stored next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub run_name: String,
    pub model: ModelConfig,
    /// Routing iterations at save time.
    pub num_iterations: usize,
    pub epoch: usize,
    /// Test accuracy in percent.
    pub accuracy: f64,
    pub labels: Vec<String>,
    pub vocab: Vocab,
}

/// Location of one run's checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    run_name: String,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, run_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            run_name: run_name.into(),
        }
    }

    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(format!("{}.safetensors", self.run_name))
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.run_name))
    }

    pub fn exists(&self) -> bool {
        self.weights_path().exists() && self.meta_path().exists()
    }

    /// Write weights and sidecar, replacing any previous checkpoint.
    pub fn save(&self, varmap: &VarMap, meta: &CheckpointMeta) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating checkpoint directory {}", self.dir.display()))?;

        let weights = self.weights_path();
        let tmp = weights.with_extension("safetensors.tmp");
        varmap
            .save(&tmp)
            .with_context(|| format!("writing weights to {}", tmp.display()))?;
        fs::rename(&tmp, &weights)?;

        let json = serde_json::to_string(meta)?;
        write_atomic(&self.meta_path(), json.as_bytes())?;

        info!(
            path = %weights.display(),
            epoch = meta.epoch,
            accuracy = meta.accuracy,
            "Saved checkpoint"
        );
        Ok(())
    }

    pub fn load_meta(&self) -> Result<CheckpointMeta> {
        let path = self.meta_path();
        let json = fs::read_to_string(&path)
            .with_context(|| format!("reading checkpoint metadata {}", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Overwrite the variables of `varmap` with the saved weights.
    pub fn load_weights(&self, varmap: &mut VarMap) -> Result<()> {
        let path = self.weights_path();
        varmap
            .load(&path)
            .with_context(|| format!("loading weights from {}", path.display()))?;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device, Tensor};
    use candle_nn::{ModuleT, VarBuilder};
    use textcaps_core::TextClassifier;

    use super::*;

    fn config() -> ModelConfig {
        ModelConfig {
            embed_dim: 6,
            hidden_dim: 5,
            num_layers: 2,
            ..ModelConfig::new(12, 3)
        }
    }

    fn meta(accuracy: f64) -> CheckpointMeta {
        CheckpointMeta {
            run_name: "agnews".into(),
            model: config(),
            num_iterations: 2,
            epoch: 4,
            accuracy,
            labels: vec!["a".into(), "b".into(), "c".into()],
            vocab: Vocab::from(vec!["<pad>".to_string(), "<unk>".to_string()]),
        }
    }

    #[test]
    fn test_paths_follow_run_name() {
        let store = CheckpointStore::new("epochs", "yelp_fine_grained");
        assert_eq!(store.weights_path(), PathBuf::from("epochs/yelp_fine_grained.safetensors"));
        assert_eq!(store.meta_path(), PathBuf::from("epochs/yelp_fine_grained.json"));
    }

    #[test]
    fn test_round_trip_reproduces_logits() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "agnews");
        let tokens = Tensor::new(&[[3u32, 4, 5, 0], [7, 8, 9, 10]], &Device::Cpu).unwrap();

        let varmap = VarMap::new();
        let model =
            TextClassifier::new(&config(), VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu)).unwrap();
        let expected = model.forward_t(&tokens, false).unwrap().to_vec2::<f32>().unwrap();
        store.save(&varmap, &meta(71.5)).unwrap();
        assert!(store.exists());

        let loaded_meta = store.load_meta().unwrap();
        assert_eq!(loaded_meta, meta(71.5));

        let mut fresh = VarMap::new();
        let restored = TextClassifier::new(
            &loaded_meta.model,
            VarBuilder::from_varmap(&fresh, DType::F32, &Device::Cpu),
        )
        .unwrap();
        assert_ne!(restored.forward_t(&tokens, false).unwrap().to_vec2::<f32>().unwrap(), expected);

        store.load_weights(&mut fresh).unwrap();
        let actual = restored.forward_t(&tokens, false).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_save_overwrites_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested"), "imdb");
        let varmap = VarMap::new();
        let _model =
            TextClassifier::new(&config(), VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu)).unwrap();

        store.save(&varmap, &meta(50.0)).unwrap();
        store.save(&varmap, &meta(60.0)).unwrap();
        assert_eq!(store.load_meta().unwrap().accuracy, 60.0);
        assert!(!store.weights_path().with_extension("safetensors.tmp").exists());
    }

    #[test]
    fn test_missing_checkpoint_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "cade");
        assert!(!store.exists());
        assert!(store.load_meta().unwrap_err().to_string().contains("cade.json"));
    }
}
