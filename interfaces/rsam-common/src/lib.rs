//! Shared model loading infrastructure for the rsam workspace: checkpoint
//! sources, a resumable download cache, loading progress reporting, and
//! device selection.

use std::{fmt::Display, path::PathBuf, sync::OnceLock};

use candle_core::{
    utils::{cuda_is_available, metal_is_available},
    Device,
};

mod cache;
mod progress;
pub use cache::*;
pub use progress::*;

/// Create a candle device that uses any available accelerator.
pub fn accelerated_device_if_available() -> candle_core::Result<Device> {
    static DEVICE: OnceLock<Device> = OnceLock::new();
    if let Some(device) = DEVICE.get() {
        return Ok(device.clone());
    }
    let device = if cuda_is_available() {
        Device::new_cuda(0)?
    } else if metal_is_available() {
        Device::new_metal(0)?
    } else {
        tracing::warn!("Running on CPU, to run on GPU, build with `--features cuda` or `--features metal`");
        Device::Cpu
    };
    let _ = DEVICE.set(device.clone());
    Ok(device)
}

/// A source for a checkpoint file, either from Hugging Face or a local path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSource {
    /// A file from Hugging Face
    HuggingFace {
        /// The model id to use
        model_id: String,
        /// The revision to use
        revision: String,
        /// The file to use
        file: String,
    },
    /// A local file
    Local(PathBuf),
}

impl Display for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSource::HuggingFace {
                model_id,
                revision,
                file,
            } => write!(f, "hf://{}/{}/{}", model_id, revision, file),
            FileSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FileSource {
    /// Create a new source for a file from Hugging Face
    pub fn huggingface(
        model_id: impl ToString,
        revision: impl ToString,
        file: impl ToString,
    ) -> Self {
        Self::HuggingFace {
            model_id: model_id.to_string(),
            revision: revision.to_string(),
            file: file.to_string(),
        }
    }

    /// Create a new source for a local file
    pub fn local(path: PathBuf) -> Self {
        Self::Local(path)
    }

    /// Check if the file exists locally (if it is a local file or if it has been downloaded)
    pub fn downloaded(&self) -> bool {
        let cache = Cache::default();
        cache.exists(self)
    }

    /// Resolve the source to a path on disk through the default [`Cache`],
    /// downloading it if necessary.
    pub async fn download(
        &self,
        progress: impl FnMut(FileLoadingProgress),
    ) -> Result<PathBuf, CacheError> {
        Cache::default().get(self, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sources_display_their_origin() {
        let hub = FileSource::huggingface("lmz/candle-sam", "main", "weights.safetensors");
        assert_eq!(hub.to_string(), "hf://lmz/candle-sam/main/weights.safetensors");

        let local = FileSource::local(PathBuf::from("/tmp/weights.safetensors"));
        assert_eq!(local.to_string(), "/tmp/weights.safetensors");
    }
}
