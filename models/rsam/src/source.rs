use std::path::PathBuf;

use rsam_common::FileSource;

/// The Segment Anything checkpoint variants this crate can load.
///
/// Each variant names the image encoder the checkpoint was trained with;
/// the checkpoint file and the variant must match for the weights to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamModelKind {
    /// The TinyViT based MobileSAM distillation
    MobileSamTiny,
    /// The ViT-B image encoder
    VitB,
    /// The ViT-L image encoder
    VitL,
    /// The ViT-H image encoder
    VitH,
}

/// The image encoder hyperparameters of a ViT based checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VitEncoderParams {
    pub(crate) embed_dim: usize,
    pub(crate) depth: usize,
    pub(crate) num_heads: usize,
    pub(crate) global_attn_indexes: &'static [usize],
}

impl SamModelKind {
    /// The encoder hyperparameters for this variant, or `None` for the
    /// TinyViT model which is constructed separately.
    pub(crate) fn encoder_params(&self) -> Option<VitEncoderParams> {
        match self {
            Self::MobileSamTiny => None,
            Self::VitB => Some(VitEncoderParams {
                embed_dim: 768,
                depth: 12,
                num_heads: 12,
                global_attn_indexes: &[2, 5, 8, 11],
            }),
            Self::VitL => Some(VitEncoderParams {
                embed_dim: 1024,
                depth: 24,
                num_heads: 16,
                global_attn_indexes: &[5, 11, 17, 23],
            }),
            Self::VitH => Some(VitEncoderParams {
                embed_dim: 1280,
                depth: 32,
                num_heads: 16,
                global_attn_indexes: &[7, 15, 23, 31],
            }),
        }
    }
}

/// The source of a Segment Anything checkpoint: where the weights file
/// lives and which [`SamModelKind`] it contains.
#[derive(Debug, Clone)]
pub struct SamSource {
    pub(crate) model: FileSource,
    pub(crate) kind: SamModelKind,
}

impl SamSource {
    /// Creates a new [`SamSource`] from a file source and the variant it holds.
    pub fn new(model: FileSource, kind: SamModelKind) -> Self {
        Self { model, kind }
    }

    /// Create the tiny MobileSAM model source.
    pub fn mobile_sam_tiny() -> Self {
        Self::new(
            FileSource::huggingface("lmz/candle-sam", "main", "mobile_sam-tiny-vitt.safetensors"),
            SamModelKind::MobileSamTiny,
        )
    }

    /// Create the ViT-B model source.
    pub fn vit_b() -> Self {
        Self::new(
            FileSource::huggingface("lmz/candle-sam", "main", "sam_vit_b_01ec64.safetensors"),
            SamModelKind::VitB,
        )
    }

    /// Create a ViT-L model source from a safetensors checkpoint on disk.
    pub fn vit_l_from(path: impl Into<PathBuf>) -> Self {
        Self::new(FileSource::local(path.into()), SamModelKind::VitL)
    }

    /// Create a ViT-H model source from a safetensors checkpoint on disk.
    pub fn vit_h_from(path: impl Into<PathBuf>) -> Self {
        Self::new(FileSource::local(path.into()), SamModelKind::VitH)
    }

    /// The variant this source loads.
    pub fn kind(&self) -> SamModelKind {
        self.kind
    }
}

impl Default for SamSource {
    fn default() -> Self {
        Self::mobile_sam_tiny()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_default_source_is_the_tiny_model() {
        let source = SamSource::default();
        assert_eq!(source.kind(), SamModelKind::MobileSamTiny);
        assert!(source.kind().encoder_params().is_none());
    }

    #[test]
    fn vit_encoder_hyperparameters_match_the_model_registry() {
        let vit_b = SamModelKind::VitB.encoder_params().unwrap();
        assert_eq!(
            (vit_b.embed_dim, vit_b.depth, vit_b.num_heads),
            (768, 12, 12)
        );
        assert_eq!(vit_b.global_attn_indexes, [2usize, 5, 8, 11].as_slice());

        let vit_l = SamModelKind::VitL.encoder_params().unwrap();
        assert_eq!(
            (vit_l.embed_dim, vit_l.depth, vit_l.num_heads),
            (1024, 24, 16)
        );
        assert_eq!(vit_l.global_attn_indexes, [5usize, 11, 17, 23].as_slice());

        let vit_h = SamModelKind::VitH.encoder_params().unwrap();
        assert_eq!(
            (vit_h.embed_dim, vit_h.depth, vit_h.num_heads),
            (1280, 32, 16)
        );
        assert_eq!(vit_h.global_attn_indexes, [7usize, 15, 23, 31].as_slice());
    }

    #[test]
    fn local_checkpoints_keep_their_variant() {
        let source = SamSource::vit_l_from("sam_vit_l_0b3195.safetensors");
        assert_eq!(source.kind(), SamModelKind::VitL);
        assert!(matches!(source.model, rsam_common::FileSource::Local(_)));
    }
}
