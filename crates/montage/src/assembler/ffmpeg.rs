use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{AssembleError, Assembler, AssemblyPlan};
use crate::media::FfmpegTools;
use crate::sanitize;

/// Cuts every planned clip out of the source into a scratch directory and
/// joins them with the concat demuxer.
pub struct FfmpegAssembler {
    tools: FfmpegTools,
    reencode: bool,
}

impl FfmpegAssembler {
    pub fn new(tools: FfmpegTools, reencode: bool) -> Self {
        Self { tools, reencode }
    }
}

#[async_trait]
impl Assembler for FfmpegAssembler {
    async fn assemble(
        &self,
        source: &Path,
        plan: &AssemblyPlan,
        output: &Path,
    ) -> Result<(), AssembleError> {
        if plan.is_empty() {
            return Err(AssembleError::EmptyPlan);
        }

        let scratch = tempfile::TempDir::new().map_err(|e| AssembleError::Io {
            path: std::env::temp_dir(),
            source: e,
        })?;
        let extension = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");

        // A scene used by several segments is cut once and listed repeatedly.
        let mut extracted: HashMap<&str, PathBuf> = HashMap::new();
        let mut clips: Vec<PathBuf> = Vec::with_capacity(plan.clips.len());

        for (index, clip) in plan.clips.iter().enumerate() {
            if let Some(path) = extracted.get(clip.scene_id.as_str()) {
                clips.push(path.clone());
                continue;
            }

            let path = scratch
                .path()
                .join(format!("clip_{:03}.{}", index, extension));
            tracing::debug!(
                index,
                scene_rank = clip.scene_rank,
                start = clip.start,
                end = clip.end,
                "Extracting clip"
            );
            self.tools
                .extract_clip(source, clip.start, clip.end, &path, self.reencode)
                .await
                .map_err(|e| AssembleError::Clip { index, source: e })?;

            extracted.insert(clip.scene_id.as_str(), path.clone());
            clips.push(path);
        }

        self.tools
            .concat(&clips, output)
            .await
            .map_err(AssembleError::Concat)?;

        tracing::info!(
            output = %sanitize::redact_path(output),
            clips = clips.len(),
            "Montage assembled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::PlannedClip;

    fn assembler() -> FfmpegAssembler {
        FfmpegAssembler::new(
            FfmpegTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe"),
            true,
        )
    }

    #[tokio::test]
    async fn test_empty_plan_is_rejected() {
        let plan = AssemblyPlan { clips: vec![] };
        let result = assembler()
            .assemble(Path::new("in.mp4"), &plan, Path::new("out.mp4"))
            .await;
        assert!(matches!(result, Err(AssembleError::EmptyPlan)));
    }

    #[tokio::test]
    async fn test_extraction_failure_fails_assembly() {
        let plan = AssemblyPlan {
            clips: vec![PlannedClip {
                segment_rank: 0,
                segment_id: "s0".to_string(),
                segment_text: "A man walks away.".to_string(),
                scene_rank: 0,
                scene_id: "a".to_string(),
                start: 0.0,
                end: 2.0,
                caption: None,
            }],
        };
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");

        let result = assembler()
            .assemble(Path::new("in.mp4"), &plan, &output)
            .await;
        assert!(matches!(result, Err(AssembleError::Clip { index: 0, .. })));
        assert!(!output.exists());
    }
}
