use serde::{Deserialize, Serialize};

/// Controls which coordinates survive a transform and whether dims are renamed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TransformOptions {
    /// Rename a dim to the coord that fully and exclusively derives from its
    /// dimension-coord
    pub rename_dims: bool,
    /// Keep outputs of rename rules that are not targets
    pub keep_aliases: bool,
    /// Keep outputs of compute rules that are not targets
    pub keep_intermediate: bool,
    /// Keep input coords that are not targets, as attrs once consumed
    pub keep_inputs: bool,
    pub quiet: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            rename_dims: true,
            keep_aliases: true,
            keep_intermediate: true,
            keep_inputs: true,
            quiet: false,
        }
    }
}

impl TransformOptions {
    /// Options with all `keep_*` flags off
    pub fn discarding(self) -> Self {
        Self {
            keep_aliases: false,
            keep_intermediate: false,
            keep_inputs: false,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let options: TransformOptions =
            serde_json::from_str(r#"{"keep_inputs": false, "quiet": true}"#).unwrap();
        assert_eq!(
            options,
            TransformOptions {
                keep_inputs: false,
                quiet: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_discarding() {
        let options = TransformOptions::default().discarding();
        assert!(options.rename_dims);
        assert!(!options.keep_aliases && !options.keep_intermediate && !options.keep_inputs);
    }
}
