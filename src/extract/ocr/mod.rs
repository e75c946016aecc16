//! OCR engine interface and profile selection.

use std::sync::Arc;

use image::DynamicImage;

use crate::{prelude::*, template::FieldKind};

pub mod tesseract;

/// Which recognizer the engine should use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineMode {
    /// The legacy recognizer. Faster, less accurate.
    Legacy,
    /// The neural-network recognizer.
    Lstm,
}

/// How the engine should lay out the text it finds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segmentation {
    /// A single uniform block of text.
    Block,
    /// A single line of text.
    SingleLine,
}

/// One configuration of the OCR engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OcrProfile {
    /// Name used in logs and output.
    pub name: &'static str,
    pub engine_mode: EngineMode,
    pub segmentation: Segmentation,
    /// Restrict recognition to these characters.
    pub whitelist: Option<&'static str>,
}

/// The profiles we try, most constrained first.
///
/// Order matters: when several profiles find digits, the earliest one wins.
pub const OCR_PROFILES: [OcrProfile; 4] = [
    OcrProfile {
        name: "digits",
        engine_mode: EngineMode::Lstm,
        segmentation: Segmentation::Block,
        whitelist: Some("0123456789."),
    },
    OcrProfile {
        name: "digits_with_separators",
        engine_mode: EngineMode::Lstm,
        segmentation: Segmentation::SingleLine,
        whitelist: Some("0123456789-."),
    },
    OcrProfile {
        name: "single_line",
        engine_mode: EngineMode::Lstm,
        segmentation: Segmentation::SingleLine,
        whitelist: None,
    },
    OcrProfile {
        name: "fast_fallback",
        engine_mode: EngineMode::Legacy,
        segmentation: Segmentation::SingleLine,
        whitelist: None,
    },
];

/// Interface to an OCR engine.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Recognize the text in `image` using a single profile.
    async fn run_profile(
        &self,
        image: Arc<DynamicImage>,
        profile: &OcrProfile,
    ) -> Result<String>;
}

/// The text chosen for a field, and which profile produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recognition {
    pub text: String,
    pub profile: Option<&'static str>,
}

/// Recognize the text in a preprocessed field image.
///
/// The first profile whose trimmed output contains a digit wins. If none do,
/// the field is unreadable and we return an empty string, so the normalizers
/// produce their sentinels. A profile that fails is logged and skipped.
#[instrument(level = "debug", skip_all, fields(field = %field))]
pub async fn recognize(
    engine: &dyn OcrEngine,
    image: Arc<DynamicImage>,
    field: FieldKind,
) -> Recognition {
    for profile in &OCR_PROFILES {
        let text = match engine.run_profile(image.clone(), profile).await {
            Ok(text) => text.trim().to_owned(),
            Err(err) => {
                warn!(profile = profile.name, "OCR profile failed: {:?}", err);
                continue;
            }
        };
        debug!(profile = profile.name, text = %text, "OCR output");

        if text.chars().any(|c| c.is_ascii_digit()) {
            return Recognition {
                text,
                profile: Some(profile.name),
            };
        }
    }

    warn!("no OCR profile recognized any digits");
    Recognition::default()
}

#[cfg(test)]
pub mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use image::GrayImage;

    use super::*;

    type Script = dyn Fn(&OcrProfile, usize) -> String + Send + Sync;

    /// A deterministic engine which answers from a script. The script sees
    /// the profile and the index of this call across the engine's lifetime.
    pub struct ScriptedOcrEngine {
        script: Box<Script>,
        calls: AtomicUsize,
        profiles_seen: Mutex<Vec<&'static str>>,
    }

    impl ScriptedOcrEngine {
        pub fn new<F>(script: F) -> Self
        where
            F: Fn(&OcrProfile, usize) -> String + Send + Sync + 'static,
        {
            Self {
                script: Box::new(script),
                calls: AtomicUsize::new(0),
                profiles_seen: Mutex::new(vec![]),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn profiles_seen(&self) -> Vec<&'static str> {
            self.profiles_seen.lock().unwrap().clone()
        }
    }

    impl Default for ScriptedOcrEngine {
        fn default() -> Self {
            Self::new(|_, _| String::new())
        }
    }

    #[async_trait]
    impl OcrEngine for ScriptedOcrEngine {
        async fn run_profile(
            &self,
            _image: Arc<DynamicImage>,
            profile: &OcrProfile,
        ) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.profiles_seen.lock().unwrap().push(profile.name);
            Ok((self.script)(profile, call))
        }
    }

    fn blank() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::ImageLuma8(GrayImage::new(8, 8)))
    }

    fn by_profile(answers: &'static [(&'static str, &'static str)]) -> ScriptedOcrEngine {
        ScriptedOcrEngine::new(move |profile, _| {
            answers
                .iter()
                .find(|(name, _)| *name == profile.name)
                .map(|(_, text)| (*text).to_owned())
                .unwrap_or_default()
        })
    }

    #[test]
    fn profiles_are_ordered_by_constraint() {
        let names = OCR_PROFILES.iter().map(|p| p.name).collect::<Vec<_>>();
        assert_eq!(
            names,
            ["digits", "digits_with_separators", "single_line", "fast_fallback"]
        );
        assert_eq!(OCR_PROFILES[3].engine_mode, EngineMode::Legacy);
    }

    #[tokio::test]
    async fn earlier_digit_profile_beats_longer_later_output() {
        let engine = by_profile(&[
            ("digits", "12"),
            ("digits_with_separators", "12-3456-7890-123"),
            ("single_line", "Order 12-3456-7890-123 (copy)"),
        ]);
        let recognition = recognize(&engine, blank(), FieldKind::Order).await;
        assert_eq!(recognition.text, "12");
        assert_eq!(recognition.profile, Some("digits"));
        assert_eq!(engine.profiles_seen(), ["digits"]);
    }

    #[tokio::test]
    async fn skips_profiles_without_digits() {
        let engine = by_profile(&[
            ("digits", "  "),
            ("digits_with_separators", "...."),
            ("single_line", "No. 7"),
        ]);
        let recognition = recognize(&engine, blank(), FieldKind::Operator).await;
        assert_eq!(recognition.text, "No. 7");
        assert_eq!(recognition.profile, Some("single_line"));
        assert_eq!(engine.calls(), 3);
    }

    #[tokio::test]
    async fn fast_fallback_runs_only_when_nothing_has_digits() {
        let engine = by_profile(&[("single_line", "abc"), ("fast_fallback", "8")]);
        let recognition = recognize(&engine, blank(), FieldKind::Date).await;
        assert_eq!(recognition.text, "8");
        assert_eq!(recognition.profile, Some("fast_fallback"));
        assert_eq!(engine.calls(), 4);
    }

    #[tokio::test]
    async fn digitless_text_is_discarded() {
        let engine = by_profile(&[("single_line", " -- \n"), ("fast_fallback", "xyz")]);
        let recognition = recognize(&engine, blank(), FieldKind::Date).await;
        assert_eq!(recognition, Recognition::default());
        assert_eq!(engine.calls(), 4);
    }

    #[tokio::test]
    async fn nothing_recognized_is_empty() {
        let engine = ScriptedOcrEngine::default();
        let recognition = recognize(&engine, blank(), FieldKind::Order).await;
        assert_eq!(recognition, Recognition::default());
        assert_eq!(engine.calls(), 4);
    }

    #[tokio::test]
    async fn failing_profiles_are_skipped() {
        struct FlakyEngine;

        #[async_trait]
        impl OcrEngine for FlakyEngine {
            async fn run_profile(
                &self,
                _image: Arc<DynamicImage>,
                profile: &OcrProfile,
            ) -> Result<String> {
                match profile.name {
                    "digits" => Err(anyhow!("tesseract exited with status 1")),
                    _ => Ok("31.12.2024".to_owned()),
                }
            }
        }

        let recognition = recognize(&FlakyEngine, blank(), FieldKind::Date).await;
        assert_eq!(recognition.text, "31.12.2024");
        assert_eq!(recognition.profile, Some("digits_with_separators"));
    }
}
