//! The structuring stage: page-labelled menu text in, menu JSON out.
//!
//! One request per call, no retries. The prompt is the instruction block
//! (brand list included) followed by the text under the `**TEXT**:` marker,
//! so for fixed configuration it is byte-for-byte reproducible. The reply is
//! parsed strictly; a code fence is only tolerated from models without a
//! native JSON mode. See [`crate::pipeline::response`].

use crate::config::{PipelineConfig, SchemaCheck};
use crate::error::MenuError;
use crate::pipeline::model::{resolve_model, GenerationOptions, MenuModel, ResponseFormat};
use crate::pipeline::response::{check_schema, parse_json_reply, parse_model_output};
use crate::progress::{self, ProgressCallback};
use crate::prompts;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Turns menu text into the structured menu JSON via a [`MenuModel`].
pub struct MenuStructurer {
    model: Arc<dyn MenuModel>,
    instructions: String,
    options: GenerationOptions,
    timeout: Duration,
    schema_check: SchemaCheck,
    progress: ProgressCallback,
}

impl MenuStructurer {
    /// Structurer backed by the model [`resolve_model`] picks for `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MenuError> {
        Ok(Self::new(config, resolve_model(config)?))
    }

    /// Structurer backed by an explicit model.
    pub fn new(config: &PipelineConfig, model: Arc<dyn MenuModel>) -> Self {
        let instructions = config
            .instructions
            .clone()
            .unwrap_or_else(|| prompts::instruction_block(&config.brands));
        Self {
            model,
            instructions,
            options: GenerationOptions::from_config(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
            schema_check: config.schema_check,
            progress: progress::or_noop(&config.progress_callback),
        }
    }

    /// The exact prompt sent for `text`.
    pub fn prompt_for(&self, text: &str) -> String {
        prompts::format_prompt(&self.instructions, text)
    }

    /// Structure `text` (normally [`crate::ExtractedDocument::to_page_labeled_text`]).
    ///
    /// Empty or whitespace-only text fails with [`MenuError::EmptyInput`]
    /// before any model call is made.
    pub async fn structure(&self, text: &str) -> Result<Value, MenuError> {
        if text.trim().is_empty() {
            return Err(MenuError::EmptyInput);
        }

        let prompt = self.prompt_for(text);
        info!(
            "Structuring {} chars of menu text with {}",
            text.chars().count(),
            self.model.name()
        );
        self.progress.on_structuring_start(prompt.chars().count());

        let start = Instant::now();
        let raw = tokio::time::timeout(self.timeout, self.model.generate(&prompt, &self.options))
            .await
            .map_err(|_| MenuError::ModelTimeout {
                provider: self.model.name().to_string(),
                secs: self.timeout.as_secs(),
            })??;
        debug!(
            "{} replied with {} chars in {:?}",
            self.model.name(),
            raw.len(),
            start.elapsed()
        );

        let value = if self.model.native_json_mode()
            && self.options.response_format == ResponseFormat::Json
        {
            parse_json_reply(&raw)?
        } else {
            parse_model_output(&raw)?
        };
        self.apply_schema_check(&value)?;

        self.progress.on_structuring_complete(raw.chars().count());
        Ok(value)
    }

    fn apply_schema_check(&self, value: &Value) -> Result<(), MenuError> {
        if self.schema_check == SchemaCheck::Off {
            return Ok(());
        }
        let issues = check_schema(value);
        if issues.is_empty() {
            return Ok(());
        }
        match self.schema_check {
            SchemaCheck::Reject => Err(MenuError::SchemaViolation {
                issues: issues.iter().map(ToString::to_string).collect(),
            }),
            _ => {
                for i in &issues {
                    warn!("Menu schema: {}", i);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubModel {
        reply: String,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
        last_options: Mutex<Option<GenerationOptions>>,
        delay: Option<Duration>,
        native_json: bool,
    }

    impl StubModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
                last_options: Mutex::new(None),
                delay: None,
                native_json: false,
            })
        }

        fn native_json(reply: &str) -> Arc<Self> {
            let mut model = Arc::into_inner(Self::replying(reply)).unwrap();
            model.native_json = true;
            Arc::new(model)
        }
    }

    #[async_trait]
    impl MenuModel for StubModel {
        fn name(&self) -> &str {
            "stub"
        }

        fn native_json_mode(&self) -> bool {
            self.native_json
        }

        async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, MenuError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            *self.last_options.lock().unwrap() = Some(options.clone());
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            Ok(self.reply.clone())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl MenuModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String, MenuError> {
            Err(MenuError::ModelCallFailed {
                provider: "failing".into(),
                detail: "401 unauthorized".into(),
            })
        }
    }

    const MENU: &str = r#"{"menu_summary":"Beer list","products":[{"name":"IPA","price":"$9"}],"brand_percentages":{"unbranded":100}}"#;

    #[tokio::test]
    async fn empty_input_never_calls_model() {
        let model = StubModel::replying(MENU);
        let s = MenuStructurer::new(&PipelineConfig::default(), model.clone());
        assert!(matches!(s.structure("").await, Err(MenuError::EmptyInput)));
        assert!(matches!(s.structure(" \n\t").await, Err(MenuError::EmptyInput)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sends_prompt_and_json_options() {
        let model = StubModel::replying(MENU);
        let s = MenuStructurer::new(&PipelineConfig::default(), model.clone());
        let value = s.structure("Page 1: IPA $9").await.unwrap();

        assert_eq!(value["products"][0]["name"], "IPA");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        let prompt = model.last_prompt.lock().unwrap().clone().unwrap();
        assert_eq!(prompt, s.prompt_for("Page 1: IPA $9"));
        assert!(prompt.ends_with("**TEXT**:\nPage 1: IPA $9\n"));
        let opts = model.last_options.lock().unwrap().clone().unwrap();
        assert_eq!(opts.response_format, ResponseFormat::Json);
        assert!((opts.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn custom_instructions_replace_block() {
        let config = PipelineConfig::builder()
            .instructions("Return {} only.")
            .build()
            .unwrap();
        let s = MenuStructurer::new(&config, StubModel::replying("{}"));
        assert_eq!(s.prompt_for("x"), "Return {} only.\n\n**TEXT**:\nx\n");
    }

    #[tokio::test]
    async fn malformed_reply_is_surfaced() {
        let s = MenuStructurer::new(&PipelineConfig::default(), StubModel::replying("I could not read this menu."));
        assert!(matches!(
            s.structure("Page 1: ???").await,
            Err(MenuError::ModelResponseMalformed { .. })
        ));
    }

    #[tokio::test]
    async fn fence_tolerated_only_without_native_json_mode() {
        let fenced = format!("```json\n{MENU}\n```");
        let config = PipelineConfig::default();

        let chat = MenuStructurer::new(&config, StubModel::replying(&fenced));
        assert_eq!(chat.structure("Page 1: IPA $9").await.unwrap()["products"][0]["name"], "IPA");

        let native = MenuStructurer::new(&config, StubModel::native_json(&fenced));
        assert!(matches!(
            native.structure("Page 1: IPA $9").await,
            Err(MenuError::ModelResponseMalformed { .. })
        ));
        let native = MenuStructurer::new(&config, StubModel::native_json(MENU));
        assert!(native.structure("Page 1: IPA $9").await.is_ok());
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let s = MenuStructurer::new(&PipelineConfig::default(), Arc::new(FailingModel));
        let err = s.structure("Page 1: IPA").await.unwrap_err();
        assert!(matches!(err, MenuError::ModelCallFailed { .. }));
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let model = Arc::new(StubModel {
            reply: MENU.into(),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            last_options: Mutex::new(None),
            delay: Some(Duration::from_secs(3600)),
            native_json: false,
        });
        let config = PipelineConfig::builder().api_timeout_secs(1).build().unwrap();
        let s = MenuStructurer::new(&config, model);
        let err = s.structure("Page 1: IPA").await.unwrap_err();
        assert!(matches!(err, MenuError::ModelTimeout { secs: 1, .. }));
    }

    #[tokio::test]
    async fn schema_check_modes() {
        let off_shape = r#"{"items": []}"#;

        let s = MenuStructurer::new(&PipelineConfig::default(), StubModel::replying(off_shape));
        assert!(s.structure("Page 1: x").await.is_ok());

        let warn = PipelineConfig::builder().schema_check(SchemaCheck::Warn).build().unwrap();
        let s = MenuStructurer::new(&warn, StubModel::replying(off_shape));
        assert_eq!(s.structure("Page 1: x").await.unwrap()["items"], serde_json::json!([]));

        let reject = PipelineConfig::builder().schema_check(SchemaCheck::Reject).build().unwrap();
        let s = MenuStructurer::new(&reject, StubModel::replying(off_shape));
        match s.structure("Page 1: x").await.unwrap_err() {
            MenuError::SchemaViolation { issues } => assert_eq!(issues.len(), 3),
            other => panic!("expected SchemaViolation, got {other:?}"),
        }

        let s = MenuStructurer::new(&reject, StubModel::replying(MENU));
        assert!(s.structure("Page 1: x").await.is_ok());
    }
}
