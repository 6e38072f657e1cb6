// src/engine/runner.rs

//! Step Execution Engine: drives the steps of one document pass.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::contracts::{PluginResult, PluginResults, PluginState, ResultStatus};
use crate::engine::disposition::{Disposition, StepFacts, resolve_disposition};
use crate::fs::FileSystem;
use crate::output::{OutputSink, PluginOutput};
use crate::platform::PlatformProvider;
use crate::plugin::{ExecutionContext, PluginRegistry, PluginRunner, WorkerPlugin};
use crate::task::CancelFlag;

/// `SendReply(document_id, step_id, all_results_so_far)`.
pub type SendReply = Arc<dyn Fn(&str, &str, &PluginResults) + Send + Sync>;

/// `UpdateAssociation(execution_id, completed_at, all_results_so_far, total_steps)`.
pub type UpdateAssociation =
    Arc<dyn Fn(&str, DateTime<Utc>, &PluginResults, usize) + Send + Sync>;

pub fn noop_reply() -> SendReply {
    Arc::new(|_: &str, _: &str, _: &PluginResults| {})
}

pub fn noop_association() -> UpdateAssociation {
    Arc::new(|_: &str, _: DateTime<Utc>, _: &PluginResults, _: usize| {})
}

/// Runs step lists against a plugin registry.
///
/// Shared behind an `Arc` so handlers can get a [`PluginRunner`] that calls
/// back into the same engine.
pub struct StepEngine {
    registry: Arc<PluginRegistry>,
    platform: Arc<dyn PlatformProvider>,
    fs: Arc<dyn FileSystem>,
    orchestration_root: Option<PathBuf>,
    max_output_length: usize,
}

impl std::fmt::Debug for StepEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepEngine")
            .field("registry", &self.registry)
            .field("orchestration_root", &self.orchestration_root)
            .field("max_output_length", &self.max_output_length)
            .finish_non_exhaustive()
    }
}

impl StepEngine {
    pub fn new(
        registry: Arc<PluginRegistry>,
        platform: Arc<dyn PlatformProvider>,
        fs: Arc<dyn FileSystem>,
        orchestration_root: Option<PathBuf>,
        max_output_length: usize,
    ) -> Self {
        Self {
            registry,
            platform,
            fs,
            orchestration_root,
            max_output_length,
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Runner that executes nested steps through this engine without
    /// reporting progress.
    pub fn plugin_runner(self: &Arc<Self>) -> PluginRunner {
        let engine = Arc::clone(self);
        PluginRunner::new(move |document_id, steps, cancel| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                engine
                    .run_plugins(
                        &document_id,
                        steps,
                        noop_reply(),
                        noop_association(),
                        cancel,
                    )
                    .await
            })
        })
    }

    /// Decide the disposition of `step` without running it.
    pub fn resolve(&self, step: &PluginState) -> Disposition {
        let handler = self.registry.resolve(&step.name);
        self.resolve_with(step, handler.as_deref())
    }

    fn resolve_with(&self, step: &PluginState, handler: Option<&dyn WorkerPlugin>) -> Disposition {
        let platform = self.platform.platform_type();
        let platform_support = match handler {
            Some(h) => h.is_supported(platform),
            None => Ok(()),
        };
        resolve_disposition(&StepFacts {
            step_name: &step.name,
            step_id: &step.id,
            preconditions: &step.configuration.preconditions,
            preconditions_enabled: step.configuration.is_preconditions_enabled,
            handler_found: handler.is_some(),
            platform_support,
            platform,
        })
    }

    /// Execute `steps` in order until the list is exhausted or a step asks
    /// for a reboot.
    ///
    /// Steps that already carry a terminal status (other than
    /// `SuccessAndReboot`) are not re-executed; their prior result is carried
    /// into the returned map. `send_reply` and `update_association` are
    /// called after each step that this pass actually processed.
    pub async fn run_plugins(
        self: &Arc<Self>,
        document_id: &str,
        steps: Vec<PluginState>,
        send_reply: SendReply,
        update_association: UpdateAssociation,
        cancel: CancelFlag,
    ) -> PluginResults {
        let total_steps = steps.len();
        let mut results = PluginResults::new();

        info!(document_id, total_steps, "running document steps");

        for step in steps {
            let step_id = step.id.clone();

            match step.result.status {
                ResultStatus::NotStarted | ResultStatus::InProgress => {}
                ResultStatus::SuccessAndReboot => {
                    info!(document_id, step_id = %step_id, "resuming step after reboot");
                }
                status => {
                    debug!(document_id, step_id = %step_id, %status, "step already complete; not re-executing");
                    results.insert(step_id, step.result.clone());
                    continue;
                }
            }

            if cancel.is_shut_down() {
                info!(document_id, step_id = %step_id, "agent shutting down; leaving remaining steps for the next run");
                break;
            }

            let started_at = Utc::now();

            let mut outcome = if cancel.is_canceled() {
                info!(document_id, step_id = %step_id, "document canceled; step not started");
                PluginResult::new(ResultStatus::Cancelled, 1)
            } else {
                self.run_step(document_id, &step, cancel.clone()).await
            };

            outcome.plugin_id = step_id.clone();
            outcome.plugin_name = step.name.clone();
            outcome.start_date_time = Some(started_at);
            outcome.end_date_time = Some(Utc::now());
            if outcome.output_s3_bucket_name.is_none()
                && !step.configuration.output_s3_bucket_name.is_empty()
            {
                outcome.output_s3_bucket_name =
                    Some(step.configuration.output_s3_bucket_name.clone());
                outcome.output_s3_key_prefix =
                    Some(step.configuration.output_s3_key_prefix.clone());
            }
            outcome.truncate(self.max_output_length);

            let status = outcome.status;
            info!(document_id, step_id = %step_id, %status, code = outcome.code, "step finished");

            results.insert(step_id.clone(), outcome);
            send_reply(document_id, &step_id, &results);
            update_association(document_id, Utc::now(), &results, total_steps);

            if status.is_reboot() {
                info!(document_id, step_id = %step_id, "step requested a reboot; stopping this pass");
                break;
            }
        }

        results
    }

    async fn run_step(
        self: &Arc<Self>,
        document_id: &str,
        step: &PluginState,
        cancel: CancelFlag,
    ) -> PluginResult {
        let handler = self.registry.resolve(&step.name);
        let disposition = self.resolve_with(step, handler.as_deref());

        debug!(
            document_id,
            step_id = %step.id,
            plugin = %step.name,
            disposition = disposition.label(),
            "resolved step disposition"
        );

        match (disposition.to_result(), handler) {
            (None, Some(handler)) => self.invoke(handler, document_id, step, cancel).await,
            (Some(result), _) => {
                if result.status == ResultStatus::Failed {
                    warn!(document_id, step_id = %step.id, error = ?result.error, "step failed before execution");
                }
                result
            }
            (None, None) => PluginResult::failed(1, format!("Plugin with name {} not found", step.name)),
        }
    }

    /// Invoke `handler` on its own task so that a panic becomes a `Failed`
    /// result instead of unwinding through the engine.
    async fn invoke(
        self: &Arc<Self>,
        handler: Arc<dyn WorkerPlugin>,
        document_id: &str,
        step: &PluginState,
        cancel: CancelFlag,
    ) -> PluginResult {
        let mut config = step.configuration.clone();
        if config.plugin_id.is_empty() {
            config.plugin_id = step.id.clone();
        }
        if config.plugin_name.is_empty() {
            config.plugin_name = step.name.clone();
        }
        let output_root = if config.orchestration_directory.is_empty() {
            self.orchestration_root
                .as_ref()
                .map(|root| root.join(document_id))
        } else {
            Some(PathBuf::from(&config.orchestration_directory))
        };
        if config.orchestration_directory.is_empty() {
            if let Some(root) = &output_root {
                config.orchestration_directory = root.join(&step.id).display().to_string();
            }
        }

        let sink = PluginOutput::new(Arc::clone(&self.fs), output_root);
        sink.init(&step.id);
        let sink: Arc<dyn OutputSink> = Arc::new(sink);

        let ctx = ExecutionContext {
            document_id: document_id.to_string(),
            platform: Arc::clone(&self.platform),
            fs: Arc::clone(&self.fs),
            runner: self.plugin_runner(),
        };

        let handler_sink = Arc::clone(&sink);
        let joined = tokio::spawn(async move {
            handler.execute(ctx, config, cancel, handler_sink).await
        })
        .await;

        let mut result = match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                let detail = panic_message(err.into_panic());
                error!(document_id, step_id = %step.id, plugin = %step.name, panic = %detail, "plugin crashed");
                PluginResult::failed(
                    1,
                    format!(
                        "Plugin {} crashed while executing step {}: {}",
                        step.name, step.id, detail
                    ),
                )
            }
            Err(err) => {
                error!(document_id, step_id = %step.id, error = %err, "plugin task aborted");
                PluginResult::failed(1, format!("Plugin {} was aborted: {err}", step.name))
            }
        };

        if result.standard_output.is_empty() {
            result.standard_output = sink.stdout();
        }
        if result.standard_error.is_empty() {
            result.standard_error = sink.stderr();
        }
        if let Err(err) = sink.close() {
            warn!(document_id, step_id = %step.id, error = %err, "failed to write step output files");
        }

        result
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
