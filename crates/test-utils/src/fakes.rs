//! Plugin and platform fakes for engine, executor and manager tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use docagent::contracts::{Configuration, PluginResult};
use docagent::output::OutputSink;
use docagent::platform::{PlatformProvider, PlatformType};
use docagent::plugin::{ExecutionContext, LongRunningPlugin, WorkerPlugin};
use docagent::task::{BoxFuture, CancelFlag};

/// Platform provider with fixed answers.
#[derive(Debug, Clone)]
pub struct FixedPlatform {
    platform: PlatformType,
    instance_id: String,
}

impl FixedPlatform {
    pub fn new(platform: PlatformType) -> Self {
        Self {
            platform,
            instance_id: "i-0123456789abcdef0".to_string(),
        }
    }

    pub fn linux() -> Self {
        Self::new(PlatformType::Linux)
    }

    pub fn windows() -> Self {
        Self::new(PlatformType::Windows)
    }
}

impl PlatformProvider for FixedPlatform {
    fn platform_type(&self) -> PlatformType {
        self.platform
    }

    fn platform_name(&self) -> String {
        self.platform.as_str().to_lowercase()
    }

    fn platform_version(&self) -> String {
        "test".to_string()
    }

    fn instance_id(&self) -> String {
        self.instance_id.clone()
    }
}

/// Worker that records its invocations and returns a canned result.
pub struct FakeWorkerPlugin {
    result: PluginResult,
    stdout: Option<String>,
    unsupported_on: Option<PlatformType>,
    invoked: Mutex<Vec<String>>,
}

impl FakeWorkerPlugin {
    pub fn returning(result: PluginResult) -> Self {
        Self {
            result,
            stdout: None,
            unsupported_on: None,
            invoked: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::returning(PluginResult::success("ok"))
    }

    /// Also write `text` to the output sink when executed.
    pub fn writing_stdout(mut self, text: &str) -> Self {
        self.stdout = Some(text.to_string());
        self
    }

    pub fn unsupported_on(mut self, platform: PlatformType) -> Self {
        self.unsupported_on = Some(platform);
        self
    }

    pub fn calls(&self) -> usize {
        self.invoked.lock().expect("invoked lock").len()
    }

    /// Step ids this plugin was invoked for, in order.
    pub fn invoked_steps(&self) -> Vec<String> {
        self.invoked.lock().expect("invoked lock").clone()
    }
}

impl WorkerPlugin for FakeWorkerPlugin {
    fn execute(
        &self,
        _ctx: ExecutionContext,
        config: Configuration,
        _cancel: CancelFlag,
        output: Arc<dyn OutputSink>,
    ) -> BoxFuture<'_, PluginResult> {
        Box::pin(async move {
            self.invoked
                .lock()
                .expect("invoked lock")
                .push(config.plugin_id.clone());
            if let Some(text) = &self.stdout {
                output.append_output(text);
            }
            self.result.clone()
        })
    }

    fn is_supported(&self, platform: PlatformType) -> Result<(), String> {
        match self.unsupported_on {
            Some(p) if p == platform => Err(format!("{platform} is not supported")),
            _ => Ok(()),
        }
    }
}

/// Worker that panics on every invocation.
#[derive(Debug, Default)]
pub struct PanickingPlugin;

impl WorkerPlugin for PanickingPlugin {
    fn execute(
        &self,
        _ctx: ExecutionContext,
        _config: Configuration,
        _cancel: CancelFlag,
        _output: Arc<dyn OutputSink>,
    ) -> BoxFuture<'_, PluginResult> {
        Box::pin(async move { panic!("plugin exploded") })
    }
}

/// Worker that waits for the cancel flag and reports `Cancelled`.
#[derive(Debug, Default)]
pub struct WaitForCancelPlugin;

impl WorkerPlugin for WaitForCancelPlugin {
    fn execute(
        &self,
        _ctx: ExecutionContext,
        _config: Configuration,
        cancel: CancelFlag,
        _output: Arc<dyn OutputSink>,
    ) -> BoxFuture<'_, PluginResult> {
        Box::pin(async move {
            cancel.wait().await;
            PluginResult::new(docagent::contracts::ResultStatus::Cancelled, 1)
        })
    }
}

/// In-process long-running plugin with switchable failures.
#[derive(Debug, Default)]
pub struct FakeLongRunningPlugin {
    running: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    stderr_on_start: Mutex<Option<String>>,
    last_configuration: Mutex<Option<String>>,
    last_dir: Mutex<Option<PathBuf>>,
    stop_delay: Mutex<Duration>,
}

impl FakeLongRunningPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Simulate the daemon dying (or coming up) on its own.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Make every `stop` sleep this long before doing anything.
    pub fn set_stop_delay(&self, delay: Duration) {
        *self.stop_delay.lock().expect("delay lock") = delay;
    }

    pub fn set_stderr_on_start(&self, text: &str) {
        *self.stderr_on_start.lock().expect("stderr lock") = Some(text.to_string());
    }

    pub fn is_running_now(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn last_configuration(&self) -> Option<String> {
        self.last_configuration.lock().expect("config lock").clone()
    }

    pub fn last_orchestration_dir(&self) -> Option<PathBuf> {
        self.last_dir.lock().expect("dir lock").clone()
    }
}

impl LongRunningPlugin for FakeLongRunningPlugin {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn start(
        &self,
        configuration: String,
        orchestration_dir: PathBuf,
        _cancel: CancelFlag,
        output: Arc<dyn OutputSink>,
    ) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.last_configuration.lock().expect("config lock") = Some(configuration);
            *self.last_dir.lock().expect("dir lock") = Some(orchestration_dir);

            if self.fail_start.load(Ordering::SeqCst) {
                anyhow::bail!("fake start failure");
            }
            if let Some(text) = self.stderr_on_start.lock().expect("stderr lock").clone() {
                output.append_error(&text);
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn stop(&self, _cancel: CancelFlag) -> BoxFuture<'_, anyhow::Result<()>> {
        let delay = *self.stop_delay.lock().expect("delay lock");
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop.load(Ordering::SeqCst) {
                anyhow::bail!("fake stop failure");
            }
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        })
    }
}
