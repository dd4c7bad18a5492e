//! Crash supervisor
//!
//! Owns the installed state and runs the crash protocol on the faulting
//! thread:
//!
//! 1. Use the recovery surface resolved at install
//! 2. Skip recovery for conflictive faults
//! 3. Skip recovery in the background unless configured otherwise
//! 4. Build the bounded payload and launch the recovery surface
//! 5. Journal and report the raw fault text (best effort, bounded)
//! 6. Force-close the last created surface
//! 7. Terminate with [`SUPERVISED_CRASH_EXIT_CODE`]
//!
//! The protocol is acyclic: `Installed -> FaultCaptured -> {Skipped |
//! Recovered} -> Terminated`, and every path ends in termination.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::component::ComponentId;
use crate::config::SupervisorConfig;
use crate::conflict;
use crate::fault::FaultRecord;
use crate::host::{CrashJournal, HookSlot, HookState, Host, PanicHook};
use crate::liveness::{LifecycleListener, LivenessTracker, SurfaceHandle};
use crate::payload::{HandoffPayload, PayloadBuilder};
use crate::reporter::{self, CrashReport, Reporter};
use crate::resolver::TargetResolver;

/// Exit status of a process terminated by the supervisor
///
/// Distinct from the runtime's own panic exit (101) and abort (134), so a
/// process manager can tell a handled crash from a lower-level failure.
pub const SUPERVISED_CRASH_EXIT_CODE: i32 = 10;

/// Installation failures
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Crash supervisor is already installed")]
    AlreadyInstalled,

    #[error("Crash supervisor was not installed: {0}")]
    NotInstalled(String),
}

/// Where the crash protocol currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPhase {
    Installed,
    FaultCaptured,
    Skipped,
    Recovered,
    Terminated,
}

/// Why the recovery surface was not launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The fault implicates the recovery surface or bootstrap
    Conflictive,
    /// No surface was visible and background launch is disabled
    Background,
    /// The host could not start the recovery surface
    LaunchFailed,
}

/// Result of the recovery decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Recovered,
    Skipped(SkipReason),
}

/// Everything the crash protocol did for one fault, short of terminating
#[derive(Debug, Clone)]
pub struct CrashOutcome {
    pub recovery_surface: ComponentId,
    pub disposition: Disposition,
    /// The payload, when one was built
    pub payload: Option<HandoffPayload>,
    /// Surface that was force-closed, if it was still alive
    pub closed_surface: Option<SurfaceHandle>,
    /// Where the journal stored the raw fault text
    pub journal_path: Option<PathBuf>,
    pub exit_code: i32,
}

/// Configures and installs the crash supervisor
pub struct CrashSupervisor {
    config: SupervisorConfig,
    reporter: Option<Arc<dyn Reporter>>,
    journal: Option<Arc<dyn CrashJournal>>,
}

impl CrashSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            reporter: None,
            journal: None,
        }
    }

    /// Forward raw fault text to `reporter` on every crash
    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Write raw fault text to `journal` on every crash
    pub fn journal(mut self, journal: Arc<dyn CrashJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Install into `slot`
    ///
    /// A second installation into the same slot is a logged no-op. Any
    /// unexpected failure is contained here and reported as
    /// [`InstallError::NotInstalled`]; the host keeps running either way.
    pub fn install(
        self,
        host: Arc<dyn Host>,
        slot: &dyn HookSlot,
    ) -> Result<SupervisorHandle, InstallError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.install_inner(host, slot))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!(
                    "An unknown error occurred while installing the crash supervisor, it was not installed: {}",
                    message
                );
                Err(InstallError::NotInstalled(message))
            }
        }
    }

    fn install_inner(
        self,
        host: Arc<dyn Host>,
        slot: &dyn HookSlot,
    ) -> Result<SupervisorHandle, InstallError> {
        match slot.state() {
            HookState::Ours => {
                log::error!("Crash supervisor is already installed, doing nothing");
                return Err(InstallError::AlreadyInstalled);
            }
            HookState::Foreign => {
                log::warn!(
                    "A panic hook is already registered. Installing anyway, but it will not be called; \
                     install other crash reporters after the crash supervisor"
                );
            }
            HookState::Default => {}
        }

        if let Err(e) = self.config.validate() {
            log::warn!("{}, using {} bytes", e, self.config.effective_payload_budget());
        }

        let liveness = Arc::new(LivenessTracker::new());

        let payload_builder = PayloadBuilder::new(
            self.config.effective_payload_budget(),
            self.config.show_diagnostic_details,
            self.config.icon_id,
        );

        let ctx = Arc::new(SupervisorContext {
            config: self.config,
            host,
            reporter: self.reporter,
            journal: self.journal,
            liveness,
            payload_builder,
            recovery_surface: OnceLock::new(),
            restart_target: OnceLock::new(),
            previous_hook: Mutex::new(None),
            phase: Mutex::new(CrashPhase::Installed),
            handling: AtomicBool::new(false),
        });

        // Resolve before subscribing so the surface's own lifecycle events
        // never count as user activity.
        let surface = ctx.recovery_surface();
        log::debug!("Recovery surface is {}", surface);

        let listener: Arc<dyn LifecycleListener> = ctx.liveness.clone();
        ctx.host.subscribe_lifecycle(listener);

        let hook_ctx = Arc::clone(&ctx);
        let hook: PanicHook = Box::new(move |info: &PanicHookInfo<'_>| {
            let backtrace = Backtrace::force_capture();
            let fault = FaultRecord::from_panic(info, &backtrace);
            log::error!("Process has crashed, executing crash supervisor: {}", fault.top().message);
            hook_ctx.handle_fault(&fault);
        });
        *ctx.previous_hook.lock() = slot.replace(hook);

        log::info!("Crash supervisor has been installed");
        Ok(SupervisorHandle { ctx })
    }
}

/// Handle to the installed supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    ctx: Arc<SupervisorContext>,
}

impl SupervisorHandle {
    /// Frozen settings
    pub fn config(&self) -> &SupervisorConfig {
        &self.ctx.config
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.ctx.liveness
    }

    pub fn phase(&self) -> CrashPhase {
        *self.ctx.phase.lock()
    }

    /// Whether a foreign hook was replaced (it is kept, never called)
    pub fn replaced_foreign_hook(&self) -> bool {
        self.ctx.previous_hook.lock().is_some()
    }

    /// Run the crash protocol up to, but not including, termination
    pub fn process_fault(&self, fault: &FaultRecord) -> CrashOutcome {
        self.ctx.process_fault(fault)
    }

    /// Run the full crash protocol and terminate
    ///
    /// Besides the panic hook, hosts call this for fatal errors that never
    /// became panics, e.g. an `Err` escaping `main`.
    pub fn handle_fault(&self, fault: &FaultRecord) -> ! {
        self.ctx.handle_fault(fault)
    }
}

struct SupervisorContext {
    config: SupervisorConfig,
    host: Arc<dyn Host>,
    reporter: Option<Arc<dyn Reporter>>,
    journal: Option<Arc<dyn CrashJournal>>,
    liveness: Arc<LivenessTracker>,
    payload_builder: PayloadBuilder,
    /// Resolved at install, then fixed for the lifetime of this context
    recovery_surface: OnceLock<ComponentId>,
    /// Resolved on the first fault; a fresh install starts empty
    restart_target: OnceLock<Option<ComponentId>>,
    previous_hook: Mutex<Option<PanicHook>>,
    phase: Mutex<CrashPhase>,
    handling: AtomicBool,
}

impl SupervisorContext {
    fn handle_fault(&self, fault: &FaultRecord) -> ! {
        if self.handling.swap(true, Ordering::SeqCst) {
            log::error!("Fault raised while another fault is being handled, waiting for termination");
            std::thread::sleep(Duration::from_millis(self.config.concurrent_fault_wait_ms));
            self.host.terminate(SUPERVISED_CRASH_EXIT_CODE);
        }

        let exit_code = match panic::catch_unwind(AssertUnwindSafe(|| self.process_fault(fault))) {
            Ok(outcome) => outcome.exit_code,
            Err(payload) => {
                log::error!(
                    "Crash supervisor failed while handling a fault: {}",
                    panic_message(payload.as_ref())
                );
                SUPERVISED_CRASH_EXIT_CODE
            }
        };

        self.set_phase(CrashPhase::Terminated);
        log::info!("Terminating process with exit code {}", exit_code);
        self.host.terminate(exit_code)
    }

    fn process_fault(&self, fault: &FaultRecord) -> CrashOutcome {
        self.set_phase(CrashPhase::FaultCaptured);

        let liveness = self.liveness.snapshot();
        let surface = self.recovery_surface();
        let fault_text = fault.render();

        let mut payload = None;
        let disposition = if conflict::is_conflictive(fault, &surface) {
            log::error!(
                "The recovery surface or application bootstrap has crashed, {} will not be launched",
                surface
            );
            Disposition::Skipped(SkipReason::Conflictive)
        } else if !self.config.launch_recovery_when_background && liveness.is_background() {
            log::info!("Process is in the background, not launching {}", surface);
            Disposition::Skipped(SkipReason::Background)
        } else {
            let built = self.payload_builder.build(&fault_text, self.restart_target());
            let launched = self.host.launch(&surface, &built);
            payload = Some(built);
            match launched {
                Ok(()) => {
                    log::info!("Launched recovery surface {}", surface);
                    Disposition::Recovered
                }
                Err(e) => {
                    log::error!("Failed to launch recovery surface {}: {}", surface, e);
                    Disposition::Skipped(SkipReason::LaunchFailed)
                }
            }
        };

        self.set_phase(match disposition {
            Disposition::Recovered => CrashPhase::Recovered,
            Disposition::Skipped(_) => CrashPhase::Skipped,
        });

        let journal_path = self.write_journal(&fault_text);
        self.report(fault_text, journal_path.clone());
        let closed_surface = self.close_last_surface();

        CrashOutcome {
            recovery_surface: surface,
            disposition,
            payload,
            closed_surface,
            journal_path,
            exit_code: SUPERVISED_CRASH_EXIT_CODE,
        }
    }

    fn resolver(&self) -> TargetResolver<'_, dyn Host> {
        TargetResolver::new(
            self.host.as_ref(),
            self.config.recovery_surface.as_ref(),
            self.config.restart_target.as_ref(),
        )
    }

    fn recovery_surface(&self) -> ComponentId {
        let surface = self
            .recovery_surface
            .get_or_init(|| self.resolver().resolve_recovery_surface())
            .clone();
        self.liveness.exclude(surface.clone());
        surface
    }

    fn restart_target(&self) -> Option<ComponentId> {
        if !self.config.allow_restart {
            return None;
        }
        self.restart_target
            .get_or_init(|| self.resolver().resolve_restart_target())
            .clone()
    }

    /// Record the fault text on a worker thread, waiting at most
    /// `journal_timeout_ms` so a stalled filesystem cannot hold up
    /// termination
    fn write_journal(&self, fault_text: &str) -> Option<PathBuf> {
        let journal = Arc::clone(self.journal.as_ref()?);
        let text = fault_text.to_string();
        let (tx, rx) = mpsc::sync_channel(1);

        let spawned = std::thread::Builder::new()
            .name("crashguard-journal".into())
            .spawn(move || {
                let _ = tx.send(journal.record(&text));
            });
        if let Err(e) = spawned {
            log::warn!("Failed to start crash journal thread: {}", e);
            return None;
        }

        let timeout = Duration::from_millis(self.config.journal_timeout_ms);
        match rx.recv_timeout(timeout) {
            Ok(Ok(path)) => {
                log::info!("Crash record written to {}", path.display());
                Some(path)
            }
            Ok(Err(e)) => {
                log::warn!("Failed to write crash record: {}", e);
                None
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!("Crash record not written within {:?}, continuing without it", timeout);
                None
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                log::warn!("Crash journal thread exited without a result");
                None
            }
        }
    }

    fn report(&self, fault_text: String, attachment: Option<PathBuf>) {
        let Some(ref reporter) = self.reporter else {
            return;
        };
        let report = CrashReport::new(&self.config.app_name, fault_text, attachment);
        let Some(ticket) = reporter::dispatch(Arc::clone(reporter), report) else {
            return;
        };
        if self.config.report_grace_ms > 0 {
            if let Err(e) = ticket.wait(Duration::from_millis(self.config.report_grace_ms)) {
                log::warn!("Crash report did not complete before termination: {}", e);
            }
        }
    }

    fn close_last_surface(&self) -> Option<SurfaceHandle> {
        let surface = self.liveness.take_last_created()?;
        if self.host.close_surface(surface) {
            log::debug!("Closed last active surface {:?}", surface);
            Some(surface)
        } else {
            log::debug!("Last active surface {:?} is already gone", surface);
            None
        }
    }

    fn set_phase(&self, next: CrashPhase) {
        let mut phase = self.phase.lock();
        log::debug!("Crash supervisor: {:?} -> {:?}", *phase, next);
        *phase = next;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
