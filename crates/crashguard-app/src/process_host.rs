//! Process host
//!
//! Runs the supervisor inside an ordinary OS process: components are
//! executables, the recovery surface is a detached child process, and
//! "surfaces" are whatever top-level windows or sessions the embedding
//! application registers here.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crashguard_core::{
    ComponentId, ComponentRegistry, HandoffPayload, Host, HostError, LifecycleEvent,
    LifecycleListener, SurfaceHandle,
};

use crate::registry::{ConfigRegistry, LaunchCommand};

/// Closes one surface; called at most once
pub type SurfaceCloser = Box<dyn FnOnce() + Send>;

/// Host for a plain OS process
pub struct ProcessHost {
    registry: ConfigRegistry,
    next_surface: AtomicU64,
    surfaces: Mutex<HashMap<SurfaceHandle, SurfaceCloser>>,
    listeners: Mutex<Vec<Arc<dyn LifecycleListener>>>,
}

impl ProcessHost {
    pub fn new(registry: ConfigRegistry) -> Self {
        Self {
            registry,
            next_surface: AtomicU64::new(1),
            surfaces: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    /// Register a new top-level surface of `component`
    ///
    /// `closer` is run if the supervisor force-closes the surface.
    pub fn open_surface(&self, component: ComponentId, closer: SurfaceCloser) -> SurfaceHandle {
        let surface = SurfaceHandle::new(self.next_surface.fetch_add(1, Ordering::Relaxed));
        self.surfaces.lock().insert(surface, closer);
        self.emit(&LifecycleEvent::Created { surface, component });
        surface
    }

    /// The surface became visible
    pub fn surface_started(&self, surface: SurfaceHandle) {
        self.emit(&LifecycleEvent::Started { surface });
    }

    /// The surface stopped being visible
    pub fn surface_stopped(&self, surface: SurfaceHandle) {
        self.emit(&LifecycleEvent::Stopped { surface });
    }

    /// The surface went away on its own
    pub fn drop_surface(&self, surface: SurfaceHandle) {
        self.surfaces.lock().remove(&surface);
    }

    fn emit(&self, event: &LifecycleEvent) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.on_lifecycle(event);
        }
    }

    /// Start `command` with `extra_args` detached from this process
    pub fn spawn_detached(
        &self,
        id: &ComponentId,
        command: &LaunchCommand,
        extra_args: &[String],
    ) -> Result<u32, HostError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .args(extra_args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    // New session so the child survives our exit
                    if libc::setsid() < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let child = cmd
            .spawn()
            .map_err(|e| HostError::Spawn(id.clone(), e))?;
        log::info!(
            "Spawned {} ({}) as PID {}",
            id,
            command.program.display(),
            child.id()
        );
        Ok(child.id())
    }
}

impl ComponentRegistry for ProcessHost {
    fn query(&self, action: &str) -> Vec<ComponentId> {
        self.registry.query(action)
    }

    fn default_entry_point(&self) -> Option<ComponentId> {
        self.registry.default_entry_point()
    }
}

impl Host for ProcessHost {
    fn launch(&self, surface: &ComponentId, payload: &HandoffPayload) -> Result<(), HostError> {
        let command = self
            .registry
            .command_for(surface)
            .ok_or_else(|| HostError::UnknownComponent(surface.clone()))?;
        self.spawn_detached(surface, &command, &payload.to_args())?;
        Ok(())
    }

    fn close_surface(&self, surface: SurfaceHandle) -> bool {
        let closer = self.surfaces.lock().remove(&surface);
        match closer {
            Some(closer) => {
                closer();
                true
            }
            None => false,
        }
    }

    fn subscribe_lifecycle(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.lock().push(listener);
    }

    fn terminate(&self, code: i32) -> ! {
        log::logger().flush();
        std::process::exit(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashguard_core::LivenessTracker;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_surface_lifecycle_reaches_listeners() {
        let host = ProcessHost::new(ConfigRegistry::default());
        let tracker = Arc::new(LivenessTracker::new());
        host.subscribe_lifecycle(tracker.clone());

        let surface = host.open_surface(ComponentId::new("my_app::main"), Box::new(|| {}));
        host.surface_started(surface);
        assert_eq!(tracker.last_created(), Some(surface));
        assert!(!tracker.is_background());

        host.surface_stopped(surface);
        assert!(tracker.is_background());
    }

    #[test]
    fn test_close_surface_runs_closer_once() {
        let host = ProcessHost::new(ConfigRegistry::default());
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();
        let surface = host.open_surface(
            ComponentId::new("my_app::main"),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        assert!(host.close_surface(surface));
        assert!(closed.load(Ordering::SeqCst));
        assert!(!host.close_surface(surface));
    }

    #[test]
    fn test_dropped_surface_not_closed() {
        let host = ProcessHost::new(ConfigRegistry::default());
        let surface = host.open_surface(ComponentId::new("my_app::main"), Box::new(|| panic!("closed")));
        host.drop_surface(surface);
        assert!(!host.close_surface(surface));
    }

    #[test]
    fn test_launch_unknown_component() {
        let host = ProcessHost::new(ConfigRegistry::default());
        let payload = HandoffPayload {
            restart_target: None,
            show_details: true,
            fault_text: "boom".into(),
            icon_id: 0,
        };
        let result = host.launch(&ComponentId::new("no_such::surface"), &payload);
        assert!(matches!(result, Err(HostError::UnknownComponent(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_passes_payload_as_args() {
        use crate::config::ComponentConfig;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args.txt");
        let registry = ConfigRegistry::new(vec![ComponentConfig {
            id: ComponentId::new("test::recovery"),
            command: "/bin/sh".into(),
            args: vec![
                "-c".into(),
                format!("printf '%s\\n' \"$@\" > {}", out.display()),
                "sh".into(),
            ],
            actions: Vec::new(),
        }]);
        let host = ProcessHost::new(registry);
        let payload = HandoffPayload {
            restart_target: Some(ComponentId::new("/usr/bin/my-app")),
            show_details: false,
            fault_text: "panic: boom".into(),
            icon_id: 4,
        };
        host.launch(&ComponentId::new("test::recovery"), &payload).unwrap();

        let mut written = String::new();
        for _ in 0..100 {
            written = std::fs::read_to_string(&out).unwrap_or_default();
            if written.lines().count() >= 8 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(
            lines,
            vec![
                "--fault-text",
                "panic: boom",
                "--show-details",
                "false",
                "--icon-id",
                "4",
                "--restart-target",
                "/usr/bin/my-app"
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_with_nul_in_fault_text() {
        use crate::config::ComponentConfig;
        use crashguard_core::PayloadBuilder;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args.txt");
        let registry = ConfigRegistry::new(vec![ComponentConfig {
            id: ComponentId::new("test::recovery"),
            command: "/bin/sh".into(),
            args: vec![
                "-c".into(),
                format!("printf '%s\\n' \"$@\" > {}", out.display()),
                "sh".into(),
            ],
            actions: Vec::new(),
        }]);
        let host = ProcessHost::new(registry);
        let payload = PayloadBuilder::new(1024, true, 0).build("panic: bad input \0 here", None);
        host.launch(&ComponentId::new("test::recovery"), &payload).unwrap();

        let mut written = String::new();
        for _ in 0..100 {
            written = std::fs::read_to_string(&out).unwrap_or_default();
            if written.lines().count() >= 6 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.first(), Some(&"--fault-text"));
        assert_eq!(lines.get(1), Some(&"panic: bad input \u{FFFD} here"));
    }
}
