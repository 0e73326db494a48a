//! Drivers that connect the hook registry to the tokio clock and to raw
//! file descriptors registered by scripts.

use crate::App;

use lattice_core::{Core, FdEvent, HookId};

use std::collections::HashSet;
use std::time::{Duration, Instant};

use log::{debug, warn};

/// Upper bound on a driver nap, so newly registered hooks are picked up
/// promptly even when nothing else is due.
const MAX_TICK: Duration = Duration::from_millis(250);

/// Fires due timer hooks and sleeps until the next deadline.
pub(crate) async fn timer_task(core: Core) {
    loop {
        let next = core.process_timers(Instant::now());
        let nap = match next {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(MAX_TICK),
            None => MAX_TICK,
        };
        tokio::time::sleep(nap).await;
    }
}

/// Arms a readiness watcher for every fd hook; watchers exit when their
/// hook is gone.
pub(crate) async fn fd_task(app: App) {
    let mut watched: HashSet<HookId> = HashSet::new();
    loop {
        for (id, spec) in app.core.fd_hooks() {
            if watched.insert(id) {
                tokio::task::spawn_local(fd_watcher(app.core.clone(), id, spec));
            }
        }
        watched.retain(|id| app.core.fd_hooks().iter().any(|(hid, _)| hid == id));
        tokio::time::sleep(MAX_TICK).await;
    }
}

#[cfg(unix)]
async fn fd_watcher(core: Core, id: HookId, spec: lattice_core::FdSpec) {
    use std::os::fd::{AsRawFd, RawFd};
    use tokio::io::unix::AsyncFd;
    use tokio::io::Interest;

    struct Fd(RawFd);

    impl AsRawFd for Fd {
        fn as_raw_fd(&self) -> RawFd {
            self.0
        }
    }

    let mut interest = Interest::READABLE;
    if spec.write {
        interest = interest | Interest::WRITABLE;
    }
    let async_fd = match AsyncFd::with_interest(Fd(spec.fd), interest) {
        Ok(fd) => fd,
        Err(err) => {
            warn!("can't watch fd {}: {}", spec.fd, err);
            return;
        }
    };

    loop {
        // The hook may have been removed since the last readiness.
        if !core.fd_hooks().iter().any(|(hid, _)| *hid == id) {
            return;
        }
        match async_fd.ready(interest).await {
            Err(err) => {
                debug!("fd {} watcher: {}", spec.fd, err);
                core.dispatch_fd(id, FdEvent::Exception);
                return;
            }
            Ok(mut guard) => {
                let ready = guard.ready();
                if spec.read && ready.is_readable() {
                    core.dispatch_fd(id, FdEvent::Read);
                }
                if spec.write && ready.is_writable() {
                    core.dispatch_fd(id, FdEvent::Write);
                }
                guard.clear_ready();
            }
        }
    }
}

#[cfg(not(unix))]
async fn fd_watcher(_core: Core, _id: HookId, _spec: lattice_core::FdSpec) {
    warn!("fd hooks are only supported on unix");
}
