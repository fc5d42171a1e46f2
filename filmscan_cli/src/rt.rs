//! Real-time scheduling helpers (Linux SCHED_FIFO + mlockall; macOS mlockall).

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn lock_memory() -> std::io::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};
    let rc = unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) };
    if rc != 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn memlock_limit_hint() -> Option<String> {
    unsafe {
        let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
        if libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) != 0 {
            return None;
        }
        let cur = rlim.assume_init().rlim_cur;
        if cur == libc::RLIM_INFINITY {
            Some("memlock limit: unlimited".to_string())
        } else {
            Some(format!("memlock limit: {} KiB", cur / 1024))
        }
    }
}

/// SCHED_FIFO at `prio` (default: the system maximum), clamped to the valid range.
#[cfg(target_os = "linux")]
fn apply_fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};

    let (min, max) = unsafe {
        let min = sched_get_priority_min(SCHED_FIFO);
        let max = sched_get_priority_max(SCHED_FIFO);
        if min < 0 || max < 0 { (1, 99) } else { (min, max) }
    };
    let prio_val = prio.unwrap_or(max).clamp(min, max);
    let param = sched_param {
        sched_priority: prio_val,
    };
    let rc = unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        eyre::bail!("{err}; hint: needs CAP_SYS_NICE or root");
    }
    Ok(prio_val)
}

/// Apply real-time settings once per process. Failures are logged, never fatal.
#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();
    if !rt {
        return;
    }
    RT_ONCE.get_or_init(|| {
        match lock_memory() {
            Ok(()) => tracing::info!("memory locked (current|future)"),
            Err(err) => {
                let hint = memlock_limit_hint().unwrap_or_default();
                tracing::warn!(%err, hint, "mlockall failed; needs CAP_IPC_LOCK and 'ulimit -l'");
            }
        }
        match apply_fifo_priority(prio) {
            Ok(p) => tracing::info!(prio = p, "SCHED_FIFO enabled"),
            Err(err) => tracing::warn!(?prio, %err, "sched_setscheduler(SCHED_FIFO) failed"),
        }
    });
}

#[cfg(target_os = "macos")]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();
    if !rt {
        return;
    }
    RT_ONCE.get_or_init(|| {
        if let Err(err) = lock_memory() {
            tracing::warn!(%err, "mlockall(MCL_CURRENT|MCL_FUTURE) failed");
        }
        tracing::warn!("macOS has no SCHED_FIFO; only mlockall applied");
    });
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>) {
    if rt {
        tracing::warn!("real-time mode not supported on this OS");
    }
}
