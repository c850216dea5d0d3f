//! Suspend and resume a running child process
//!
//! Unix stops the process with `SIGSTOP`/`SIGCONT`. Windows suspends every
//! thread owned by the process.

use anyhow::Result;

pub fn suspend_process(pid: u32) -> Result<()> {
    imp::suspend(pid)
}

pub fn resume_process(pid: u32) -> Result<()> {
    imp::resume(pid)
}

#[cfg(unix)]
mod imp {
    use anyhow::{Context, Result};
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    pub fn suspend(pid: u32) -> Result<()> {
        send(pid, Signal::SIGSTOP)
    }

    pub fn resume(pid: u32) -> Result<()> {
        send(pid, Signal::SIGCONT)
    }

    fn send(pid: u32, signal: Signal) -> Result<()> {
        let raw = i32::try_from(pid).context("Process id out of range")?;
        kill(Pid::from_raw(raw), signal)
            .with_context(|| format!("Failed to send {:?} to process {}", signal, pid))
    }
}

#[cfg(windows)]
mod imp {
    use anyhow::{anyhow, Result};
    use winapi::shared::minwindef::DWORD;
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::processthreadsapi::{OpenThread, ResumeThread, SuspendThread};
    use winapi::um::tlhelp32::{
        CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
    };
    use winapi::um::winnt::{HANDLE, THREAD_SUSPEND_RESUME};

    pub fn suspend(pid: u32) -> Result<()> {
        for_each_thread(pid, SuspendThread)
    }

    pub fn resume(pid: u32) -> Result<()> {
        for_each_thread(pid, ResumeThread)
    }

    fn for_each_thread(pid: u32, action: unsafe extern "system" fn(HANDLE) -> DWORD) -> Result<()> {
        // SAFETY: every handle is checked before use and closed once
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0);
            if snapshot == INVALID_HANDLE_VALUE {
                return Err(anyhow!("Failed to snapshot threads of process {}", pid));
            }

            let mut entry: THREADENTRY32 = std::mem::zeroed();
            entry.dwSize = std::mem::size_of::<THREADENTRY32>() as u32;

            if Thread32First(snapshot, &mut entry) != 0 {
                loop {
                    if entry.th32OwnerProcessID == pid {
                        let thread = OpenThread(THREAD_SUSPEND_RESUME, 0, entry.th32ThreadID);
                        if !thread.is_null() {
                            action(thread);
                            CloseHandle(thread);
                        }
                    }
                    if Thread32Next(snapshot, &mut entry) == 0 {
                        break;
                    }
                }
            }
            CloseHandle(snapshot);
        }
        Ok(())
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    use anyhow::{anyhow, Result};

    pub fn suspend(pid: u32) -> Result<()> {
        Err(anyhow!("Suspending process {} is not supported on this platform", pid))
    }

    pub fn resume(pid: u32) -> Result<()> {
        Err(anyhow!("Resuming process {} is not supported on this platform", pid))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};
    use std::time::Duration;

    #[test]
    fn test_suspended_child_does_not_run_until_resumed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(format!("sleep 0.3; touch '{}'", marker.display()))
            .stdout(Stdio::null())
            .spawn()
            .unwrap();

        suspend_process(child.id()).unwrap();
        std::thread::sleep(Duration::from_millis(700));
        assert!(!marker.exists());

        resume_process(child.id()).unwrap();
        assert!(child.wait().unwrap().success());
        assert!(marker.exists());
    }
}
