// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic swap and relaunch. The common invariant across platforms: the
//! new binary is visible at its final path only after verification, and a
//! crash mid-install leaves the previous version runnable.

use std::path::Path;

/// Replace `target` with the verified artifact at `staged`.
///
/// The previous binary is renamed aside first, so either rename failing
/// leaves a runnable binary on disk. Both paths must be on the same
/// filesystem for the renames to be atomic.
pub fn atomic_swap(staged: &Path, target: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(staged)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(staged, perms)?;
    }

    let backup = target.with_extension("previous");
    if target.exists() {
        std::fs::rename(target, &backup)?;
    }
    if let Err(e) = std::fs::rename(staged, target) {
        // Roll the previous binary back into place before failing.
        let _ = std::fs::rename(&backup, target);
        return Err(e.into());
    }
    Ok(())
}

/// Install the verified artifact over the running binary and relaunch.
///
/// - Unix (Linux service units, macOS bundles): rename over the current
///   binary, then re-exec with the original arguments; the supervising
///   unit sees an uninterrupted process.
/// - Windows: the artifact is an MSI; invoke the installer, whose service
///   actions stop, replace, and restart the agent, then exit.
pub fn apply_and_relaunch(staged: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        let current_exe = std::env::current_exe()?;
        atomic_swap(staged, &current_exe)?;
        tracing::info!(exe = %current_exe.display(), "relaunching updated binary");

        let args: Vec<String> = std::env::args().skip(1).collect();
        // exec replaces this process on success and only returns on error.
        let err = std::process::Command::new(&current_exe).args(&args).exec();
        Err(anyhow::anyhow!("exec after update failed: {err}"))
    }

    #[cfg(windows)]
    {
        tracing::info!(msi = %staged.display(), "handing off to the MSI installer");
        std::process::Command::new("msiexec")
            .args(["/i".as_ref(), staged.as_os_str(), "/qn".as_ref()])
            .spawn()?;
        // The installer's service actions restart the agent.
        std::process::exit(0);
    }
}

#[cfg(test)]
#[path = "install_tests.rs"]
mod tests;
