use std::path::{Path, PathBuf};

pub fn is_executable_present(path: &Path) -> bool {
    path.exists() && is_executable(path)
}

pub fn is_executable(path: &Path) -> bool {
    #[cfg(windows)]
    {
        path.extension().map_or(false, |ext| ext == "exe")
    }
    #[cfg(not(windows))]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path).map_or(false, |metadata| {
            let permissions = metadata.permissions();
            permissions.mode() & 0o111 != 0
        })
    }
}

/// Platform file name of a tool, e.g. `ffmpeg.exe` on Windows.
pub fn executable_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

/// Looks a tool up on `PATH` first, then at the managed location.
pub fn locate_tool(tool: &str, managed_path: &Path) -> Option<PathBuf> {
    if let Ok(found) = which::which(tool) {
        log::debug!("{} found on PATH at {:?}", tool, found);
        return Some(found);
    }
    if is_executable_present(managed_path) {
        log::debug!("{} found at managed location {:?}", tool, managed_path);
        return Some(managed_path.to_path_buf());
    }
    None
}

#[cfg(unix)]
pub async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o755);
    tokio::fs::set_permissions(path, perms).await
}

#[cfg(not(unix))]
pub async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
