use anyhow::Context;
use std::path::Path;
use std::process::Command;

fn viewer_command(path: &Path) -> Command {
    if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]).arg(path);
        command
    } else if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.arg(path);
        command
    } else {
        let mut command = Command::new("xdg-open");
        command.arg(path);
        command
    }
}

/// 既定の画像ビューアで開きます。ビューアの終了は待ちません。
pub fn show(path: &Path) -> anyhow::Result<()> {
    let mut command = viewer_command(path);
    tracing::debug!(?command, "launching viewer");
    command
        .spawn()
        .with_context(|| format!("Failed to open {} in an image viewer", path.display()))?;
    Ok(())
}
