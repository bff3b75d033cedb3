use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Enumerate candidate serial devices. Boards enumerate as USB CDC-ACM
/// (`ttyACM*`) or via a USB-serial bridge (`ttyUSB*`).
pub fn list_ports() -> io::Result<Vec<PathBuf>> {
    let mut ports = Vec::new();
    for entry in std::fs::read_dir("/dev")? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("ttyACM") || name.starts_with("ttyUSB") {
            ports.push(entry.path());
        }
    }
    ports.sort();
    Ok(ports)
}

/// Open a serial device for reading and writing. Reads are non-blocking so
/// the connection can poll without stalling the UI loop. Line settings
/// (115200 8N1, raw) are expected to be configured on the device node.
#[cfg(unix)]
pub fn open_port(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
pub fn open_port(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}
