//! Path translation for the Linux-under-Windows layer.
//!
//! The layer exposes Windows drives under `/mnt/<letter>`. Translation is
//! only applied when the host profile is [`OsFamily::WindowsLinuxLayer`];
//! every other profile passes paths through untouched.

use std::path::{Path, PathBuf};

use crate::platform::OsFamily;

/// Convert a Windows-native path (`C:\Users\dev`) into the layer form
/// (`/mnt/c/Users/dev`). Paths that are not drive-letter anchored are only
/// separator-normalized.
pub fn to_layer_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy().replace('\\', "/");
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let drive = bytes[0].to_ascii_lowercase() as char;
        let rest = raw[2..].trim_start_matches('/');
        if rest.is_empty() {
            PathBuf::from(format!("/mnt/{}", drive))
        } else {
            PathBuf::from(format!("/mnt/{}/{}", drive, rest))
        }
    } else {
        PathBuf::from(raw)
    }
}

/// Convert a layer path (`/mnt/c/Users/dev`) back into the Windows-native
/// form (`C:\Users\dev`). Non-`/mnt` paths are returned unchanged.
pub fn from_layer_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let mut parts = raw.trim_start_matches('/').split('/');
    match (parts.next(), parts.next()) {
        (Some("mnt"), Some(drive)) if drive.len() == 1 && drive.as_bytes()[0].is_ascii_alphabetic() => {
            let rest: Vec<&str> = parts.collect();
            let mut out = format!("{}:", drive.to_ascii_uppercase());
            if rest.is_empty() {
                out.push('\\');
            } else {
                for part in rest {
                    out.push('\\');
                    out.push_str(part);
                }
            }
            PathBuf::from(out)
        }
        _ => path.to_path_buf(),
    }
}

/// Translate a host path into the form the child process expects for the
/// given profile.
pub fn for_child(family: OsFamily, path: &Path) -> PathBuf {
    match family {
        OsFamily::WindowsLinuxLayer => to_layer_path(path),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_letter_becomes_mnt_prefix() {
        assert_eq!(
            to_layer_path(Path::new(r"C:\Users\dev\kube")),
            PathBuf::from("/mnt/c/Users/dev/kube")
        );
        assert_eq!(to_layer_path(Path::new(r"D:\")), PathBuf::from("/mnt/d"));
    }

    #[test]
    fn non_drive_paths_normalize_separators_only() {
        assert_eq!(
            to_layer_path(Path::new(r"relative\dir\file.yaml")),
            PathBuf::from("relative/dir/file.yaml")
        );
        assert_eq!(
            to_layer_path(Path::new("/already/unix")),
            PathBuf::from("/already/unix")
        );
    }

    #[test]
    fn mnt_prefix_round_trips_to_drive_letter() {
        assert_eq!(
            from_layer_path(Path::new("/mnt/c/Users/dev")),
            PathBuf::from(r"C:\Users\dev")
        );
        assert_eq!(
            from_layer_path(Path::new("/var/run/docker.sock")),
            PathBuf::from("/var/run/docker.sock")
        );
    }

    #[test]
    fn translation_is_identity_outside_the_layer() {
        let p = Path::new(r"C:\kube\config");
        assert_eq!(for_child(OsFamily::Linux, p), p.to_path_buf());
        assert_eq!(
            for_child(OsFamily::WindowsLinuxLayer, p),
            PathBuf::from("/mnt/c/kube/config")
        );
    }
}
