use std::io;

/// Whether the OS refused to hand out another file descriptor.
pub fn is_too_many_open_files(err: &io::Error) -> bool {
    err.raw_os_error().is_some_and(descriptor_exhausted)
}

// EMFILE (per process) and ENFILE (system wide).
#[cfg(unix)]
fn descriptor_exhausted(code: i32) -> bool {
    code == 24 || code == 23
}

// ERROR_TOO_MANY_OPEN_FILES
#[cfg(windows)]
fn descriptor_exhausted(code: i32) -> bool {
    code == 4
}

#[cfg(not(any(unix, windows)))]
fn descriptor_exhausted(_code: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_errors_are_not_descriptor_exhaustion() {
        assert!(!is_too_many_open_files(&io::Error::new(io::ErrorKind::Other, "boom")));
        assert!(!is_too_many_open_files(&io::Error::from(io::ErrorKind::NotFound)));
    }

    #[cfg(unix)]
    #[test]
    fn emfile_is_detected() {
        assert!(is_too_many_open_files(&io::Error::from_raw_os_error(24)));
        assert!(is_too_many_open_files(&io::Error::from_raw_os_error(23)));
        assert!(!is_too_many_open_files(&io::Error::from_raw_os_error(2)));
    }
}
