use std::ffi::CStr;
use std::io;
use std::path::Path;

/// Mount points at or below `base` as listed in `/proc/mounts`, sorted so
/// nested mounts come before their parents.
pub fn get_mounts(base: &Path) -> io::Result<Vec<String>> {
    let mut mounts = Vec::new();

    let system_mounts =
        unsafe { libc::setmntent(c"/proc/mounts".as_ptr(), c"r".as_ptr()) };

    if system_mounts.is_null() {
        return Err(io::Error::other("Failed to open /proc/mounts"));
    }

    loop {
        let mnt = unsafe { libc::getmntent(system_mounts) };
        if mnt.is_null() {
            break;
        }

        let mnt_dir = String::from(unsafe {
            CStr::from_ptr((*mnt).mnt_dir).to_string_lossy()
        });

        if Path::new(&mnt_dir).starts_with(base) {
            mounts.push(mnt_dir);
        }
    }

    unsafe { libc::endmntent(system_mounts) };

    mounts.sort_by(|a, b| b.cmp(a));
    mounts.dedup();

    Ok(mounts)
}
