use nix::mount::MsFlags;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptionConfig {
    /// Mount Flags.
    pub flags: MsFlags,

    /// Filesystem specific options passed through as mount data.
    pub data: String,
}

/// Maps a mount(8) style option name onto the flag it sets or clears.
fn flag_for(option: &str) -> Option<(bool, MsFlags)> {
    let flag = match option {
        "defaults" => (false, MsFlags::empty()),
        "rw" => (true, MsFlags::MS_RDONLY),
        "ro" | "rdonly" => (false, MsFlags::MS_RDONLY),
        "suid" => (true, MsFlags::MS_NOSUID),
        "nosuid" => (false, MsFlags::MS_NOSUID),
        "dev" => (true, MsFlags::MS_NODEV),
        "nodev" => (false, MsFlags::MS_NODEV),
        "exec" => (true, MsFlags::MS_NOEXEC),
        "noexec" => (false, MsFlags::MS_NOEXEC),
        "sync" | "synchronous" => (false, MsFlags::MS_SYNCHRONOUS),
        "async" => (true, MsFlags::MS_SYNCHRONOUS),
        "dirsync" => (false, MsFlags::MS_DIRSYNC),
        "remount" => (false, MsFlags::MS_REMOUNT),
        "mand" | "mandlock" => (false, MsFlags::MS_MANDLOCK),
        "nomand" => (true, MsFlags::MS_MANDLOCK),
        "atime" => (true, MsFlags::MS_NOATIME),
        "noatime" => (false, MsFlags::MS_NOATIME),
        "diratime" => (true, MsFlags::MS_NODIRATIME),
        "nodiratime" => (false, MsFlags::MS_NODIRATIME),
        "bind" => (false, MsFlags::MS_BIND),
        "rbind" => (false, MsFlags::MS_BIND | MsFlags::MS_REC),
        "move" => (false, MsFlags::MS_MOVE),
        "rec" => (false, MsFlags::MS_REC),
        "silent" => (false, MsFlags::MS_SILENT),
        "posixacl" => (false, MsFlags::MS_POSIXACL),
        "unbindable" => (false, MsFlags::MS_UNBINDABLE),
        "private" => (false, MsFlags::MS_PRIVATE),
        "slave" => (false, MsFlags::MS_SLAVE),
        "shared" => (false, MsFlags::MS_SHARED),
        "relatime" => (false, MsFlags::MS_RELATIME),
        "strictatime" => (false, MsFlags::MS_STRICTATIME),
        "lazytime" => (false, MsFlags::MS_LAZYTIME),
        "i_version" => (false, MsFlags::MS_I_VERSION),
        _ => return None,
    };
    Some(flag)
}

/// Splits options into mount flags and a comma joined data string holding
/// everything that is not a known flag, in the order given.
pub fn parse_options<S: AsRef<str>>(options: &[S]) -> MountOptionConfig {
    let mut flags = MsFlags::empty();
    let mut data = Vec::new();

    for option in options {
        let option = option.as_ref();
        match flag_for(option) {
            Some((true, flag)) => flags &= !flag,
            Some((false, flag)) => flags |= flag,
            None => data.push(option),
        }
    }

    MountOptionConfig {
        flags,
        data: data.join(","),
    }
}
