//! Fixed-layout mirrors of native kstat data structures.
//!
//! These are byte-for-byte copies of the kernel structs on amd64, filled in
//! with [`Kstat::copy_to`](crate::Kstat::copy_to). They hold no snapshot
//! time or kstat reference of their own; keep the [`Kstat`](crate::Kstat)
//! around if you need those.

use serde::{Serialize, Serializer};

use crate::raw::{RawLayout, extract_fixed_string};

/// Disk I/O counters from an IO kstat (`kstat_io_t`).
///
/// Source: any kstat of type `KSTAT_TYPE_IO`, e.g. `sd:0:sd0`.
#[repr(C)]
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Default)]
pub struct Io {
    /// Number of bytes read.
    pub nread: u64,
    /// Number of bytes written.
    pub nwritten: u64,
    /// Number of read operations.
    pub reads: u32,
    /// Number of write operations.
    pub writes: u32,

    /// Cumulative wait (pre-service) time, nanoseconds.
    pub wtime: i64,
    /// Cumulative wait length*time product.
    pub wlentime: i64,
    /// Last time the wait queue changed.
    pub wlastupdate: i64,
    /// Cumulative run (service) time, nanoseconds.
    pub rtime: i64,
    /// Cumulative run length*time product.
    pub rlentime: i64,
    /// Last time the run queue changed.
    pub rlastupdate: i64,

    /// Count of elements in the wait state.
    pub wcnt: u32,
    /// Count of elements in the run state.
    pub rcnt: u32,
}

unsafe impl RawLayout for Io {}

/// System activity counters (`sysinfo_t`).
///
/// Source: `unix:0:sysinfo`
#[repr(C)]
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Default)]
pub struct Sysinfo {
    /// Incremented once per second.
    pub updates: u32,
    /// Cumulative run queue length.
    pub runque: u32,
    /// Seconds with a non-empty run queue.
    pub runocc: u32,
    pub swpque: u32,
    pub swpocc: u32,
    /// Cumulative count of threads waiting on I/O.
    pub waiting: u32,
}

unsafe impl RawLayout for Sysinfo {}

/// Virtual memory counters (`vminfo_t`), in pages.
///
/// Source: `unix:0:vminfo`
#[repr(C)]
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Default)]
pub struct Vminfo {
    pub freemem: u64,
    pub swap_resv: u64,
    pub swap_alloc: u64,
    pub swap_avail: u64,
    pub swap_free: u64,
    /// Incremented once per second.
    pub updates: u64,
}

unsafe impl RawLayout for Vminfo {}

/// Kernel tuning variables (`struct var`).
///
/// Source: `unix:0:var`
#[repr(C)]
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Default)]
pub struct Var {
    pub buf: i32,
    pub call: i32,
    pub proc: i32,
    pub maxupttl: i32,
    pub nglobpris: i32,
    pub maxsyspri: i32,
    pub clist: i32,
    pub maxup: i32,
    pub hbuf: i32,
    pub hmask: i32,
    pub pbuf: i32,
    pub sptmap: i32,
    pub maxpmem: i32,
    pub autoup: i32,
    pub bufhwm: i32,
}

unsafe impl RawLayout for Var {}

/// Size of `mik_proto` (`KNC_STRSIZE`).
pub const MNTINFO_PROTO_LEN: usize = 128;
/// Size of `mik_curserver` (`SYS_NMLN`).
pub const MNTINFO_SERVER_LEN: usize = 257;

/// RPC round-trip timer for one NFS call type.
#[repr(C)]
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Default)]
pub struct MntinfoTimer {
    pub srtt: u32,
    pub deviate: u32,
    pub rtxcur: u32,
}

unsafe impl RawLayout for MntinfoTimer {}

/// NFS client mount information (`struct mntinfo_kstat`).
///
/// Source: `nfs:*:mntinfo`, one per NFS mount.
#[repr(C)]
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
pub struct Mntinfo {
    /// Transport protocol, zero padded. See [`Mntinfo::proto`].
    #[serde(serialize_with = "serialize_fixed_string")]
    pub proto_raw: [u8; MNTINFO_PROTO_LEN],
    /// NFS protocol version.
    pub vers: u32,
    pub flags: u32,
    pub secmod: u32,
    pub curread: u32,
    pub curwrite: u32,
    pub timeo: i32,
    pub retrans: i32,
    pub acregmin: u32,
    pub acregmax: u32,
    pub acdirmin: u32,
    pub acdirmax: u32,
    /// Lookups, reads, writes, and a spare slot.
    pub timers: [MntinfoTimer; 4],
    pub noresponse: u32,
    pub failover: u32,
    pub remap: u32,
    /// Current server name, zero padded. See [`Mntinfo::curserver`].
    #[serde(serialize_with = "serialize_fixed_string")]
    pub curserver_raw: [u8; MNTINFO_SERVER_LEN],
}

unsafe impl RawLayout for Mntinfo {}

impl Mntinfo {
    /// Transport protocol name, e.g. `tcp`.
    pub fn proto(&self) -> String {
        extract_fixed_string(&self.proto_raw)
    }

    /// Name of the server currently in use.
    pub fn curserver(&self) -> String {
        extract_fixed_string(&self.curserver_raw)
    }
}

impl Default for Mntinfo {
    fn default() -> Self {
        Self {
            proto_raw: [0; MNTINFO_PROTO_LEN],
            vers: 0,
            flags: 0,
            secmod: 0,
            curread: 0,
            curwrite: 0,
            timeo: 0,
            retrans: 0,
            acregmin: 0,
            acregmax: 0,
            acdirmin: 0,
            acdirmax: 0,
            timers: [MntinfoTimer::default(); 4],
            noresponse: 0,
            failover: 0,
            remap: 0,
            curserver_raw: [0; MNTINFO_SERVER_LEN],
        }
    }
}

fn serialize_fixed_string<S: Serializer, const N: usize>(
    buf: &[u8; N],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&extract_fixed_string(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_struct_sizes_match_native() {
        assert_eq!(size_of::<Io>(), 0x50);
        assert_eq!(size_of::<Sysinfo>(), 0x18);
        assert_eq!(size_of::<Vminfo>(), 0x30);
        assert_eq!(size_of::<Var>(), 0x3c);
        assert_eq!(size_of::<Mntinfo>(), 0x1ec);
    }

    #[test]
    fn test_mntinfo_string_fields() {
        let mut mi = Mntinfo::default();
        mi.proto_raw[..3].copy_from_slice(b"tcp");
        mi.curserver_raw[..7].copy_from_slice(b"fs1.lan");
        assert_eq!(mi.proto(), "tcp");
        assert_eq!(mi.curserver(), "fs1.lan");

        mi.curserver_raw = [b'x'; MNTINFO_SERVER_LEN];
        assert_eq!(mi.curserver().len(), MNTINFO_SERVER_LEN);
    }

    #[test]
    fn test_default_mntinfo_has_empty_strings() {
        let mi = Mntinfo::default();
        assert_eq!(mi.proto(), "");
        assert_eq!(mi.curserver(), "");
    }
}
