//! Pre-built mock kstat chains for testing.
//!
//! These scenarios provide realistic kstat chains of a small illumos
//! machine. Counters move on every read.

use super::backend::{MockBackend, MockNamed};
use crate::backend::{KSTAT_TYPE_INTR, KSTAT_TYPE_RAW};
use crate::types::{MNTINFO_PROTO_LEN, MNTINFO_SERVER_LEN};

/// Native-endian writer for fixed kernel struct layouts.
#[derive(Default)]
struct LayoutWriter(Vec<u8>);

impl LayoutWriter {
    fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_ne_bytes());
        self
    }

    fn i32(mut self, v: i32) -> Self {
        self.0.extend_from_slice(&v.to_ne_bytes());
        self
    }

    fn u64(mut self, v: u64) -> Self {
        self.0.extend_from_slice(&v.to_ne_bytes());
        self
    }

    fn i64(mut self, v: i64) -> Self {
        self.0.extend_from_slice(&v.to_ne_bytes());
        self
    }

    /// Zero padded fixed-size string field.
    fn fixed_str(mut self, s: &str, size: usize) -> Self {
        let start = self.0.len();
        self.0.extend_from_slice(s.as_bytes());
        self.0.resize(start + size, 0);
        self
    }

    /// Pads to the next multiple of `align`.
    fn align(mut self, align: usize) -> Self {
        let len = self.0.len().next_multiple_of(align);
        self.0.resize(len, 0);
        self
    }

    fn finish(self) -> Vec<u8> {
        self.0
    }
}

/// `kstat_io_t` of a busy disk.
fn sd0_io(reads: u64) -> Vec<u8> {
    io_counters(reads, 4_096, 120)
}

/// `kstat_io_t` of a mostly idle disk.
fn sd1_io(reads: u64) -> Vec<u8> {
    io_counters(reads, 512, 3)
}

fn io_counters(reads: u64, bytes_per_op: u64, ops_per_read: u64) -> Vec<u8> {
    let ops = 1_000 + reads * ops_per_read;
    let now = 5_000_000_000 + reads as i64 * 10_000_000;
    LayoutWriter::default()
        .u64(ops * bytes_per_op) // nread
        .u64(ops / 2 * bytes_per_op) // nwritten
        .u32(ops as u32) // reads
        .u32((ops / 2) as u32) // writes
        .i64(ops as i64 * 1_500) // wtime
        .i64(ops as i64 * 2_000) // wlentime
        .i64(now) // wlastupdate
        .i64(ops as i64 * 40_000) // rtime
        .i64(ops as i64 * 55_000) // rlentime
        .i64(now) // rlastupdate
        .u32(0) // wcnt
        .u32(1) // rcnt
        .finish()
}

fn sysinfo(reads: u64) -> Vec<u8> {
    let updates = 12_345 + reads as u32;
    LayoutWriter::default()
        .u32(updates)
        .u32(updates * 2) // runque
        .u32(updates / 3) // runocc
        .u32(0) // swpque
        .u32(0) // swpocc
        .u32(updates / 10) // waiting
        .finish()
}

fn vminfo(reads: u64) -> Vec<u8> {
    let updates = 12_345 + reads;
    LayoutWriter::default()
        .u64(updates * 2_000_000) // freemem
        .u64(updates * 300_000) // swap_resv
        .u64(updates * 250_000) // swap_alloc
        .u64(updates * 4_000_000) // swap_avail
        .u64(updates * 4_100_000) // swap_free
        .u64(updates)
        .finish()
}

fn var() -> Vec<u8> {
    LayoutWriter::default()
        .i32(100) // buf
        .i32(0) // call
        .i32(30_000) // proc
        .i32(0) // maxupttl
        .i32(170) // nglobpris
        .i32(99) // maxsyspri
        .i32(0) // clist
        .i32(29_995) // maxup
        .i32(256) // hbuf
        .i32(255) // hmask
        .i32(0) // pbuf
        .i32(0) // sptmap
        .i32(0) // maxpmem
        .i32(30) // autoup
        .i32(1_048_576) // bufhwm
        .finish()
}

fn mntinfo(proto: &str, vers: u32, server: &str) -> Vec<u8> {
    let mut w = LayoutWriter::default()
        .fixed_str(proto, MNTINFO_PROTO_LEN)
        .u32(vers)
        .u32(0x2000) // flags
        .u32(1) // secmod
        .u32(1_048_576) // curread
        .u32(1_048_576) // curwrite
        .i32(600) // timeo
        .i32(5) // retrans
        .u32(3) // acregmin
        .u32(60) // acregmax
        .u32(30) // acdirmin
        .u32(60); // acdirmax
    for (srtt, deviate) in [(12, 4), (30, 8), (45, 10), (0, 0)] {
        w = w.u32(srtt).u32(deviate).u32(srtt + 4 * deviate);
    }
    w.u32(0) // noresponse
        .u32(0) // failover
        .u32(0) // remap
        .fixed_str(server, MNTINFO_SERVER_LEN)
        .align(4)
        .finish()
}

/// `kstat_intr_t`: hard, soft, watchdog, spurious, multiple-service.
fn ata0_intr(reads: u64) -> Vec<u8> {
    LayoutWriter::default()
        .u32(50_000 + reads as u32 * 25)
        .u32(0)
        .u32(0)
        .u32(2)
        .u32(0)
        .finish()
}

impl MockBackend {
    /// A two-CPU machine with two disks and one NFS mount.
    ///
    /// Includes per-CPU `sys` and `cpu_info` named kstats, `unix`
    /// system kstats (named and raw), `sd` IO kstats, an `nfs:*:mntinfo`
    /// raw kstat and an interrupt kstat.
    pub fn typical_system() -> Self {
        let mut b = Self::minimal_system();
        b.add_raw("nfs", 3, "mntinfo", "misc", mntinfo("tcp", 4, "fileserver.example.com"));
        b
    }

    /// Same as [`typical_system`](Self::typical_system) but without any NFS
    /// mounts.
    pub fn minimal_system() -> Self {
        let mut b = Self::new();

        for cpu in 0..2 {
            b.add_named("cpu", cpu, "sys", "misc", cpu_sys(cpu));
        }
        b.add_named(
            "unix",
            0,
            "system_misc",
            "misc",
            vec![
                MockNamed::uint32("ncpus", 2),
                MockNamed::uint32("lbolt", 1_234_500).advancing(1),
                MockNamed::uint32("clk_intr", 1_234_500).advancing(1),
                MockNamed::uint32("nproc", 87),
                MockNamed::uint32("avenrun_1min", 45),
                MockNamed::uint32("boot_time", 1_700_000_000),
            ],
        );
        for cpu in 0..2 {
            b.add_named(
                "cpu_info",
                cpu,
                &format!("cpu_info{cpu}"),
                "misc",
                vec![
                    MockNamed::chars("state", "on-line"),
                    MockNamed::int32("state_begin", 1_700_000_000),
                    MockNamed::chars("cpu_type", "i386"),
                    MockNamed::string("brand", "Intel(r) Xeon(r) CPU E5-2650 v4 @ 2.20GHz"),
                    MockNamed::string("vendor_id", "GenuineIntel"),
                    MockNamed::int32("family", 6),
                    MockNamed::int32("model", 79),
                    MockNamed::int64("clock_MHz", 2_200),
                    MockNamed::uint64("current_clock_Hz", 2_200_000_000),
                ],
            );
        }
        b.add_named("acpi", 0, "acpi", "misc", vec![MockNamed::uint32("gpe_count", 16)]);

        b.add_io("sd", 0, "sd0", sd0_io);
        b.add_io("sd", 1, "sd1", sd1_io);

        b.add_generated("unix", 0, "sysinfo", "misc", KSTAT_TYPE_RAW, sysinfo);
        b.add_generated("unix", 0, "vminfo", "vm", KSTAT_TYPE_RAW, vminfo);
        b.add_raw("unix", 0, "var", "misc", var());

        b.add_generated("ata", 0, "ata0", "controller", KSTAT_TYPE_INTR, ata0_intr);
        b
    }
}

fn cpu_sys(cpu: i32) -> Vec<MockNamed> {
    let base = 1_000_000 * (cpu as u64 + 1);
    vec![
        MockNamed::uint64("cpu_ticks_idle", base * 8).advancing(9),
        MockNamed::uint64("cpu_ticks_kernel", base).advancing(1),
        MockNamed::uint64("cpu_ticks_user", base * 2),
        MockNamed::uint64("syscall", base * 50).advancing(377),
        MockNamed::uint64("sysread", base * 10).advancing(41),
        MockNamed::uint64("syswrite", base * 6).advancing(23),
        MockNamed::uint64("trap", base * 3).advancing(12),
        MockNamed::uint64("pswitch", base * 20).advancing(150),
    ]
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;
    use crate::types::{Io, Mntinfo, Sysinfo, Var, Vminfo};

    #[test]
    fn test_layouts_match_native_sizes() {
        assert_eq!(sd0_io(0).len(), size_of::<Io>());
        assert_eq!(sysinfo(0).len(), size_of::<Sysinfo>());
        assert_eq!(vminfo(0).len(), size_of::<Vminfo>());
        assert_eq!(var().len(), size_of::<Var>());
        assert_eq!(mntinfo("udp", 3, "nas").len(), size_of::<Mntinfo>());
    }

    #[test]
    fn test_typical_has_mntinfo_minimal_not() {
        let typical = MockBackend::typical_system();
        let minimal = MockBackend::minimal_system();
        assert_eq!(typical.len(), minimal.len() + 1);
    }

    #[test]
    fn test_io_counters_grow() {
        let a = crate::raw::read_layout::<Io>(&sd1_io(1)).unwrap();
        let b = crate::raw::read_layout::<Io>(&sd1_io(2)).unwrap();
        assert!(b.reads > a.reads);
        assert!(b.rlastupdate > a.rlastupdate);
    }
}
