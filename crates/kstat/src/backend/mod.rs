//! Native kstat backends.
//!
//! The [`Backend`] trait is the call contract of `libkstat` as consumed by
//! [`Session`](crate::Session): open/close a context, walk the kstat chain,
//! look up a kstat, read its data, and look up named records in it. It lets
//! sessions run against the real library on illumos/Solaris or against
//! [`MockBackend`] in tests and on other platforms.

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
mod libkstat;
#[cfg(feature = "mock")]
pub mod mock;

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
pub use libkstat::LibKstat;
#[cfg(feature = "mock")]
pub use mock::MockBackend;

use crate::error::NativeError;

/// `ks_type` values from `<sys/kstat.h>`.
pub const KSTAT_TYPE_RAW: u8 = 0;
pub const KSTAT_TYPE_NAMED: u8 = 1;
pub const KSTAT_TYPE_INTR: u8 = 2;
pub const KSTAT_TYPE_IO: u8 = 3;
pub const KSTAT_TYPE_TIMER: u8 = 4;

/// `KSTAT_STRLEN`: size of the fixed module/name/class fields.
pub const KSTAT_STRLEN: usize = 31;

/// Size of one `kstat_named_t` record.
pub const KSTAT_NAMED_SIZE: usize = 48;

/// Opaque reference to one kstat inside a backend's chain.
///
/// Only meaningful to the backend that handed it out, and only while that
/// backend's context is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KstatId(pub usize);

/// Identity and bookkeeping fields of a kstat (`kstat_t` header).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KstatHeader {
    pub module: String,
    pub instance: i32,
    pub name: String,
    pub class: String,
    /// Raw `ks_type`.
    pub ks_type: u8,
    pub crtime: i64,
    pub snaptime: i64,
}

/// Borrowed view of a kstat's loaded data.
#[derive(Debug, Clone, Copy)]
pub struct RawData<'a> {
    pub bytes: &'a [u8],
    pub ndata: u64,
}

/// Borrowed view of one `kstat_named_t` record, undecoded.
#[derive(Debug, Clone, Copy)]
pub struct RawNamed<'a> {
    /// The fixed `name` field, possibly zero padded.
    pub name: &'a [u8],
    /// Raw `data_type` tag.
    pub data_type: u8,
    /// The 16 bytes of the `value` union, native byte order.
    pub value: [u8; 16],
    /// Out-of-line payload of a `KSTAT_DATA_STRING` record, without its
    /// terminating zero. `None` for every other tag.
    pub string: Option<&'a [u8]>,
}

/// Call contract of a native kstat facility.
///
/// Implementations are not expected to be thread safe; a `Session` never
/// calls into its backend concurrently.
pub trait Backend {
    /// Creates a context (`kstat_open`).
    fn open() -> Result<Self, NativeError>
    where
        Self: Sized;

    /// Releases the context (`kstat_close`). Called at most once.
    fn close(&mut self) -> Result<(), NativeError>;

    /// First kstat of the chain (`kc_chain`).
    fn first(&self) -> Option<KstatId>;

    /// Kstat following `id` in the chain (`ks_next`).
    fn next(&self, id: KstatId) -> Option<KstatId>;

    /// Finds the first kstat matching the triple (`kstat_lookup`).
    ///
    /// `None` for module or name, or for instance, matches anything.
    fn lookup(
        &self,
        module: Option<&str>,
        instance: Option<i32>,
        name: Option<&str>,
    ) -> Option<KstatId>;

    /// Header fields of `id`.
    fn header(&self, id: KstatId) -> KstatHeader;

    /// Current `ks_snaptime` of `id`; 0 until it is first read.
    fn snaptime(&self, id: KstatId) -> i64;

    /// Reads fresh data for `id` and updates its snapshot time (`kstat_read`).
    fn read(&mut self, id: KstatId) -> Result<(), NativeError>;

    /// Currently loaded data of `id`, or `None` if it was never read.
    fn data(&self, id: KstatId) -> Option<RawData<'_>>;

    /// Named record `stat` of a loaded named kstat (`kstat_data_lookup`).
    fn data_lookup(&self, id: KstatId, stat: &str) -> Option<RawNamed<'_>>;

    /// Every named record of a loaded named kstat, in data order.
    fn named_records(&self, id: KstatId) -> Vec<RawNamed<'_>>;
}
