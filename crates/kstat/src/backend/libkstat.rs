//! `libkstat` bindings for illumos and Solaris.

use std::ffi::{CStr, CString};
use std::fmt;
use std::ptr;
use std::slice;

use libc::{c_char, c_int, c_uint, c_void, size_t};
use tracing::trace;

use crate::backend::{
    Backend, KSTAT_NAMED_SIZE, KSTAT_STRLEN, KSTAT_TYPE_NAMED, KstatHeader, KstatId, RawData,
    RawNamed,
};
use crate::error::NativeError;
use crate::named::DataType;
use crate::raw::extract_fixed_string;

type KidT = c_int;

/// `kstat_ctl_t`
#[repr(C)]
#[allow(dead_code)]
struct KstatCtl {
    kc_chain_id: KidT,
    kc_chain: *mut KstatT,
    kc_kd: c_int,
}

/// `kstat_t`, including the kernel-private trailer.
#[repr(C)]
#[allow(dead_code)]
struct KstatT {
    ks_crtime: i64,
    ks_next: *mut KstatT,
    ks_kid: KidT,
    ks_module: [c_char; KSTAT_STRLEN],
    ks_resv: u8,
    ks_instance: c_int,
    ks_name: [c_char; KSTAT_STRLEN],
    ks_type: u8,
    ks_class: [c_char; KSTAT_STRLEN],
    ks_flags: u8,
    ks_data: *mut c_void,
    ks_ndata: c_uint,
    ks_data_size: size_t,
    ks_snaptime: i64,
    ks_update: *mut c_void,
    ks_private: *mut c_void,
    ks_snapshot: *mut c_void,
    ks_lock: *mut c_void,
}

/// `kstat_named_t`. The value union is kept as bytes; for
/// `KSTAT_DATA_STRING` it starts with the string pointer.
#[repr(C)]
struct KstatNamedT {
    name: [c_char; KSTAT_STRLEN],
    data_type: u8,
    value: [u8; 16],
}

const _: () = assert!(std::mem::size_of::<KstatNamedT>() == KSTAT_NAMED_SIZE);

#[link(name = "kstat")]
unsafe extern "C" {
    fn kstat_open() -> *mut KstatCtl;
    fn kstat_close(kc: *mut KstatCtl) -> c_int;
    fn kstat_read(kc: *mut KstatCtl, ksp: *mut KstatT, buf: *mut c_void) -> KidT;
    fn kstat_lookup(
        kc: *mut KstatCtl,
        module: *const c_char,
        instance: c_int,
        name: *const c_char,
    ) -> *mut KstatT;
    fn kstat_data_lookup(ksp: *mut KstatT, name: *const c_char) -> *mut c_void;
}

/// The system kstat facility, through `libkstat`.
pub struct LibKstat {
    kc: *mut KstatCtl,
}

impl LibKstat {
    /// Pointer behind `id`.
    ///
    /// Ids are only handed out from the chain of this context, and the
    /// chain is never updated, so every id stays a live `kstat_t`.
    fn ksp(&self, id: KstatId) -> *mut KstatT {
        id.0 as *mut KstatT
    }

    fn ks(&self, id: KstatId) -> &KstatT {
        // SAFETY: see `ksp`; the kstat lives as long as `self.kc`.
        unsafe { &*self.ksp(id) }
    }

    fn id_of(ksp: *mut KstatT) -> Option<KstatId> {
        (!ksp.is_null()).then_some(KstatId(ksp as usize))
    }
}

fn c_field(field: &[c_char; KSTAT_STRLEN]) -> String {
    // SAFETY: c_char and u8 have the same size and alignment.
    let bytes = unsafe { slice::from_raw_parts(field.as_ptr().cast::<u8>(), field.len()) };
    extract_fixed_string(bytes)
}

fn to_raw_named(rec: &KstatNamedT) -> RawNamed<'_> {
    // SAFETY: as in `c_field`.
    let name = unsafe { slice::from_raw_parts(rec.name.as_ptr().cast::<u8>(), rec.name.len()) };
    let string = (DataType(rec.data_type) == DataType::STRING).then(|| {
        let mut addr = [0u8; std::mem::size_of::<usize>()];
        addr.copy_from_slice(&rec.value[..addr.len()]);
        let p = usize::from_ne_bytes(addr) as *const c_char;
        if p.is_null() {
            &[][..]
        } else {
            // SAFETY: libkstat points STRING records at zero-terminated
            // storage inside the same ks_data buffer.
            unsafe { CStr::from_ptr(p) }.to_bytes()
        }
    });
    RawNamed {
        name,
        data_type: rec.data_type,
        value: rec.value,
        string,
    }
}

impl Backend for LibKstat {
    fn open() -> Result<Self, NativeError> {
        // SAFETY: plain FFI call; a null return means failure.
        let kc = unsafe { kstat_open() };
        if kc.is_null() {
            return Err(NativeError::last_os_error("kstat_open"));
        }
        Ok(Self { kc })
    }

    fn close(&mut self) -> Result<(), NativeError> {
        if self.kc.is_null() {
            return Ok(());
        }
        let kc = std::mem::replace(&mut self.kc, ptr::null_mut());
        // SAFETY: kc came from kstat_open and is closed exactly once.
        if unsafe { kstat_close(kc) } != 0 {
            return Err(NativeError::last_os_error("kstat_close"));
        }
        Ok(())
    }

    fn first(&self) -> Option<KstatId> {
        // SAFETY: kc is open.
        Self::id_of(unsafe { (*self.kc).kc_chain })
    }

    fn next(&self, id: KstatId) -> Option<KstatId> {
        Self::id_of(self.ks(id).ks_next)
    }

    fn lookup(
        &self,
        module: Option<&str>,
        instance: Option<i32>,
        name: Option<&str>,
    ) -> Option<KstatId> {
        // an interior NUL can never match a kstat
        let module = module.map(CString::new).transpose().ok()?;
        let name = name.map(CString::new).transpose().ok()?;
        // SAFETY: both strings outlive the call; null means wildcard.
        let ksp = unsafe {
            kstat_lookup(
                self.kc,
                module.as_ref().map_or(ptr::null(), |m| m.as_ptr()),
                instance.unwrap_or(-1),
                name.as_ref().map_or(ptr::null(), |n| n.as_ptr()),
            )
        };
        Self::id_of(ksp)
    }

    fn header(&self, id: KstatId) -> KstatHeader {
        let ks = self.ks(id);
        KstatHeader {
            module: c_field(&ks.ks_module),
            instance: ks.ks_instance,
            name: c_field(&ks.ks_name),
            class: c_field(&ks.ks_class),
            ks_type: ks.ks_type,
            crtime: ks.ks_crtime,
            snaptime: ks.ks_snaptime,
        }
    }

    fn snaptime(&self, id: KstatId) -> i64 {
        self.ks(id).ks_snaptime
    }

    fn read(&mut self, id: KstatId) -> Result<(), NativeError> {
        // SAFETY: kc is open and id belongs to its chain.
        let kid = unsafe { kstat_read(self.kc, self.ksp(id), ptr::null_mut()) };
        if kid == -1 {
            return Err(NativeError::last_os_error("kstat_read"));
        }
        trace!(kid, "kstat_read");
        Ok(())
    }

    fn data(&self, id: KstatId) -> Option<RawData<'_>> {
        let ks = self.ks(id);
        if ks.ks_data.is_null() {
            return None;
        }
        // SAFETY: after a successful kstat_read, ks_data holds
        // ks_data_size bytes owned by the context.
        let bytes = unsafe { slice::from_raw_parts(ks.ks_data.cast::<u8>(), ks.ks_data_size) };
        Some(RawData {
            bytes,
            ndata: u64::from(ks.ks_ndata),
        })
    }

    fn data_lookup(&self, id: KstatId, stat: &str) -> Option<RawNamed<'_>> {
        let ks = self.ks(id);
        if ks.ks_type != KSTAT_TYPE_NAMED || ks.ks_data.is_null() {
            return None;
        }
        let stat = CString::new(stat).ok()?;
        // SAFETY: the kstat is loaded and of named type.
        let rec = unsafe { kstat_data_lookup(self.ksp(id), stat.as_ptr()) };
        if rec.is_null() {
            return None;
        }
        // SAFETY: kstat_data_lookup returns a record inside ks_data.
        Some(to_raw_named(unsafe { &*rec.cast::<KstatNamedT>() }))
    }

    fn named_records(&self, id: KstatId) -> Vec<RawNamed<'_>> {
        let ks = self.ks(id);
        if ks.ks_type != KSTAT_TYPE_NAMED || ks.ks_data.is_null() {
            return Vec::new();
        }
        // SAFETY: a loaded named kstat holds ks_ndata kstat_named_t records.
        let records = unsafe {
            slice::from_raw_parts(ks.ks_data.cast::<KstatNamedT>(), ks.ks_ndata as usize)
        };
        records.iter().map(to_raw_named).collect()
    }
}

impl Drop for LibKstat {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "kstat_close on drop failed");
        }
    }
}

impl fmt::Debug for LibKstat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibKstat")
            .field("open", &!self.kc.is_null())
            .finish()
    }
}
