//! kstat — safe access to illumos/Solaris kernel statistics.
//!
//! Provides:
//! - `session` — [`Session`], an open kstat context that owns every handle
//! - `kstat` — [`Kstat`] handles: refresh, named lookups, IO counters, raw bytes
//! - `named` — decoding of named statistics into [`NamedValue`]
//! - `raw` — fixed-layout copies and C string extraction
//! - `types` — mirrors of `kstat_io_t`, `sysinfo_t`, `vminfo_t`, `struct var`
//!   and `struct mntinfo_kstat`
//! - `backend` — the native call contract, with `libkstat` bindings on
//!   illumos/Solaris
//!
//! With `mock` feature (default):
//! - [`MockBackend`] — in-memory kstat chains for tests and other platforms

pub mod backend;
pub mod error;
pub mod kstat;
pub mod named;
pub mod raw;
pub mod session;
pub mod types;

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
pub use backend::LibKstat;
#[cfg(feature = "mock")]
pub use backend::MockBackend;
pub use backend::Backend;
pub use error::{KstatError, NativeError};
pub use kstat::{Kstat, KstatKind, RawKind};
pub use named::{DataType, Named, NamedValue};
pub use raw::{RawBlob, RawLayout, extract_fixed_bytes, extract_fixed_string};
pub use session::Session;
pub use types::{Io, Mntinfo, MntinfoTimer, Sysinfo, Var, Vminfo};
