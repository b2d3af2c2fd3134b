//! In-memory kstat chain for testing sessions without a kernel.
//!
//! `MockBackend` keeps a list of kstats in chain order. Reading a kstat
//! advances a simulated high-resolution clock and regenerates its data, so
//! counters move between reads the way live kernel statistics do.

use std::cell::Cell;

use crate::backend::{
    Backend, KSTAT_NAMED_SIZE, KSTAT_STRLEN, KSTAT_TYPE_IO, KSTAT_TYPE_NAMED, KSTAT_TYPE_RAW,
    KstatHeader, KstatId, RawData, RawNamed,
};
use crate::error::NativeError;
use crate::named::DataType;

/// Simulated nanoseconds between two reads.
const READ_INTERVAL_NS: i64 = 10_000_000;

/// Simulated boot-relative time at which the mock chain was built.
const BOOT_HRTIME: i64 = 5_000_000_000;

thread_local! {
    /// Pending `open` failure, see [`MockBackend::fail_next_open`].
    static OPEN_ERRNO: Cell<Option<i32>> = const { Cell::new(None) };
}

/// One named record of a mock named kstat.
#[derive(Debug, Clone, PartialEq)]
pub struct MockNamed {
    name: String,
    data_type: u8,
    value: [u8; 16],
    string: Option<Vec<u8>>,
    step: u64,
}

impl MockNamed {
    fn numeric(name: &str, data_type: DataType, value: [u8; 16]) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.0,
            value,
            string: None,
            step: 0,
        }
    }

    pub fn int32(name: &str, v: i32) -> Self {
        Self::numeric(name, DataType::INT32, pad16(&v.to_ne_bytes()))
    }

    pub fn uint32(name: &str, v: u32) -> Self {
        Self::numeric(name, DataType::UINT32, pad16(&v.to_ne_bytes()))
    }

    pub fn int64(name: &str, v: i64) -> Self {
        Self::numeric(name, DataType::INT64, pad16(&v.to_ne_bytes()))
    }

    pub fn uint64(name: &str, v: u64) -> Self {
        Self::numeric(name, DataType::UINT64, pad16(&v.to_ne_bytes()))
    }

    /// Inline `CHAR` record; `s` is truncated to 16 bytes.
    pub fn chars(name: &str, s: &str) -> Self {
        let bytes = s.as_bytes();
        Self::numeric(name, DataType::CHAR, pad16(&bytes[..bytes.len().min(16)]))
    }

    /// Out-of-line `STRING` record.
    pub fn string(name: &str, s: &str) -> Self {
        Self {
            string: Some(s.as_bytes().to_vec()),
            ..Self::numeric(name, DataType::STRING, [0; 16])
        }
    }

    /// Record with an arbitrary tag and value bytes.
    pub fn with_tag(name: &str, data_type: u8, value: [u8; 16]) -> Self {
        Self::numeric(name, DataType(data_type), value)
    }

    /// Makes a numeric record grow by `step` on every read.
    pub fn advancing(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    /// Value after `reads` reads.
    fn at(&self, reads: u64) -> MockNamed {
        let mut out = self.clone();
        if self.step == 0 {
            return out;
        }
        let delta = self.step.wrapping_mul(reads);
        let v = &self.value;
        out.value = match DataType(self.data_type) {
            DataType::INT32 | DataType::UINT32 => {
                let cur = u32::from_ne_bytes([v[0], v[1], v[2], v[3]]);
                pad16(&cur.wrapping_add(delta as u32).to_ne_bytes())
            }
            DataType::INT64 | DataType::UINT64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&v[..8]);
                pad16(&u64::from_ne_bytes(b).wrapping_add(delta).to_ne_bytes())
            }
            _ => self.value,
        };
        out
    }

    fn name_field(&self) -> [u8; KSTAT_STRLEN] {
        let mut field = [0u8; KSTAT_STRLEN];
        let n = self.name.len().min(KSTAT_STRLEN - 1);
        field[..n].copy_from_slice(&self.name.as_bytes()[..n]);
        field
    }
}

fn pad16(bytes: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

/// Generator for raw data, given the number of reads so far.
pub type RawGenerator = fn(u64) -> Vec<u8>;

#[derive(Debug, Clone)]
enum Source {
    Named(Vec<MockNamed>),
    Raw(Vec<u8>),
    Generated(RawGenerator),
}

/// Data loaded by the last read.
#[derive(Debug, Clone)]
struct Snapshot {
    bytes: Vec<u8>,
    ndata: u64,
    named: Vec<(MockNamed, [u8; KSTAT_STRLEN])>,
}

#[derive(Debug, Clone)]
struct MockKstat {
    header: KstatHeader,
    source: Source,
    reads: u64,
    snapshot: Option<Snapshot>,
    read_errno: Option<i32>,
}

impl MockKstat {
    fn load(&self) -> Snapshot {
        match &self.source {
            Source::Named(records) => {
                let named: Vec<_> = records
                    .iter()
                    .map(|r| {
                        let rec = r.at(self.reads);
                        let field = rec.name_field();
                        (rec, field)
                    })
                    .collect();
                let mut bytes = Vec::with_capacity(named.len() * KSTAT_NAMED_SIZE);
                for (rec, field) in &named {
                    bytes.extend_from_slice(field);
                    bytes.push(rec.data_type);
                    bytes.extend_from_slice(&rec.value);
                }
                Snapshot {
                    bytes,
                    ndata: named.len() as u64,
                    named,
                }
            }
            Source::Raw(bytes) => self.raw_snapshot(bytes.clone()),
            Source::Generated(generate) => self.raw_snapshot(generate(self.reads)),
        }
    }

    fn raw_snapshot(&self, bytes: Vec<u8>) -> Snapshot {
        // raw kstats report their byte size as ndata
        let ndata = if self.header.ks_type == KSTAT_TYPE_RAW {
            bytes.len() as u64
        } else {
            1
        };
        Snapshot {
            bytes,
            ndata,
            named: Vec::new(),
        }
    }
}

/// In-memory kstat backend.
///
/// Build one with the `add_*` methods or start from a pre-built scenario
/// such as [`MockBackend::typical_system`].
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    chain: Vec<MockKstat>,
    clock: i64,
    close_errno: Option<i32>,
    closed: bool,
}

impl MockBackend {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self {
            clock: BOOT_HRTIME,
            ..Self::default()
        }
    }

    fn push(
        &mut self,
        module: &str,
        instance: i32,
        name: &str,
        class: &str,
        ks_type: u8,
        source: Source,
    ) {
        self.clock += 1;
        self.chain.push(MockKstat {
            header: KstatHeader {
                module: module.to_string(),
                instance,
                name: name.to_string(),
                class: class.to_string(),
                ks_type,
                crtime: self.clock,
                snaptime: 0,
            },
            source,
            reads: 0,
            snapshot: None,
            read_errno: None,
        });
    }

    /// Appends a named kstat.
    pub fn add_named(
        &mut self,
        module: &str,
        instance: i32,
        name: &str,
        class: &str,
        records: Vec<MockNamed>,
    ) {
        self.push(module, instance, name, class, KSTAT_TYPE_NAMED, Source::Named(records));
    }

    /// Appends a `KSTAT_TYPE_RAW` kstat with fixed contents.
    pub fn add_raw(
        &mut self,
        module: &str,
        instance: i32,
        name: &str,
        class: &str,
        bytes: Vec<u8>,
    ) {
        self.push(module, instance, name, class, KSTAT_TYPE_RAW, Source::Raw(bytes));
    }

    /// Appends an IO kstat whose counters come from `generate`.
    pub fn add_io(&mut self, module: &str, instance: i32, name: &str, generate: RawGenerator) {
        self.push(module, instance, name, "disk", KSTAT_TYPE_IO, Source::Generated(generate));
    }

    /// Appends a kstat of any type whose data comes from `generate`.
    pub fn add_generated(
        &mut self,
        module: &str,
        instance: i32,
        name: &str,
        class: &str,
        ks_type: u8,
        generate: RawGenerator,
    ) {
        self.push(module, instance, name, class, ks_type, Source::Generated(generate));
    }

    /// Makes every read of the given kstat fail with `errno`.
    pub fn fail_reads(&mut self, module: &str, instance: i32, name: &str, errno: i32) {
        for ks in &mut self.chain {
            let h = &ks.header;
            if h.module == module && h.instance == instance && h.name == name {
                ks.read_errno = Some(errno);
            }
        }
    }

    /// Makes the next [`Backend::open`] on the calling thread fail with
    /// `errno`.
    pub fn fail_next_open(errno: i32) {
        OPEN_ERRNO.with(|e| e.set(Some(errno)));
    }

    /// Makes `close` fail with `errno`.
    pub fn fail_close(&mut self, errno: i32) {
        self.close_errno = Some(errno);
    }

    /// Number of kstats in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    fn get(&self, id: KstatId) -> &MockKstat {
        assert!(!self.closed, "mock kstat backend used after close");
        &self.chain[id.0]
    }
}

impl Backend for MockBackend {
    fn open() -> Result<Self, NativeError> {
        if let Some(errno) = OPEN_ERRNO.with(Cell::take) {
            return Err(NativeError::new("kstat_open", errno));
        }
        Ok(Self::typical_system())
    }

    fn close(&mut self) -> Result<(), NativeError> {
        self.closed = true;
        match self.close_errno {
            Some(errno) => Err(NativeError::new("kstat_close", errno)),
            None => Ok(()),
        }
    }

    fn first(&self) -> Option<KstatId> {
        (!self.chain.is_empty()).then_some(KstatId(0))
    }

    fn next(&self, id: KstatId) -> Option<KstatId> {
        let next = id.0 + 1;
        (next < self.chain.len()).then_some(KstatId(next))
    }

    fn lookup(
        &self,
        module: Option<&str>,
        instance: Option<i32>,
        name: Option<&str>,
    ) -> Option<KstatId> {
        self.chain
            .iter()
            .position(|ks| {
                let h = &ks.header;
                module.is_none_or(|m| h.module == m)
                    && instance.is_none_or(|i| i == -1 || h.instance == i)
                    && name.is_none_or(|n| h.name == n)
            })
            .map(KstatId)
    }

    fn header(&self, id: KstatId) -> KstatHeader {
        self.get(id).header.clone()
    }

    fn snaptime(&self, id: KstatId) -> i64 {
        self.get(id).header.snaptime
    }

    fn read(&mut self, id: KstatId) -> Result<(), NativeError> {
        assert!(!self.closed, "mock kstat backend used after close");
        self.clock += READ_INTERVAL_NS;
        let clock = self.clock;

        let ks = &mut self.chain[id.0];
        if let Some(errno) = ks.read_errno {
            return Err(NativeError::new("kstat_read", errno));
        }
        ks.reads += 1;
        ks.snapshot = Some(ks.load());
        ks.header.snaptime = clock;
        Ok(())
    }

    fn data(&self, id: KstatId) -> Option<RawData<'_>> {
        self.get(id).snapshot.as_ref().map(|s| RawData {
            bytes: &s.bytes,
            ndata: s.ndata,
        })
    }

    fn data_lookup(&self, id: KstatId, stat: &str) -> Option<RawNamed<'_>> {
        let snap = self.get(id).snapshot.as_ref()?;
        snap.named
            .iter()
            .find(|(rec, _)| rec.name == stat)
            .map(|(rec, field)| raw_named(rec, field))
    }

    fn named_records(&self, id: KstatId) -> Vec<RawNamed<'_>> {
        match self.get(id).snapshot.as_ref() {
            Some(snap) => snap.named.iter().map(|(rec, field)| raw_named(rec, field)).collect(),
            None => Vec::new(),
        }
    }
}

fn raw_named<'a>(rec: &'a MockNamed, field: &'a [u8; KSTAT_STRLEN]) -> RawNamed<'a> {
    RawNamed {
        name: field,
        data_type: rec.data_type,
        value: rec.value,
        string: rec.string.as_deref(),
    }
}
