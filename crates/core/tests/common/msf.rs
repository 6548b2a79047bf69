// Minimal MSF 7.0 program databases for exercising the in-process reader.
//
// Layout: page 0 superblock, page 1 free page map, page 2 directory page list, then the
// directory and every stream on consecutive pages.

use std::path::{Path, PathBuf};

const PAGE_SIZE: usize = 4096;
const MAGIC: &[u8; 32] = b"Microsoft C/C++ MSF 7.00\r\n\x1a\x44\x53\x00\x00\x00";

const SECTION_HEADERS_STREAM: u16 = 7;
const SYMBOL_RECORDS_STREAM: u16 = 5;
const MODULE_STREAM: u16 = 6;

const S_END: u16 = 0x0006;
const S_GDATA32: u16 = 0x110d;
const S_PUB32: u16 = 0x110e;
const S_GPROC32: u16 = 0x1110;

const LF_POINTER: u16 = 0x1002;
const LF_FIELDLIST: u16 = 0x1203;
const LF_ENUMERATE: u16 = 0x1502;
const LF_STRUCTURE: u16 = 0x1505;
const LF_UNION: u16 = 0x1506;
const LF_ENUM: u16 = 0x1507;
const LF_MEMBER: u16 = 0x150d;

const T_INT4: u32 = 0x0074;
const T_REAL32: u32 = 0x0040;
const FORWARD_REF: u16 = 0x0080;

pub const GUID_FIELDS: (u32, u16, u16, [u8; 8]) =
    (0x3F25_04E0, 0x4F89, 0x11D3, [0x9A, 0x0C, 0x03, 0x05, 0xE8, 0x2C, 0x33, 0x01]);
pub const INFO_AGE: u32 = 2;
pub const DBI_AGE: u32 = 1;

#[derive(Default)]
struct Bytes(Vec<u8>);

impl Bytes {
    fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    fn u16(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn cstr(&mut self, s: &str) -> &mut Self {
        self.0.extend_from_slice(s.as_bytes());
        self.0.push(0);
        self
    }

    fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.extend_from_slice(bytes);
        self
    }

    fn zero_pad(&mut self, align: usize) -> &mut Self {
        while self.0.len() % align != 0 {
            self.0.push(0);
        }
        self
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

/// Length-prefixed record as used by both the symbol and type streams.
fn record(body: &[u8]) -> Vec<u8> {
    let mut out = Bytes::default();
    out.u16(body.len() as u16).raw(body);
    out.take()
}

fn symbol(kind: u16, payload: &[u8]) -> Vec<u8> {
    let mut body = Bytes::default();
    body.u16(kind).raw(payload);
    record(&body.take())
}

fn public(name: &str, flags: u32, section: u16, offset: u32) -> Vec<u8> {
    let mut p = Bytes::default();
    p.u32(flags).u32(offset).u16(section).cstr(name);
    symbol(S_PUB32, &p.take())
}

fn global_data(name: &str, section: u16, offset: u32) -> Vec<u8> {
    let mut p = Bytes::default();
    p.u32(T_INT4).u32(offset).u16(section).cstr(name);
    symbol(S_GDATA32, &p.take())
}

fn procedure(name: &str, section: u16, offset: u32, len: u32, end: u32) -> Vec<u8> {
    let mut p = Bytes::default();
    p.u32(0).u32(end).u32(0).u32(len).u32(0).u32(0).u32(0).u32(offset).u16(section).u8(0).cstr(name);
    symbol(S_GPROC32, &p.take())
}

fn member(name: &str, type_index: u32, offset: u16) -> Vec<u8> {
    let mut m = Bytes::default();
    m.u16(LF_MEMBER).u16(3).u32(type_index).u16(offset).cstr(name);
    m.take()
}

fn enumerate(name: &str, value: u16) -> Vec<u8> {
    let mut m = Bytes::default();
    m.u16(LF_ENUMERATE).u16(3).u16(value).cstr(name);
    m.take()
}

fn field_list(fields: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Bytes::default();
    body.u16(LF_FIELDLIST);
    for field in fields {
        body.raw(field);
    }
    record(&body.take())
}

fn structure(name: &str, count: u16, properties: u16, fields: u32, size: u16) -> Vec<u8> {
    let mut body = Bytes::default();
    body.u16(LF_STRUCTURE).u16(count).u16(properties).u32(fields).u32(0).u32(0).u16(size).cstr(name);
    record(&body.take())
}

fn union(name: &str, count: u16, fields: u32, size: u16) -> Vec<u8> {
    let mut body = Bytes::default();
    body.u16(LF_UNION).u16(count).u16(0).u32(fields).u16(size).cstr(name);
    record(&body.take())
}

fn enumeration(name: &str, count: u16, fields: u32) -> Vec<u8> {
    let mut body = Bytes::default();
    body.u16(LF_ENUM).u16(count).u16(0).u32(T_INT4).u32(fields).cstr(name);
    record(&body.take())
}

fn pointer(underlying: u32) -> Vec<u8> {
    let mut body = Bytes::default();
    // 64-bit plain pointer, 8 bytes wide.
    body.u16(LF_POINTER).u32(underlying).u32(0x0001_000C);
    record(&body.take())
}

fn info_stream() -> Vec<u8> {
    let (d1, d2, d3, d4) = GUID_FIELDS;
    let mut s = Bytes::default();
    s.u32(20000404).u32(0x5F00_0001).u32(INFO_AGE).u32(d1).u16(d2).u16(d3).raw(&d4).u32(0);
    s.take()
}

fn type_stream() -> Vec<u8> {
    let records = [
        // 0x1000
        field_list(&[member("x", T_INT4, 0), member("y", T_INT4, 4)]),
        // 0x1001
        structure("Point", 2, 0, 0x1000, 8),
        // 0x1002
        structure("Node", 0, FORWARD_REF, 0, 0),
        // 0x1003
        pointer(0x1002),
        // 0x1004
        field_list(&[member("value", T_INT4, 0), member("next", 0x1003, 8)]),
        // 0x1005
        structure("Node", 2, 0, 0x1004, 16),
        // 0x1006
        field_list(&[enumerate("Red", 0), enumerate("Green", 1)]),
        // 0x1007
        enumeration("Color", 2, 0x1006),
        // 0x1008
        field_list(&[member("i", T_INT4, 0), member("f", T_REAL32, 0)]),
        // 0x1009
        union("Value", 2, 0x1008, 4),
        // 0x100a
        structure("<unnamed-tag>", 0, FORWARD_REF, 0, 0),
    ];
    let body: Vec<u8> = records.concat();

    let mut s = Bytes::default();
    s.u32(20040203).u32(56).u32(0x1000).u32(0x1000 + records.len() as u32).u32(body.len() as u32);
    s.u16(0xffff).u16(0xffff).u32(4).u32(0x3ffff);
    for _ in 0..6 {
        s.u32(0);
    }
    s.raw(&body);
    s.take()
}

fn module_list(module_stream_len: u32) -> Vec<u8> {
    let mut m = Bytes::default();
    m.u32(0);
    // Section contribution.
    m.u16(1).u16(0).u32(0).u32(0).u32(0).u16(0).u16(0).u32(0).u32(0);
    m.u16(0).u16(MODULE_STREAM).u32(module_stream_len).u32(0).u32(0);
    m.u16(0).u16(0).u32(0).u32(0).u32(0);
    m.cstr("main.obj").cstr("main.obj").zero_pad(4);
    m.take()
}

fn dbi_stream(module_stream_len: u32) -> Vec<u8> {
    let modules = module_list(module_stream_len);
    let mut s = Bytes::default();
    s.u32(u32::MAX).u32(19990903).u32(DBI_AGE);
    s.u16(0xffff).u16(0).u16(0xffff).u16(0).u16(SYMBOL_RECORDS_STREAM).u16(0);
    s.u32(modules.len() as u32).u32(0).u32(0).u32(0).u32(0).u32(0);
    // Optional debug header: the section header stream index is the sixth entry.
    s.u32(12).u32(0);
    s.u16(0).u16(0x8664).u32(0);
    s.raw(&modules);
    for _ in 0..5 {
        s.u16(0xffff);
    }
    s.u16(SECTION_HEADERS_STREAM);
    s.take()
}

fn global_symbol_stream() -> Vec<u8> {
    [
        public(super::MSVC_NAME, 0x2, 1, 0x0),
        public("loop_top", 0x1, 1, 0x200),
        global_data("g_counter", 2, 0x10),
    ]
    .concat()
}

fn module_stream() -> Vec<u8> {
    let mut s = Bytes::default();
    s.u32(4);
    let proc_len = procedure("main", 1, 0x100, 0x40, 0).len() as u32;
    s.raw(&procedure("main", 1, 0x100, 0x40, 4 + proc_len));
    s.raw(&symbol(S_END, &[]));
    s.take()
}

fn section_header(name: &[u8; 8], virtual_size: u32, virtual_address: u32) -> Vec<u8> {
    let mut s = Bytes::default();
    s.raw(name).u32(virtual_size).u32(virtual_address);
    s.u32(virtual_size).u32(0).u32(0).u32(0).u16(0).u16(0).u32(0x6000_0020);
    s.take()
}

fn section_header_stream() -> Vec<u8> {
    [section_header(b".text\0\0\0", 0x7000, 0x1000), section_header(b".data\0\0\0", 0x1000, 0x8000)]
        .concat()
}

/// Lay `streams` out as an MSF 7.0 file.
pub fn build_msf(streams: &[Vec<u8>]) -> Vec<u8> {
    let pages = |len: usize| len.div_ceil(PAGE_SIZE);
    let stream_pages: usize = streams.iter().map(|s| pages(s.len())).sum();
    let directory_len = 4 + 4 * streams.len() + 4 * stream_pages;
    let directory_pages = pages(directory_len);
    let first_directory_page = 3;

    let mut directory = Bytes::default();
    directory.u32(streams.len() as u32);
    for stream in streams {
        directory.u32(stream.len() as u32);
    }
    let mut next_page = first_directory_page + directory_pages;
    let mut placements = Vec::with_capacity(streams.len());
    for stream in streams {
        placements.push(next_page);
        for page in 0..pages(stream.len()) {
            directory.u32((next_page + page) as u32);
        }
        next_page += pages(stream.len());
    }
    let total_pages = next_page;

    let mut file = vec![0u8; total_pages * PAGE_SIZE];
    let mut put = |page: usize, bytes: &[u8]| {
        let at = page * PAGE_SIZE;
        file[at..at + bytes.len()].copy_from_slice(bytes);
    };

    let mut superblock = Bytes::default();
    superblock
        .raw(MAGIC)
        .u32(PAGE_SIZE as u32)
        .u32(1)
        .u32(total_pages as u32)
        .u32(directory_len as u32)
        .u32(0)
        .u32(2);
    put(0, &superblock.take());

    let mut directory_list = Bytes::default();
    for page in 0..directory_pages {
        directory_list.u32((first_directory_page + page) as u32);
    }
    put(2, &directory_list.take());
    put(first_directory_page, &directory.take());
    for (stream, page) in streams.iter().zip(placements) {
        put(page, stream);
    }
    file
}

/// Program database describing the records in [`super::parsed`] plus a few reader-only cases.
pub fn sample_pdb() -> Vec<u8> {
    let module = module_stream();
    build_msf(&[
        Vec::new(),
        info_stream(),
        type_stream(),
        dbi_stream(module.len() as u32),
        Vec::new(),
        global_symbol_stream(),
        module,
        section_header_stream(),
    ])
}

pub fn write_sample_pdb(dir: &Path) -> PathBuf {
    let path = dir.join("app.pdb");
    std::fs::write(&path, sample_pdb()).expect("write sample pdb");
    path
}
