// src/header/codec.rs

//! Binary encoding for leads, headers, and package files
//!
//! The database gateway stores headers as these blobs, the repackage path
//! writes lead + signature + header to its output file, and the source
//! bootstrap reads the same layout back. Encoding is canonical (entries
//! sorted by tag), so a header always serializes to the same bytes and
//! the regenerated signature digest is stable.

use crate::error::{Error, Result};
use crate::header::{Header, Tag, Value};
use md5::{Digest, Md5};
use std::io::{Read, Write};

pub const LEAD_MAGIC: [u8; 4] = [0xED, 0xAB, 0xEE, 0xDB];
pub const HEADER_MAGIC: [u8; 4] = [0x8E, 0xAD, 0xE8, 0x01];
pub const LEAD_SIZE: usize = 96;

/// Size of the NUL-padded name field inside the lead
const LEAD_NAME_FIELD: usize = 66;

/// Signature type marker: a header-shaped signature section follows
pub const SIGTYPE_HEADERSIG: i16 = 5;

// Entry type codes on the wire
const TYPE_CHAR: u8 = 1;
const TYPE_INT16: u8 = 3;
const TYPE_INT32: u8 = 4;
const TYPE_STRING: u8 = 6;
const TYPE_BIN: u8 = 7;
const TYPE_STRING_ARRAY: u8 = 8;

/// Package kind recorded in the lead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadKind {
    Binary = 0,
    Source = 1,
}

/// The fixed 96-byte record that opens every package file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lead {
    pub major: u8,
    pub minor: u8,
    pub kind: LeadKind,
    pub archnum: i16,
    pub osnum: i16,
    pub signature_type: i16,
    /// Package identity, truncated to the lead's name field
    pub name: String,
}

impl Lead {
    fn for_kind(kind: LeadKind, name: &str) -> Self {
        Self {
            major: 3,
            minor: 0,
            kind,
            archnum: host_arch_num(),
            osnum: host_os_num(),
            signature_type: SIGTYPE_HEADERSIG,
            name: name.to_string(),
        }
    }

    pub fn binary(name: &str) -> Self {
        Self::for_kind(LeadKind::Binary, name)
    }

    pub fn source(name: &str) -> Self {
        Self::for_kind(LeadKind::Source, name)
    }

    /// Serialize into the fixed 96-byte layout
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut buf = [0u8; LEAD_SIZE];
        buf[0..4].copy_from_slice(&LEAD_MAGIC);
        buf[4] = self.major;
        buf[5] = self.minor;
        buf[6..8].copy_from_slice(&(self.kind as i16).to_be_bytes());
        buf[8..10].copy_from_slice(&self.archnum.to_be_bytes());

        // name is NUL-terminated within its field; anything longer is cut
        let name_bytes = self.name.as_bytes();
        let n = name_bytes.len().min(LEAD_NAME_FIELD - 1);
        buf[10..10 + n].copy_from_slice(&name_bytes[..n]);

        buf[76..78].copy_from_slice(&self.osnum.to_be_bytes());
        buf[78..80].copy_from_slice(&self.signature_type.to_be_bytes());
        // bytes 80..96 reserved

        w.write_all(&buf)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; LEAD_SIZE];
        r.read_exact(&mut buf)?;

        if buf[0..4] != LEAD_MAGIC {
            return Err(Error::HeaderError("bad lead magic".to_string()));
        }

        let kind = match i16::from_be_bytes([buf[6], buf[7]]) {
            0 => LeadKind::Binary,
            1 => LeadKind::Source,
            other => {
                return Err(Error::HeaderError(format!(
                    "bad lead package kind {}",
                    other
                )));
            }
        };

        let name_end = buf[10..10 + LEAD_NAME_FIELD]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(LEAD_NAME_FIELD);
        let name = String::from_utf8_lossy(&buf[10..10 + name_end]).into_owned();

        Ok(Self {
            major: buf[4],
            minor: buf[5],
            kind,
            archnum: i16::from_be_bytes([buf[8], buf[9]]),
            osnum: i16::from_be_bytes([buf[76], buf[77]]),
            signature_type: i16::from_be_bytes([buf[78], buf[79]]),
            name,
        })
    }
}

fn host_arch_num() -> i16 {
    if cfg!(target_arch = "x86_64") || cfg!(target_arch = "x86") {
        1
    } else if cfg!(target_arch = "aarch64") || cfg!(target_arch = "arm") {
        12
    } else {
        255
    }
}

fn host_os_num() -> i16 {
    if cfg!(target_os = "linux") { 1 } else { 255 }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

/// Serialize a header to its canonical byte form
pub fn encode_header(h: &Header) -> Vec<u8> {
    let mut body = Vec::new();
    let mut count = 0u32;

    for (tag, value) in h.iter() {
        count += 1;
        put_u32(&mut body, *tag as u32);
        match value {
            Value::Char(v) => {
                body.push(TYPE_CHAR);
                put_u32(&mut body, v.len() as u32);
                body.extend_from_slice(v);
            }
            Value::Int16(v) => {
                body.push(TYPE_INT16);
                put_u32(&mut body, v.len() as u32);
                for x in v {
                    body.extend_from_slice(&x.to_be_bytes());
                }
            }
            Value::Int32(v) => {
                body.push(TYPE_INT32);
                put_u32(&mut body, v.len() as u32);
                for x in v {
                    body.extend_from_slice(&x.to_be_bytes());
                }
            }
            Value::String(s) => {
                body.push(TYPE_STRING);
                put_u32(&mut body, 1);
                put_str(&mut body, s);
            }
            Value::StringArray(v) => {
                body.push(TYPE_STRING_ARRAY);
                put_u32(&mut body, v.len() as u32);
                for s in v {
                    put_str(&mut body, s);
                }
            }
            Value::Binary(v) => {
                body.push(TYPE_BIN);
                put_u32(&mut body, v.len() as u32);
                body.extend_from_slice(v);
            }
        }
    }

    let mut out = Vec::with_capacity(HEADER_MAGIC.len() + 8 + body.len());
    out.extend_from_slice(&HEADER_MAGIC);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    out.extend_from_slice(&body);
    out
}

pub fn write_header<W: Write>(w: &mut W, h: &Header) -> Result<()> {
    w.write_all(&encode_header(h))?;
    Ok(())
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(Error::HeaderError("truncated header data".to_string()));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn str(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let b = self.take(len)?;
        String::from_utf8(b.to_vec())
            .map_err(|_| Error::HeaderError("invalid utf-8 in header string".to_string()))
    }
}

/// Parse a header from its canonical byte form
pub fn decode_header(data: &[u8]) -> Result<Header> {
    let mut c = Cursor { data, pos: 0 };

    if c.take(4)? != HEADER_MAGIC {
        return Err(Error::HeaderError("bad header magic".to_string()));
    }
    let body_len = c.u32()? as usize;
    let count = c.u32()?;
    if c.pos + body_len > data.len() {
        return Err(Error::HeaderError("truncated header body".to_string()));
    }

    let mut h = Header::new();
    for _ in 0..count {
        let raw_tag = c.u32()?;
        let tag = Tag::from_repr(raw_tag)
            .ok_or_else(|| Error::HeaderError(format!("unknown tag {}", raw_tag)))?;
        let kind = c.u8()?;
        let n = c.u32()? as usize;

        let value = match kind {
            TYPE_CHAR => Value::Char(c.take(n)?.to_vec()),
            TYPE_INT16 => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    let b = c.take(2)?;
                    v.push(u16::from_be_bytes([b[0], b[1]]));
                }
                Value::Int16(v)
            }
            TYPE_INT32 => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    v.push(c.u32()?);
                }
                Value::Int32(v)
            }
            TYPE_STRING => Value::String(c.str()?),
            TYPE_STRING_ARRAY => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    v.push(c.str()?);
                }
                Value::StringArray(v)
            }
            TYPE_BIN => Value::Binary(c.take(n)?.to_vec()),
            other => {
                return Err(Error::HeaderError(format!(
                    "unsupported entry type {}",
                    other
                )));
            }
        };
        h.insert(tag, value);
    }

    Ok(h)
}

/// Read one header from a byte stream
pub fn read_header<R: Read>(r: &mut R) -> Result<Header> {
    let mut prefix = [0u8; 12];
    r.read_exact(&mut prefix)?;
    if prefix[0..4] != HEADER_MAGIC {
        return Err(Error::HeaderError("bad header magic".to_string()));
    }
    let body_len = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]) as usize;

    let mut full = prefix.to_vec();
    let mut body = vec![0u8; body_len];
    r.read_exact(&mut body)?;
    full.extend_from_slice(&body);

    decode_header(&full)
}

/// Build a fresh signature header over encoded metadata bytes
pub fn regen_signature_header(meta: &[u8]) -> Header {
    let mut sig = Header::new();
    sig.insert(Tag::SigSize, Value::Int32(vec![meta.len() as u32]));
    sig.insert(Tag::SigMd5, Value::Binary(Md5::digest(meta).to_vec()));
    sig
}

/// A decoded package file, positioned at the start of the payload
#[derive(Debug)]
pub struct PackageFile {
    pub lead: Lead,
    pub signature: Header,
    pub header: Header,
    /// False when the signature's declared size disagrees with the
    /// metadata actually read
    pub size_ok: bool,
}

/// Write lead + regenerated signature + metadata header.
///
/// The payload stream follows; the caller appends it through the
/// compression layer.
pub fn write_package<W: Write>(w: &mut W, lead: &Lead, meta: &Header) -> Result<()> {
    let meta_bytes = encode_header(meta);
    lead.write(w)?;
    write_header(w, &regen_signature_header(&meta_bytes))?;
    w.write_all(&meta_bytes)?;
    Ok(())
}

/// Read lead + signature + metadata header, leaving the reader at the
/// payload
pub fn read_package<R: Read>(r: &mut R) -> Result<PackageFile> {
    let lead = Lead::read(r)?;
    let signature = Header::read_from(r)?;
    let header = Header::read_from(r)?;

    let size_ok = match signature.get_u32(Tag::SigSize) {
        Some(declared) => declared as usize == encode_header(&header).len(),
        None => true,
    };

    Ok(PackageFile {
        lead,
        signature,
        header,
        size_ok,
    })
}

impl Header {
    /// Stream-reading convenience used by the package reader
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        read_header(r)
    }
}
