//! Guest linear memory marshaling.
//!
//! The guest refers to data by `(offset, length)` pairs into its linear memory. Every helper here
//! takes the memory as a plain byte slice and checks the full range against the slice length
//! before touching a byte, so a hostile pointer can only ever produce a [`MemoryError`].
//!
//! Multi-byte integers are little-endian. A list of header fields is a contiguous array of 16-byte
//! elements, each holding `name_ptr, name_len, value_ptr, value_len`.

use crate::{error::MemoryError, headers::Fields};

/// Size in bytes of one encoded `tuple<string, list<u8>>` element.
pub const FIELD_ELEM_SIZE: u32 = 16;

/// Alignment of an encoded field list.
pub const FIELD_LIST_ALIGN: u32 = 4;

fn range(mem_len: usize, offset: u32, len: u64) -> Result<std::ops::Range<usize>, MemoryError> {
    let out_of_bounds = || MemoryError::OutOfBounds {
        offset,
        len,
        size: mem_len,
    };
    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let len = usize::try_from(len).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
    if end > mem_len {
        return Err(out_of_bounds());
    }
    Ok(start..end)
}

/// Borrow exactly `len` bytes starting at `offset`.
pub fn read_bytes(mem: &[u8], offset: u32, len: u32) -> Result<&[u8], MemoryError> {
    let range = range(mem.len(), offset, len.into())?;
    Ok(&mem[range])
}

/// Read `len` bytes starting at `offset` and decode them as UTF-8.
pub fn read_string(mem: &[u8], offset: u32, len: u32) -> Result<String, MemoryError> {
    let bytes = read_bytes(mem, offset, len)?;
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

pub fn read_u32(mem: &[u8], offset: u32) -> Result<u32, MemoryError> {
    let bytes = read_bytes(mem, offset, 4)?;
    let mut word = [0; 4];
    word.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(word))
}

/// Copy `bytes` into guest memory at `offset`.
pub fn write_bytes(mem: &mut [u8], offset: u32, bytes: &[u8]) -> Result<(), MemoryError> {
    let range = range(mem.len(), offset, bytes.len() as u64)?;
    mem[range].copy_from_slice(bytes);
    Ok(())
}

pub fn write_u32(mem: &mut [u8], offset: u32, value: u32) -> Result<(), MemoryError> {
    write_bytes(mem, offset, &value.to_le_bytes())
}

pub fn write_u64(mem: &mut [u8], offset: u32, value: u64) -> Result<(), MemoryError> {
    write_bytes(mem, offset, &value.to_le_bytes())
}

/// Write consecutive little-endian words starting at `offset`.
///
/// The whole range is checked before the first word is written, so a failed call leaves guest
/// memory untouched.
pub fn write_words(mem: &mut [u8], offset: u32, words: &[u32]) -> Result<(), MemoryError> {
    range(mem.len(), offset, words.len() as u64 * 4)?;
    for (i, word) in words.iter().enumerate() {
        write_u32(mem, offset + (i as u32) * 4, *word)?;
    }
    Ok(())
}

/// Decode a guest `list<tuple<string, list<u8>>>` of `count` elements at `offset`.
pub fn read_field_list(mem: &[u8], offset: u32, count: u32) -> Result<Fields, MemoryError> {
    // Check the element array as a whole first, so a huge `count` fails before we allocate.
    range(mem.len(), offset, u64::from(count) * u64::from(FIELD_ELEM_SIZE))?;

    let mut fields = Fields::with_capacity(count as usize);
    for i in 0..count {
        let elem = offset + i * FIELD_ELEM_SIZE;
        let name_ptr = read_u32(mem, elem)?;
        let name_len = read_u32(mem, elem + 4)?;
        let value_ptr = read_u32(mem, elem + 8)?;
        let value_len = read_u32(mem, elem + 12)?;
        let name = read_string(mem, name_ptr, name_len)?;
        let value = read_bytes(mem, value_ptr, value_len)?.to_vec();
        fields.append(name, value);
    }
    Ok(fields)
}

/// The size of a single guest allocation that holds an encoded field list.
///
/// The element array comes first, followed by every name and value, back to back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldListLayout {
    pub count: u32,
    pub size: u32,
}

impl FieldListLayout {
    pub fn new(fields: &Fields) -> Option<Self> {
        let count = u32::try_from(fields.len()).ok()?;
        let strings = fields
            .iter()
            .map(|(name, value)| name.len() as u64 + value.len() as u64)
            .sum::<u64>();
        let size = u64::from(count) * u64::from(FIELD_ELEM_SIZE) + strings;
        Some(Self {
            count,
            size: u32::try_from(size).ok()?,
        })
    }
}

/// Encode `fields` into guest memory at `base`, which must point to an allocation of at least
/// [`FieldListLayout::size`] bytes.
pub fn write_field_list(mem: &mut [u8], base: u32, fields: &Fields) -> Result<(), MemoryError> {
    let layout = FieldListLayout::new(fields).ok_or(MemoryError::OutOfBounds {
        offset: base,
        len: u64::MAX,
        size: mem.len(),
    })?;
    range(mem.len(), base, layout.size.into())?;

    let mut data = base + layout.count * FIELD_ELEM_SIZE;
    for (i, (name, value)) in fields.iter().enumerate() {
        let elem = base + (i as u32) * FIELD_ELEM_SIZE;
        let name_ptr = data;
        write_bytes(mem, name_ptr, name.as_bytes())?;
        data += name.len() as u32;
        let value_ptr = data;
        write_bytes(mem, value_ptr, value)?;
        data += value.len() as u32;
        write_words(
            mem,
            elem,
            &[name_ptr, name.len() as u32, value_ptr, value.len() as u32],
        )?;
    }
    Ok(())
}
