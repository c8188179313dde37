//! Header collections as the guest sees them, and filtering of headers on their way out.

use {
    crate::error::Error,
    hyper::{
        header::{self, HeaderName, HeaderValue},
        HeaderMap,
    },
};

/// An ordered collection of header fields.
///
/// Unlike a [`HeaderMap`], this keeps every entry exactly as the guest supplied it: duplicate
/// names are kept as separate entries, and iteration follows insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields(Vec<(String, Vec<u8>)>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Add an entry after all existing ones, without replacing entries of the same name.
    pub fn append(&mut self, name: String, value: Vec<u8>) {
        self.0.push((name, value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Vec<u8>)> {
        self.0.iter()
    }

    /// All values for `name`, in insertion order. Names compare case-insensitively.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.0
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Build a native header map. Entries are appended, so no duplicate is lost.
    pub fn to_header_map(&self) -> Result<HeaderMap, Error> {
        let mut map = HeaderMap::with_capacity(self.0.len());
        for (name, value) in &self.0 {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            let value = HeaderValue::from_bytes(value)?;
            map.append(name, value);
        }
        Ok(map)
    }

    /// Copy a native header map. Values of one name keep their relative order.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| (name.as_str().to_owned(), value.as_bytes().to_vec()))
            .collect()
    }
}

impl FromIterator<(String, Vec<u8>)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub fn filter_outgoing_headers(headers: &mut HeaderMap) {
    // Remove framing-related headers; we rely on Hyper to insert the appropriate
    // framing headers automatically, and do not allow guests to include them.
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);
}
