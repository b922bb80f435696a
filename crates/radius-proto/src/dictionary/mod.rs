//! Attribute dictionary
//!
//! A [`Dictionary`] maps `(vendor, code)` pairs and names to attribute
//! descriptors. It is populated through `&mut self` while loading and then
//! shared read-only behind an `Arc` by every packet that references it.
//!
//! # Example
//!
//! ```rust
//! use radius_proto::dictionary::Dictionary;
//! use radius_proto::attributes::AttributeKind;
//!
//! let dictionary = Dictionary::standard().unwrap();
//! let user_name = dictionary.attribute_type_by_name("User-Name").unwrap();
//! assert_eq!(user_name.code, 1);
//! assert_eq!(user_name.kind, AttributeKind::String);
//! assert_eq!(dictionary.vendor_id("Microsoft"), Some(311));
//! ```

mod parser;

use crate::attributes::AttributeKind;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::path::Path;
use thiserror::Error;

const STANDARD_DICTIONARY: &str = include_str!("../../dictionary/radius.dict");

#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },
    #[error("Duplicate attribute name: {0}")]
    DuplicateName(String),
    #[error("Duplicate attribute code {code} for vendor {vendor:?}")]
    DuplicateCode { vendor: Option<u32>, code: u8 },
    #[error("Duplicate vendor: {0}")]
    DuplicateVendor(String),
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),
    #[error("Unknown vendor: {0}")]
    UnknownVendor(u32),
}

/// Bidirectional `u32 <-> name` table for integer attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    by_value: BTreeMap<u32, String>,
    by_name: HashMap<String, u32>,
}

impl Enumeration {
    /// Add a named value
    ///
    /// Several names may share one value; the first one wins when rendering.
    /// Re-using a name for a different value is an error.
    pub fn insert(&mut self, name: &str, value: u32) -> Result<(), DictionaryError> {
        if let Some(existing) = self.by_name.get(name) {
            if *existing == value {
                return Ok(());
            }
            return Err(DictionaryError::DuplicateName(name.to_string()));
        }
        self.by_name.insert(name.to_string(), value);
        self.by_value.entry(value).or_insert_with(|| name.to_string());
        Ok(())
    }

    pub fn name(&self, value: u32) -> Option<&str> {
        self.by_value.get(&value).map(String::as_str)
    }

    pub fn value(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Values in ascending order with their primary name
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_value.iter().map(|(v, n)| (*v, n.as_str()))
    }
}

/// Descriptor for one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeType {
    /// `None` for base protocol attributes
    pub vendor_id: Option<u32>,
    pub code: u8,
    pub name: String,
    pub kind: AttributeKind,
    pub enumeration: Option<Enumeration>,
}

impl AttributeType {
    pub fn new(vendor_id: Option<u32>, code: u8, name: impl Into<String>, kind: AttributeKind) -> Self {
        AttributeType {
            vendor_id,
            code,
            name: name.into(),
            kind,
            enumeration: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct Dictionary {
    types: HashMap<(Option<u32>, u8), AttributeType>,
    names: HashMap<String, (Option<u32>, u8)>,
    vendors_by_id: HashMap<u32, String>,
    vendors_by_name: HashMap<String, u32>,
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dictionary")
            .field("attributes", &self.types.len())
            .field("vendors", &self.vendors_by_id.len())
            .finish()
    }
}

impl Dictionary {
    /// Empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// The embedded default dictionary: RFC 2865/2866/2869/3162 attributes
    /// plus the Microsoft (311) and WISPr (14122) vendors
    pub fn standard() -> Result<Self, DictionaryError> {
        let mut dictionary = Self::new();
        parser::Parser::new(&mut dictionary).parse_text(STANDARD_DICTIONARY, "radius.dict", Path::new("."))?;
        Ok(dictionary)
    }

    /// Load a dictionary file, following `$INCLUDE` directives
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let mut dictionary = Self::new();
        dictionary.load_file(path)?;
        Ok(dictionary)
    }

    /// Load dictionary text; `$INCLUDE` paths resolve against the working directory
    pub fn parse_str(text: &str) -> Result<Self, DictionaryError> {
        let mut dictionary = Self::new();
        dictionary.load_str(text)?;
        Ok(dictionary)
    }

    /// Merge a dictionary file into this one
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), DictionaryError> {
        parser::Parser::new(self).parse_file(path.as_ref())
    }

    pub fn load_str(&mut self, text: &str) -> Result<(), DictionaryError> {
        parser::Parser::new(self).parse_text(text, "<string>", Path::new("."))
    }

    pub fn attribute_type(&self, vendor_id: Option<u32>, code: u8) -> Option<&AttributeType> {
        self.types.get(&(vendor_id, code))
    }

    /// Base (non-vendor) attribute by code
    pub fn attribute_type_by_code(&self, code: u8) -> Option<&AttributeType> {
        self.attribute_type(None, code)
    }

    pub fn attribute_type_by_name(&self, name: &str) -> Option<&AttributeType> {
        self.names.get(name).and_then(|key| self.types.get(key))
    }

    pub fn vendor_id(&self, name: &str) -> Option<u32> {
        self.vendors_by_name.get(name).copied()
    }

    pub fn vendor_name(&self, vendor_id: u32) -> Option<&str> {
        self.vendors_by_id.get(&vendor_id).map(String::as_str)
    }

    pub fn add_attribute_type(&mut self, attribute_type: AttributeType) -> Result<(), DictionaryError> {
        if let Some(vendor_id) = attribute_type.vendor_id
            && !self.vendors_by_id.contains_key(&vendor_id)
        {
            return Err(DictionaryError::UnknownVendor(vendor_id));
        }
        if self.names.contains_key(&attribute_type.name) {
            return Err(DictionaryError::DuplicateName(attribute_type.name));
        }
        let key = (attribute_type.vendor_id, attribute_type.code);
        if self.types.contains_key(&key) {
            return Err(DictionaryError::DuplicateCode {
                vendor: attribute_type.vendor_id,
                code: attribute_type.code,
            });
        }

        self.names.insert(attribute_type.name.clone(), key);
        self.types.insert(key, attribute_type);
        Ok(())
    }

    pub fn add_vendor(&mut self, vendor_id: u32, name: &str) -> Result<(), DictionaryError> {
        if self.vendors_by_id.contains_key(&vendor_id) {
            return Err(DictionaryError::DuplicateVendor(vendor_id.to_string()));
        }
        if self.vendors_by_name.contains_key(name) {
            return Err(DictionaryError::DuplicateVendor(name.to_string()));
        }
        self.vendors_by_id.insert(vendor_id, name.to_string());
        self.vendors_by_name.insert(name.to_string(), vendor_id);
        Ok(())
    }

    /// Attach a named value to an existing attribute
    pub fn add_enumeration_value(
        &mut self,
        attribute_name: &str,
        name: &str,
        value: u32,
    ) -> Result<(), DictionaryError> {
        let key = self
            .names
            .get(attribute_name)
            .copied()
            .ok_or_else(|| DictionaryError::UnknownAttribute(attribute_name.to_string()))?;
        let attribute_type = self
            .types
            .get_mut(&key)
            .ok_or_else(|| DictionaryError::UnknownAttribute(attribute_name.to_string()))?;
        attribute_type
            .enumeration
            .get_or_insert_with(Enumeration::default)
            .insert(name, value)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn attribute_types(&self) -> impl Iterator<Item = &AttributeType> {
        self.types.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_dictionary() {
        let dictionary = Dictionary::standard().unwrap();

        let password = dictionary.attribute_type_by_code(2).unwrap();
        assert_eq!(password.name, "User-Password");
        assert_eq!(password.kind, AttributeKind::Octets);

        let prefix = dictionary.attribute_type_by_name("Framed-IPv6-Prefix").unwrap();
        assert_eq!(prefix.kind, AttributeKind::Ipv6Prefix);

        let timestamp = dictionary.attribute_type_by_name("Event-Timestamp").unwrap();
        assert_eq!(timestamp.kind, AttributeKind::Integer);

        let success = dictionary.attribute_type(Some(311), 26).unwrap();
        assert_eq!(success.name, "MS-CHAP2-Success");
        assert_eq!(dictionary.vendor_name(14122), Some("WISPr"));
    }

    #[test]
    fn test_standard_enumerations() {
        let dictionary = Dictionary::standard().unwrap();
        let status = dictionary.attribute_type_by_name("Acct-Status-Type").unwrap();
        let enumeration = status.enumeration.as_ref().unwrap();
        assert_eq!(enumeration.name(3), Some("Interim-Update"));
        assert_eq!(enumeration.value("Accounting-Off"), Some(8));
    }

    #[test]
    fn test_lookup_misses_are_none() {
        let dictionary = Dictionary::standard().unwrap();
        assert!(dictionary.attribute_type_by_code(250).is_none());
        assert!(dictionary.attribute_type_by_name("No-Such-Attribute").is_none());
        assert!(dictionary.vendor_id("Nobody").is_none());
        assert!(dictionary.vendor_name(1).is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut dictionary = Dictionary::new();
        dictionary
            .add_attribute_type(AttributeType::new(None, 1, "User-Name", AttributeKind::String))
            .unwrap();
        let result =
            dictionary.add_attribute_type(AttributeType::new(None, 200, "User-Name", AttributeKind::String));
        assert!(matches!(result, Err(DictionaryError::DuplicateName(_))));
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let mut dictionary = Dictionary::new();
        dictionary
            .add_attribute_type(AttributeType::new(None, 1, "User-Name", AttributeKind::String))
            .unwrap();
        let result =
            dictionary.add_attribute_type(AttributeType::new(None, 1, "Login-Name", AttributeKind::String));
        assert!(matches!(
            result,
            Err(DictionaryError::DuplicateCode { vendor: None, code: 1 })
        ));
    }

    #[test]
    fn test_same_code_different_vendor() {
        let mut dictionary = Dictionary::new();
        dictionary.add_vendor(311, "Microsoft").unwrap();
        dictionary
            .add_attribute_type(AttributeType::new(None, 1, "User-Name", AttributeKind::String))
            .unwrap();
        dictionary
            .add_attribute_type(AttributeType::new(Some(311), 1, "MS-CHAP-Response", AttributeKind::Octets))
            .unwrap();
        assert_eq!(dictionary.len(), 2);
    }

    #[test]
    fn test_vendor_attribute_requires_vendor() {
        let mut dictionary = Dictionary::new();
        let result =
            dictionary.add_attribute_type(AttributeType::new(Some(9), 1, "Cisco-AVPair", AttributeKind::String));
        assert!(matches!(result, Err(DictionaryError::UnknownVendor(9))));
    }

    #[test]
    fn test_duplicate_vendor_rejected() {
        let mut dictionary = Dictionary::new();
        dictionary.add_vendor(9, "Cisco").unwrap();
        assert!(dictionary.add_vendor(9, "Cisco-Systems").is_err());
        assert!(dictionary.add_vendor(10, "Cisco").is_err());
    }

    #[test]
    fn test_enumeration_value_for_unknown_attribute() {
        let mut dictionary = Dictionary::new();
        let result = dictionary.add_enumeration_value("Service-Type", "Login-User", 1);
        assert!(matches!(result, Err(DictionaryError::UnknownAttribute(_))));
    }

    #[test]
    fn test_enumeration_aliases() {
        let mut enumeration = Enumeration::default();
        enumeration.insert("Async", 0).unwrap();
        enumeration.insert("Asynchronous", 0).unwrap();
        enumeration.insert("Async", 0).unwrap();
        assert_eq!(enumeration.name(0), Some("Async"));
        assert_eq!(enumeration.value("Asynchronous"), Some(0));
        assert!(enumeration.insert("Async", 1).is_err());
        assert_eq!(enumeration.len(), 2);
    }
}
