use super::{AttributeType, Dictionary, DictionaryError};
use crate::attributes::AttributeKind;
use std::fs;
use std::path::{Path, PathBuf};

/// Line-oriented dictionary loader
///
/// ```text
/// ATTRIBUTE   name  code  type
/// VALUE       attribute-name  value-name  number
/// VENDOR      id  name
/// VENDORATTR  vendor-id  name  code  type
/// $INCLUDE    path
/// ```
pub(super) struct Parser<'d> {
    dictionary: &'d mut Dictionary,
    include_stack: Vec<PathBuf>,
}

struct Location<'a> {
    file: &'a str,
    line: usize,
}

impl Location<'_> {
    fn error(&self, message: impl Into<String>) -> DictionaryError {
        DictionaryError::Parse {
            file: self.file.to_string(),
            line: self.line,
            message: message.into(),
        }
    }
}

impl<'d> Parser<'d> {
    pub(super) fn new(dictionary: &'d mut Dictionary) -> Self {
        Parser {
            dictionary,
            include_stack: Vec::new(),
        }
    }

    pub(super) fn parse_file(&mut self, path: &Path) -> Result<(), DictionaryError> {
        let io_error = |source| DictionaryError::Io {
            path: path.display().to_string(),
            source,
        };
        let canonical = fs::canonicalize(path).map_err(io_error)?;

        if self.include_stack.contains(&canonical) {
            let file = self
                .include_stack
                .last()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(DictionaryError::Parse {
                file,
                line: 0,
                message: format!("recursive $INCLUDE of {}", canonical.display()),
            });
        }

        let text = fs::read_to_string(&canonical).map_err(io_error)?;
        let base_dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file = canonical.display().to_string();

        self.include_stack.push(canonical);
        let result = self.parse_text(&text, &file, &base_dir);
        self.include_stack.pop();
        result
    }

    pub(super) fn parse_text(&mut self, text: &str, file: &str, base_dir: &Path) -> Result<(), DictionaryError> {
        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let location = Location { file, line: index + 1 };
            let tokens: Vec<&str> = line.split_whitespace().collect();

            match tokens[0] {
                "ATTRIBUTE" => self.attribute(&tokens, &location)?,
                "VALUE" => self.value(&tokens, &location)?,
                "VENDOR" => self.vendor(&tokens, &location)?,
                "VENDORATTR" => self.vendor_attribute(&tokens, &location)?,
                "$INCLUDE" => {
                    let [_, path] = tokens[..] else {
                        return Err(location.error("expected: $INCLUDE path"));
                    };
                    let target = base_dir.join(path);
                    match self.parse_file(&target) {
                        // Report a missing include at the directive that named it.
                        Err(DictionaryError::Io { source, .. }) => {
                            return Err(location.error(format!(
                                "cannot include {}: {}",
                                target.display(),
                                source
                            )));
                        }
                        other => other?,
                    }
                }
                directive => {
                    return Err(location.error(format!("unknown directive {}", directive)));
                }
            }
        }
        Ok(())
    }

    fn attribute(&mut self, tokens: &[&str], location: &Location<'_>) -> Result<(), DictionaryError> {
        let [_, name, code, kind] = tokens[..] else {
            return Err(location.error("expected: ATTRIBUTE name code type"));
        };
        let attribute_type = AttributeType::new(None, parse_code(code, location)?, name, parse_kind(kind, location)?);
        self.dictionary
            .add_attribute_type(attribute_type)
            .map_err(|e| location.error(e.to_string()))
    }

    fn vendor_attribute(&mut self, tokens: &[&str], location: &Location<'_>) -> Result<(), DictionaryError> {
        let [_, vendor_id, name, code, kind] = tokens[..] else {
            return Err(location.error("expected: VENDORATTR vendor-id name code type"));
        };
        let vendor_id = parse_number(vendor_id, location)?;
        let attribute_type =
            AttributeType::new(Some(vendor_id), parse_code(code, location)?, name, parse_kind(kind, location)?);
        self.dictionary
            .add_attribute_type(attribute_type)
            .map_err(|e| location.error(e.to_string()))
    }

    fn value(&mut self, tokens: &[&str], location: &Location<'_>) -> Result<(), DictionaryError> {
        let [_, attribute_name, name, number] = tokens[..] else {
            return Err(location.error("expected: VALUE attribute name number"));
        };
        let number = parse_number(number, location)?;
        self.dictionary
            .add_enumeration_value(attribute_name, name, number)
            .map_err(|e| location.error(e.to_string()))
    }

    fn vendor(&mut self, tokens: &[&str], location: &Location<'_>) -> Result<(), DictionaryError> {
        let [_, vendor_id, name] = tokens[..] else {
            return Err(location.error("expected: VENDOR id name"));
        };
        let vendor_id = parse_number(vendor_id, location)?;
        self.dictionary
            .add_vendor(vendor_id, name)
            .map_err(|e| location.error(e.to_string()))
    }
}

fn parse_number(token: &str, location: &Location<'_>) -> Result<u32, DictionaryError> {
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex_digits) => u32::from_str_radix(hex_digits, 16),
        None => token.parse(),
    };
    parsed.map_err(|_| location.error(format!("invalid number {}", token)))
}

fn parse_code(token: &str, location: &Location<'_>) -> Result<u8, DictionaryError> {
    match parse_number(token, location)? {
        code @ 1..=255 => Ok(code as u8),
        code => Err(location.error(format!("attribute code {} out of range 1-255", code))),
    }
}

fn parse_kind(token: &str, location: &Location<'_>) -> Result<AttributeKind, DictionaryError> {
    AttributeKind::from_dictionary_type(token)
        .ok_or_else(|| location.error(format!("unknown attribute type {}", token)))
}
