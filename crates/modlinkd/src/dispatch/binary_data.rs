//! `getBinaryData`: read a bounded byte range from a file.
//!
//! Arguments are `[path, offsetHex, lengthText]`. The offset is hexadecimal
//! text with an optional `0x` prefix and the length is decimal text. Every
//! argument is validated before the file is touched.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::registry::Command;
use super::response::Response;

/// Registered name of the command.
pub const GET_BINARY_DATA: &str = "getBinaryData";

/// Largest byte range served by one request.
pub const MAX_BINARY_LENGTH: usize = 1024;

/// Reads up to [`MAX_BINARY_LENGTH`] bytes from a file at a given offset.
#[derive(Debug, Default, Clone, Copy)]
pub struct GetBinaryData;

impl Command for GetBinaryData {
    fn execute(&self, args: &[Value]) -> Result<Response, DispatchError> {
        let range = ByteRange::parse(args)?;
        debug!(
            target: DISPATCH_TARGET,
            path = range.path,
            offset = range.offset,
            length = range.length,
            "reading binary range"
        );
        read_range(range.path, range.offset, range.length).map(Response::binary)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ByteRange<'a> {
    path: &'a str,
    offset: u64,
    length: usize,
}

impl<'a> ByteRange<'a> {
    fn parse(args: &'a [Value]) -> Result<Self, DispatchError> {
        let [path, offset, length] = args else {
            return Err(DispatchError::invalid_arguments(
                GET_BINARY_DATA,
                format!(
                    "expected 3 arguments (path, offsetHex, lengthText), got {}",
                    args.len()
                ),
            ));
        };
        let path = string_arg(path, "path")?;
        let offset = parse_offset(string_arg(offset, "offsetHex")?)?;
        let length = parse_length(string_arg(length, "lengthText")?)?;
        Ok(Self {
            path,
            offset,
            length,
        })
    }
}

fn string_arg<'a>(value: &'a Value, name: &str) -> Result<&'a str, DispatchError> {
    value.as_str().ok_or_else(|| {
        DispatchError::invalid_arguments(GET_BINARY_DATA, format!("{name} must be a string"))
    })
}

fn parse_offset(text: &str) -> Result<u64, DispatchError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DispatchError::InvalidOffset {
            text: text.to_owned(),
        });
    }
    u64::from_str_radix(digits, 16).map_err(|_| DispatchError::InvalidOffset {
        text: text.to_owned(),
    })
}

fn parse_length(text: &str) -> Result<usize, DispatchError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DispatchError::InvalidLength {
            text: text.to_owned(),
        });
    }
    let length: u64 = trimmed.parse().map_err(|_| DispatchError::InvalidLength {
        text: text.to_owned(),
    })?;
    match usize::try_from(length) {
        Ok(length) if length <= MAX_BINARY_LENGTH => Ok(length),
        _ => Err(DispatchError::LengthTooLarge {
            length,
            max: MAX_BINARY_LENGTH,
        }),
    }
}

fn read_range(path: &str, offset: u64, length: usize) -> Result<Vec<u8>, DispatchError> {
    let mut file = File::open(Path::new(path)).map_err(|source| DispatchError::Open {
        path: path.to_owned(),
        source,
    })?;
    let size = file.metadata()?.len();
    if offset > size {
        return Err(DispatchError::OffsetBeyondEnd {
            path: path.to_owned(),
            offset,
            size,
        });
    }
    file.seek(SeekFrom::Start(offset))?;

    let mut data = Vec::with_capacity(length);
    file.take(length as u64).read_to_end(&mut data)?;
    if data.len() < length {
        return Err(DispatchError::ShortRead {
            path: path.to_owned(),
            expected: length,
            actual: data.len(),
        });
    }
    Ok(data)
}
