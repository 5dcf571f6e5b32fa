//! `multipart/form-data` decoding.

use futures::{executor, future, stream};
use multer::{Constraints, Multipart, SizeLimit};
use serde::Serialize;

use crate::error::ParseError;

/// A file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFile {
    /// Form field name, e.g. `avatar` or `files[]`.
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl UploadFile {
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.filename.rsplit_once('.').map(|(_, ext)| ext)
    }
}

/// Decoded parts: text fields in body order plus uploaded files.
#[derive(Debug, Default)]
pub(crate) struct MultipartBody {
    pub fields: Vec<(String, String)>,
    pub files: Vec<UploadFile>,
}

fn malformed(message: impl Into<String>) -> ParseError {
    ParseError::Malformed {
        format: "multipart",
        message: message.into(),
    }
}

fn convert(err: multer::Error) -> ParseError {
    match err {
        multer::Error::StreamSizeExceeded { limit } | multer::Error::FieldSizeExceeded { limit, .. } => {
            ParseError::TooLarge { limit }
        }
        other => malformed(other.to_string()),
    }
}

/// Extract the boundary from a `multipart/form-data; boundary=...` header.
pub(crate) fn parse_boundary(content_type: &str) -> Result<String, ParseError> {
    multer::parse_boundary(content_type).map_err(convert)
}

/// Split an already buffered `body` into parts. `limit` caps the whole stream.
pub(crate) fn parse(body: &[u8], boundary: &str, limit: u64) -> Result<MultipartBody, ParseError> {
    let stream = stream::once(future::ready(Ok::<_, std::io::Error>(body.to_vec())));
    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(limit));
    let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

    // The stream yields a single ready chunk, so no poll ever parks.
    executor::block_on(async move {
        let mut out = MultipartBody::default();
        while let Some(field) = multipart.next_field().await.map_err(convert)? {
            let name = field
                .name()
                .ok_or_else(|| malformed("Content-Disposition without name"))?
                .to_string();
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(ToString::to_string);
            let data = field.bytes().await.map_err(convert)?;

            match filename {
                Some(filename) => {
                    check_filename(&filename)?;
                    out.files.push(UploadFile {
                        field: name,
                        filename,
                        content_type,
                        data: data.to_vec(),
                    });
                }
                None => out
                    .fields
                    .push((name, String::from_utf8_lossy(&data).into_owned())),
            }
        }
        Ok::<_, ParseError>(out)
    })
}

fn check_filename(filename: &str) -> Result<(), ParseError> {
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') || filename.contains('\0') {
        return Err(malformed("filename contains path traversal characters"));
    }
    Ok(())
}
